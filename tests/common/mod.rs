#![allow(dead_code)]

use axum::body::Body;
use axum::http::Request;
use std::sync::Arc;
use tokio::net::TcpListener;
use webhook_capture::config::Config;
use webhook_capture::error::StoreError;
use webhook_capture::http_server::{self, AppState};
use webhook_capture::store::{MemoryStore, RequestStore, WebhookDirectory};
use webhook_capture::types::{CapturedRequest, Webhook};

pub fn test_config() -> Config {
    Config {
        keep_alive_secs: 3600,
        replay_timeout_secs: 5,
        ..Config::default()
    }
}

pub fn seeded_store(webhooks: impl IntoIterator<Item = Webhook>) -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    for wh in webhooks {
        store.upsert_webhook(wh).unwrap();
    }
    store
}

pub fn state_for(store: Arc<MemoryStore>, config: Config) -> AppState {
    AppState::new(config, store.clone(), store).unwrap()
}

/// Webhook `abc123` answering 201 text/plain "ok".
pub fn example_webhook() -> Webhook {
    let mut wh = Webhook::new("abc123");
    wh.response_code = 201;
    wh.content_type = Some("text/plain".into());
    wh.payload = Some("ok".into());
    wh
}

pub fn post(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

/// Serve on an ephemeral port with `domain` pointing back at the server.
pub async fn spawn_server(store: Arc<MemoryStore>) -> (String, AppState) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let config = Config {
        domain: base.clone(),
        ..test_config()
    };
    let state = state_for(store, config);
    tokio::spawn(http_server::serve(
        listener,
        state.clone(),
        std::future::pending::<()>(),
    ));
    (base, state)
}

/// Directory that knows every webhook but whose request store always fails.
pub struct BrokenStore;

impl WebhookDirectory for BrokenStore {
    fn lookup_webhook(&self, id: &str) -> Result<Webhook, StoreError> {
        Ok(Webhook::new(id))
    }
}

impl RequestStore for BrokenStore {
    fn persist_captured_request(&self, _record: &CapturedRequest) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("database is down".into()))
    }

    fn load_captured_request(&self, _id: &str) -> Result<CapturedRequest, StoreError> {
        Err(StoreError::Unavailable("database is down".into()))
    }

    fn list_captured_requests(&self, _webhook_id: &str) -> Result<Vec<CapturedRequest>, StoreError> {
        Err(StoreError::Unavailable("database is down".into()))
    }

    fn delete_captured_request(&self, _id: &str) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("database is down".into()))
    }
}

/// Directory whose lookups fail with something other than "not found".
pub struct UnreachableDirectory;

impl WebhookDirectory for UnreachableDirectory {
    fn lookup_webhook(&self, _id: &str) -> Result<Webhook, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }
}
