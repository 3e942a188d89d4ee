use crate::capture::capture_request;
use crate::config::Config;
use crate::error::{CaptureError, StoreError};
use crate::registry::SubscriptionRegistry;
use crate::replay::replay_request;
use crate::store::{RequestStore, WebhookDirectory};
use crate::stream::stream_events;
use crate::types::CapturedRequest;
use axum::{
    extract::{Path, State},
    routing::{any, get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

// ─── Shared state ────────────────────────────────────────────────────────────

/// Everything a handler needs. Cheap to clone; all clones share one registry.
#[derive(Clone)]
pub struct AppState {
    pub directory: Arc<dyn WebhookDirectory>,
    pub requests: Arc<dyn RequestStore>,
    pub registry: SubscriptionRegistry,
    pub replay_client: reqwest::Client,
    pub config: Arc<Config>,
    /// Cancelled when the server begins shutting down; ends every live stream.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(
        config: Config,
        directory: Arc<dyn WebhookDirectory>,
        requests: Arc<dyn RequestStore>,
    ) -> Result<Self, reqwest::Error> {
        let replay_client = reqwest::Client::builder()
            .timeout(config.replay_timeout())
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self {
            directory,
            requests,
            registry: SubscriptionRegistry::new(config.stream_buffer),
            replay_client,
            config: Arc::new(config),
            shutdown: CancellationToken::new(),
        })
    }
}

// ─── Router ──────────────────────────────────────────────────────────────────

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/webhooks/{webhook_id}", any(capture_request))
        .route("/webhooks/{webhook_id}/", any(capture_request))
        .route(
            "/webhooks/{webhook_id}/stream",
            get(stream_events).fallback(capture_request),
        )
        .route("/webhooks/{webhook_id}/{*path}", any(capture_request))
        .route("/requests/{request_id}", get(get_request))
        .route("/requests/{request_id}/replay", post(replay_request))
        .route("/api/webhooks/{webhook_id}/requests", get(list_requests))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until `signal` resolves, then cancel live streams and drain.
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    signal: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let shutdown = state.shutdown.clone();
    let app = router(state);

    info!(addr = %listener.local_addr()?, "webhook capture server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            signal.await;
            info!("shutdown requested, closing live streams");
            shutdown.cancel();
        })
        .await
}

// ─── History endpoints ───────────────────────────────────────────────────────

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn get_request(
    State(state): State<AppState>,
    Path(request_id): Path<String>,
) -> Result<Json<CapturedRequest>, CaptureError> {
    let record = state
        .requests
        .load_captured_request(&request_id)
        .map_err(|e| match e {
            StoreError::NotFound => CaptureError::NotFound(format!("captured request {request_id}")),
            other => other.into(),
        })?;
    Ok(Json(record))
}

async fn list_requests(
    State(state): State<AppState>,
    Path(webhook_id): Path<String>,
) -> Result<Json<Value>, CaptureError> {
    state.directory.lookup_webhook(&webhook_id)?;
    let items = state.requests.list_captured_requests(&webhook_id)?;
    let count = items.len();
    Ok(Json(json!({ "requests": items, "count": count })))
}
