//! Replay: resend a captured request to its webhook's public endpoint.
//!
//! The resent request goes back through the normal capture path, so it is
//! persisted and broadcast as a brand-new capture. Headers and query values
//! are replayed in their flattened form; a parameter that arrived several
//! times is sent once with the comma-joined value.

use crate::error::{CaptureError, StoreError};
use crate::http_server::AppState;
use crate::types::CapturedRequest;
use axum::{
    extract::{Path, State},
    response::Redirect,
};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, Url};
use tracing::{debug, info, warn};

/// Framing and hop-by-hop headers the outbound client computes itself.
const SKIPPED_HEADERS: [&str; 4] = ["host", "content-length", "transfer-encoding", "connection"];

/// `POST /requests/{request_id}/replay`
pub async fn replay_request(
    State(state): State<AppState>,
    Path(request_id): Path<String>,
) -> Result<Redirect, CaptureError> {
    let record = match state.requests.load_captured_request(&request_id) {
        Ok(record) => record,
        Err(StoreError::NotFound) => {
            debug!(request_id = %request_id, "replay of unknown request");
            return Err(CaptureError::NotFound(format!("captured request {request_id}")));
        }
        Err(e) => return Err(e.into()),
    };

    let outbound = build_replay(&state.replay_client, &state.config.domain, &record)?;
    let response = outbound.send().await.map_err(|e| {
        warn!(request_id = %request_id, webhook_id = %record.webhook_id, error = %e, "replay failed");
        CaptureError::ReplayTransportFailure(e.to_string())
    })?;
    info!(
        request_id = %request_id,
        webhook_id = %record.webhook_id,
        status = response.status().as_u16(),
        "replayed captured request"
    );

    Ok(Redirect::to(&request_location(&record)))
}

/// `/requests/{id}?address={webhook_id}`, percent-encoded.
pub fn request_location(record: &CapturedRequest) -> String {
    // byte_serialize writes spaces as '+', which a path would keep literally.
    let id = url::form_urlencoded::byte_serialize(record.id.as_bytes())
        .collect::<String>()
        .replace('+', "%20");
    let query = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("address", &record.webhook_id)
        .finish();
    format!("/requests/{id}?{query}")
}

/// `{domain}/webhooks/{webhook_id}?{query}`
pub fn replay_url(domain: &str, record: &CapturedRequest) -> Result<Url, CaptureError> {
    let mut url = Url::parse(domain)
        .map_err(|e| CaptureError::InvalidReplay(format!("invalid domain {domain:?}: {e}")))?;
    url.path_segments_mut()
        .map_err(|_| CaptureError::InvalidReplay(format!("domain {domain:?} cannot be a base URL")))?
        .pop_if_empty()
        .push("webhooks")
        .push(&record.webhook_id);

    if !record.query.is_empty() {
        let mut pairs = url.query_pairs_mut();
        for (key, value) in &record.query {
            pairs.append_pair(key, value);
        }
    }
    Ok(url)
}

pub fn build_replay(
    client: &reqwest::Client,
    domain: &str,
    record: &CapturedRequest,
) -> Result<reqwest::RequestBuilder, CaptureError> {
    let method = Method::from_bytes(record.method.as_bytes())
        .map_err(|_| CaptureError::InvalidReplay(format!("invalid method {:?}", record.method)))?;
    let url = replay_url(domain, record)?;

    let mut headers = HeaderMap::new();
    for (name, value) in &record.headers {
        if SKIPPED_HEADERS.contains(&name.to_ascii_lowercase().as_str()) {
            continue;
        }
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.insert(name, value);
            }
            _ => debug!(header = %name, "header cannot be replayed, skipping"),
        }
    }

    Ok(client
        .request(method, url)
        .headers(headers)
        .body(record.body.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn record() -> CapturedRequest {
        let mut headers = BTreeMap::new();
        headers.insert("x-a".to_string(), "1,2".to_string());
        headers.insert("host".to_string(), "old.example.com".to_string());
        headers.insert("content-length".to_string(), "7".to_string());
        let mut query = BTreeMap::new();
        query.insert("tag".to_string(), "a,b".to_string());
        CapturedRequest {
            id: "req1".to_string(),
            webhook_id: "abc123".to_string(),
            method: "PATCH".to_string(),
            headers,
            query,
            body: r#"{"x":1}"#.to_string(),
            received_at: Utc::now(),
        }
    }

    #[test]
    fn url_joins_domain_webhooks_and_id() {
        let url = replay_url("https://hooks.example.com", &record()).unwrap();
        assert_eq!(url.as_str(), "https://hooks.example.com/webhooks/abc123?tag=a%2Cb");

        let url = replay_url("https://hooks.example.com/base/", &record()).unwrap();
        assert_eq!(url.path(), "/base/webhooks/abc123");
    }

    #[test]
    fn url_without_query_has_no_question_mark() {
        let mut rec = record();
        rec.query.clear();
        let url = replay_url("http://localhost:3000", &rec).unwrap();
        assert_eq!(url.as_str(), "http://localhost:3000/webhooks/abc123");
    }

    #[test]
    fn invalid_domain_is_reported() {
        assert!(matches!(
            replay_url("not a url", &record()),
            Err(CaptureError::InvalidReplay(_))
        ));
    }

    #[test]
    fn outbound_request_carries_method_headers_and_body() {
        let client = reqwest::Client::new();
        let request = build_replay(&client, "http://localhost:3000", &record())
            .unwrap()
            .build()
            .unwrap();

        assert_eq!(request.method(), &Method::PATCH);
        assert_eq!(request.headers()["x-a"], "1,2");
        assert!(request.headers().get("host").is_none());
        assert!(request.headers().get("content-length").is_none());
        let body = request.body().and_then(|b| b.as_bytes()).unwrap();
        assert_eq!(body, br#"{"x":1}"#);
    }

    #[test]
    fn location_encodes_id_and_webhook() {
        assert_eq!(request_location(&record()), "/requests/req1?address=abc123");

        let mut rec = record();
        rec.id = "a b/c".to_string();
        rec.webhook_id = "team a&b=c".to_string();
        assert_eq!(
            request_location(&rec),
            "/requests/a%20b%2Fc?address=team+a%26b%3Dc"
        );
    }
}
