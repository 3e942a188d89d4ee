//! Capture handler: look up the webhook, record the inbound request, notify
//! live subscribers, then answer with the webhook's synthetic response.
//!
//! The request is persisted before anything is broadcast or answered. A
//! caller that receives the synthetic response can rely on the request being
//! in the store.

use crate::error::{CaptureError, StoreError};
use crate::http_server::AppState;
use crate::normalize::normalize;
use crate::types::{Webhook, DEFAULT_CONTENT_TYPE};
use axum::{
    body::Body,
    extract::{Path, Request, State},
    http::{header, HeaderName, HeaderValue, StatusCode},
    response::Response,
};
use serde::Deserialize;
use tracing::{debug, error, info, warn};

#[derive(Deserialize)]
pub struct CapturePath {
    webhook_id: String,
}

/// `ANY /webhooks/{webhook_id}[/sub/path]`
pub async fn capture_request(
    State(state): State<AppState>,
    Path(CapturePath { webhook_id }): Path<CapturePath>,
    request: Request,
) -> Result<Response, CaptureError> {
    capture(&state, &webhook_id, request).await
}

pub async fn capture(
    state: &AppState,
    webhook_id: &str,
    request: Request,
) -> Result<Response, CaptureError> {
    let webhook = match state.directory.lookup_webhook(webhook_id) {
        Ok(wh) => wh,
        Err(StoreError::NotFound) => {
            debug!(webhook_id, "capture for unknown webhook");
            return Err(CaptureError::NotFound(format!("webhook {webhook_id}")));
        }
        Err(e) => {
            error!(webhook_id, error = %e, "webhook lookup failed");
            return Err(CaptureError::UpstreamUnavailable(e.to_string()));
        }
    };

    let captured = normalize(webhook_id, request, state.config.max_body_bytes).await;

    // Store writes are blocking file I/O.
    let request_id = captured.id.clone();
    let requests = state.requests.clone();
    let persisted = tokio::task::spawn_blocking(move || {
        requests
            .persist_captured_request(&captured)
            .map(|()| captured)
    })
    .await;
    let captured = match persisted {
        Ok(Ok(captured)) => captured,
        Ok(Err(e)) => {
            error!(webhook_id, request_id = %request_id, error = %e, "failed to persist captured request");
            return Err(CaptureError::UpstreamUnavailable(e.to_string()));
        }
        Err(e) => {
            error!(webhook_id, request_id = %request_id, error = %e, "persist task failed");
            return Err(CaptureError::UpstreamUnavailable(e.to_string()));
        }
    };
    info!(
        webhook_id,
        request_id = %captured.id,
        method = %captured.method,
        "captured request"
    );

    match serde_json::to_string(&captured) {
        Ok(message) => {
            let delivered = state.registry.broadcast(webhook_id, message);
            debug!(webhook_id, delivered, "broadcast captured request");
        }
        Err(e) => warn!(webhook_id, error = %e, "failed to serialize captured request for broadcast"),
    }

    let delay = webhook.delay();
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }

    Ok(synthetic_response(&webhook))
}

/// Build the configured response: extra headers, then content type, status and body.
pub fn synthetic_response(webhook: &Webhook) -> Response {
    let mut response = Response::new(Body::from(webhook.payload.clone().unwrap_or_default()));
    let headers = response.headers_mut();

    for (name, value) in &webhook.response_headers {
        match (
            HeaderName::try_from(name.as_str()),
            HeaderValue::try_from(value.as_str()),
        ) {
            (Ok(name), Ok(value)) => {
                headers.insert(name, value);
            }
            _ => warn!(webhook_id = %webhook.id, header = %name, "skipping invalid response header"),
        }
    }

    let content_type = HeaderValue::try_from(webhook.content_type()).unwrap_or_else(|_| {
        warn!(webhook_id = %webhook.id, "invalid content type, using default");
        HeaderValue::from_static(DEFAULT_CONTENT_TYPE)
    });
    headers.insert(header::CONTENT_TYPE, content_type);

    *response.status_mut() = StatusCode::from_u16(webhook.response_code).unwrap_or_else(|_| {
        warn!(webhook_id = %webhook.id, code = webhook.response_code, "invalid response code, using 200");
        StatusCode::OK
    });

    response
}
