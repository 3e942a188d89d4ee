use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Failures reported by the webhook directory and request store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("store i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("store serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors that end a capture, stream or replay call with an HTTP error status.
///
/// A body that cannot be read is not represented here: capture substitutes an
/// empty body and carries on.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),
    #[error("replay transport failure: {0}")]
    ReplayTransportFailure(String),
    #[error("invalid replay request: {0}")]
    InvalidReplay(String),
}

impl CaptureError {
    pub fn status(&self) -> StatusCode {
        match self {
            CaptureError::NotFound(_) => StatusCode::NOT_FOUND,
            CaptureError::UpstreamUnavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
            CaptureError::ReplayTransportFailure(_) => StatusCode::BAD_GATEWAY,
            CaptureError::InvalidReplay(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StoreError> for CaptureError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => CaptureError::NotFound("record not found".into()),
            other => CaptureError::UpstreamUnavailable(other.to_string()),
        }
    }
}

impl IntoResponse for CaptureError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = status.canonical_reason().unwrap_or("error");
        (status, message).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_map_to_http_statuses() {
        assert_eq!(
            CaptureError::from(StoreError::NotFound).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            CaptureError::from(StoreError::Unavailable("db down".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        assert_eq!(
            CaptureError::from(StoreError::Io(io)).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn replay_transport_failure_is_bad_gateway() {
        let err = CaptureError::ReplayTransportFailure("connection refused".into());
        assert_eq!(err.into_response().status(), StatusCode::BAD_GATEWAY);
    }
}
