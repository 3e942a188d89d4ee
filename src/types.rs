use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

pub const DEFAULT_CONTENT_TYPE: &str = "application/json";

fn default_response_code() -> u16 {
    200
}

/// A configured endpoint and the synthetic response it returns for every
/// capture. Owned by the webhook directory; read once per inbound request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Webhook {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default = "default_response_code")]
    pub response_code: u16,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub payload: Option<String>,
    /// Milliseconds to wait before writing the response.
    #[serde(default)]
    pub response_delay: u64,
    #[serde(default)]
    pub response_headers: BTreeMap<String, String>,
    /// Ownership marker, opaque to the capture engine.
    #[serde(default)]
    pub user_id: Option<String>,
}

impl Webhook {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: String::new(),
            response_code: default_response_code(),
            content_type: None,
            payload: None,
            response_delay: 0,
            response_headers: BTreeMap::new(),
            user_id: None,
        }
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.response_delay)
    }

    pub fn content_type(&self) -> &str {
        self.content_type.as_deref().unwrap_or(DEFAULT_CONTENT_TYPE)
    }
}

/// One inbound request, frozen at capture time. Never mutated once persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CapturedRequest {
    pub id: String,
    pub webhook_id: String,
    pub method: String,
    /// Multi-valued headers are joined with `,` in the order they arrived.
    pub headers: BTreeMap<String, String>,
    /// Same flattening as `headers`.
    pub query: BTreeMap<String, String>,
    pub body: String,
    pub received_at: DateTime<Utc>,
}
