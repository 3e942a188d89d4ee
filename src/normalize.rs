//! Turns a raw inbound request into a [`CapturedRequest`].
//!
//! Normalization never fails: undecodable bytes degrade to lossy strings and
//! an unreadable (or oversized) body is recorded as empty.

use crate::types::CapturedRequest;
use axum::extract::Request;
use axum::http::HeaderMap;
use chrono::Utc;
use std::collections::BTreeMap;
use tracing::warn;
use uuid::Uuid;

pub async fn normalize(webhook_id: &str, request: Request, max_body_bytes: usize) -> CapturedRequest {
    let received_at = Utc::now();
    let (parts, body) = request.into_parts();

    let body = match axum::body::to_bytes(body, max_body_bytes).await {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(e) => {
            warn!(webhook_id, error = %e, "failed to read request body, capturing it as empty");
            String::new()
        }
    };

    CapturedRequest {
        id: Uuid::new_v4().to_string(),
        webhook_id: webhook_id.to_string(),
        method: parts.method.to_string(),
        headers: flatten_headers(&parts.headers),
        query: flatten_query(parts.uri.query()),
        body,
        received_at,
    }
}

/// One entry per header name; repeated values are joined with `,` in arrival order.
pub fn flatten_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .keys()
        .map(|name| {
            let joined = headers
                .get_all(name)
                .iter()
                .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
                .collect::<Vec<_>>()
                .join(",");
            (name.as_str().to_string(), joined)
        })
        .collect()
}

/// Same flattening as [`flatten_headers`], applied to the decoded query string.
pub fn flatten_query(query: Option<&str>) -> BTreeMap<String, String> {
    let mut grouped: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (key, value) in url::form_urlencoded::parse(query.unwrap_or_default().as_bytes()) {
        grouped
            .entry(key.into_owned())
            .or_default()
            .push(value.into_owned());
    }
    grouped
        .into_iter()
        .map(|(key, values)| (key, values.join(",")))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::HeaderValue;

    #[test]
    fn repeated_headers_join_in_order() {
        let mut headers = HeaderMap::new();
        headers.append("x-a", HeaderValue::from_static("1"));
        headers.append("x-a", HeaderValue::from_static("2"));
        headers.insert("content-type", HeaderValue::from_static("application/json"));

        let flat = flatten_headers(&headers);
        assert_eq!(flat["x-a"], "1,2");
        assert_eq!(flat["content-type"], "application/json");
        assert_eq!(flat.len(), 2);
    }

    #[test]
    fn non_utf8_header_values_degrade() {
        let mut headers = HeaderMap::new();
        headers.insert("x-raw", HeaderValue::from_bytes(b"ok\xff").unwrap());
        assert_eq!(flatten_headers(&headers)["x-raw"], "ok\u{fffd}");
    }

    #[test]
    fn query_values_are_decoded_and_joined() {
        let flat = flatten_query(Some("a=1&b=hello%20world&a=2&empty="));
        assert_eq!(flat["a"], "1,2");
        assert_eq!(flat["b"], "hello world");
        assert_eq!(flat["empty"], "");
        assert!(flatten_query(None).is_empty());
    }

    #[tokio::test]
    async fn normalize_captures_method_query_and_body() {
        let request = Request::builder()
            .method("POST")
            .uri("/webhooks/abc123?x=1&x=2")
            .header("x-a", "1")
            .header("x-a", "2")
            .body(Body::from(r#"{"x":1}"#))
            .unwrap();

        let before = Utc::now();
        let captured = normalize("abc123", request, 1024).await;
        assert_eq!(captured.webhook_id, "abc123");
        assert_eq!(captured.method, "POST");
        assert_eq!(captured.headers["x-a"], "1,2");
        assert_eq!(captured.query["x"], "1,2");
        assert_eq!(captured.body, r#"{"x":1}"#);
        assert!(captured.received_at >= before);
        assert!(!captured.id.is_empty());
    }

    #[tokio::test]
    async fn oversized_body_is_captured_as_empty() {
        let request = Request::builder()
            .method("PUT")
            .uri("/webhooks/abc123")
            .body(Body::from(vec![b'a'; 64]))
            .unwrap();

        let captured = normalize("abc123", request, 16).await;
        assert_eq!(captured.method, "PUT");
        assert!(captured.body.is_empty());
    }

    #[tokio::test]
    async fn every_capture_gets_a_fresh_id() {
        let a = normalize("abc123", Request::new(Body::empty()), 16).await;
        let b = normalize("abc123", Request::new(Body::empty()), 16).await;
        assert_ne!(a.id, b.id);
    }
}
