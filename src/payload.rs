//! Generic log payloads posted to the ingest endpoint.
//!
//! A body is decoded as a structured [`GenericPayload`] only when the
//! declared content type is JSON and the whole document matches the
//! expected shape. Anything else is forwarded verbatim as the message.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::event::Event;
use crate::handler::RawRequest;
use crate::level::Level;

/// Logger name stamped on events built from generic payloads.
pub const LOGGER: &str = "http";

/// Message used when neither the payload nor the body carries any text.
pub const EMPTY_MESSAGE: &str = "(empty message)";

const JSON_MEDIA_TYPE: &str = "application/json";

/// Structured body accepted by the ingest endpoint.
///
/// Every field is optional; an absent field is distinct from an empty one.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct GenericPayload {
    #[serde(default)]
    pub message: Option<String>,

    #[serde(default)]
    pub level: Option<String>,

    /// RFC 3339 timestamp supplied by the producer
    #[serde(default)]
    pub timestamp: Option<String>,

    /// A `null` value counts as empty and is dropped like one
    #[serde(default)]
    pub tags: Option<HashMap<String, Option<String>>>,

    #[serde(default)]
    pub extra: Option<Map<String, Value>>,
}

/// Decode a request body as a [`GenericPayload`].
///
/// Returns `None` when the content type does not mention the JSON media
/// type (case-insensitive) or when the body is not a matching JSON object.
pub fn decode(content_type: &str, body: &[u8]) -> Option<GenericPayload> {
    if !content_type.to_ascii_lowercase().contains(JSON_MEDIA_TYPE) {
        return None;
    }

    match serde_json::from_slice(body) {
        Ok(payload) => Some(payload),
        Err(e) => {
            debug!(error = %e, "JSON body did not match payload shape, using raw body");
            None
        }
    }
}

/// Build the canonical event for a generic request.
///
/// `payload` is the result of [`decode`]; `None` means the raw body becomes
/// the message and is also kept under the `raw` extra key.
pub fn build_event(request: &RawRequest, payload: Option<GenericPayload>) -> Event {
    let mut event = Event::new(LOGGER);
    event.insert_tag("remote_addr", request.remote_addr.as_str());
    event.insert_tag("method", request.method.as_str());
    event.insert_tag("path", request.path.as_str());

    let body_text = String::from_utf8_lossy(&request.body).into_owned();

    match payload {
        Some(payload) => {
            event.message = payload
                .message
                .filter(|m| !m.is_empty())
                .unwrap_or(body_text);
            event.level = Level::from_label(payload.level.as_deref().unwrap_or(""));

            for (key, value) in payload.tags.unwrap_or_default() {
                event.insert_tag(key, value.unwrap_or_default());
            }

            if let Some(extra) = payload.extra {
                event.extra = extra;
            }

            if let Some(timestamp) = payload.timestamp.filter(|t| !t.is_empty()) {
                if let Some(parsed) = parse_timestamp(&timestamp) {
                    event.timestamp = parsed;
                }
                event.insert_extra("payload_timestamp", timestamp);
            }
        }
        None => {
            event.insert_extra("raw", body_text.clone());
            event.message = body_text;
        }
    }

    event.ensure_message(EMPTY_MESSAGE);
    event
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value.trim())
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Method;
    use bytes::Bytes;
    use serde_json::json;

    fn request(content_type: &str, body: &str) -> RawRequest {
        RawRequest {
            method: Method::POST,
            path: "/ingest".to_string(),
            content_type: content_type.to_string(),
            remote_addr: "192.0.2.10:51234".to_string(),
            body: Bytes::copy_from_slice(body.as_bytes()),
        }
    }

    fn ingest(content_type: &str, body: &str) -> Event {
        let request = request(content_type, body);
        let payload = decode(&request.content_type, &request.body);
        build_event(&request, payload)
    }

    #[test]
    fn test_decode_requires_json_content_type() {
        let body = br#"{"message":"hi"}"#;
        assert!(decode("", body).is_none());
        assert!(decode("text/plain", body).is_none());
        assert!(decode("application/json", body).is_some());
        assert!(decode("Application/JSON; charset=utf-8", body).is_some());
    }

    #[test]
    fn test_decode_rejects_malformed_json() {
        assert!(decode("application/json", b"{not json").is_none());
        assert!(decode("application/json", b"[1,2,3]").is_none());
        assert!(decode("application/json", br#"{"tags":{"a":1}}"#).is_none());
    }

    #[test]
    fn test_decode_distinguishes_absent_from_empty() {
        let payload = decode("application/json", br#"{"message":""}"#).unwrap();
        assert_eq!(payload.message, Some(String::new()));
        assert!(payload.level.is_none());
        assert!(payload.tags.is_none());
    }

    #[test]
    fn test_plain_text_body_becomes_message() {
        let event = ingest("", "plain text log line");
        assert_eq!(event.message, "plain text log line");
        assert_eq!(event.level, Level::Info);
        assert_eq!(event.logger, LOGGER);
        assert_eq!(event.extra.get("raw"), Some(&json!("plain text log line")));
    }

    #[test]
    fn test_structured_payload() {
        let event = ingest(
            "application/json",
            r#"{"message":"order failed","level":"error","tags":{"service":"checkout"}}"#,
        );
        assert_eq!(event.message, "order failed");
        assert_eq!(event.level, Level::Error);
        assert_eq!(event.tags.get("service").map(String::as_str), Some("checkout"));
        assert_eq!(event.tags.get("method").map(String::as_str), Some("POST"));
        assert_eq!(event.tags.get("path").map(String::as_str), Some("/ingest"));
        assert_eq!(
            event.tags.get("remote_addr").map(String::as_str),
            Some("192.0.2.10:51234")
        );
        assert!(!event.extra.contains_key("raw"));
    }

    #[test]
    fn test_tags_and_extra_are_carried() {
        let event = ingest(
            "application/json",
            r#"{"message":"m","tags":{"a":"1","b":""},"extra":{"x":2,"nested":{"y":[1,2]}}}"#,
        );
        assert_eq!(event.tags.get("a").map(String::as_str), Some("1"));
        assert!(!event.tags.contains_key("b"));
        assert_eq!(event.extra.get("x"), Some(&json!(2)));
        assert_eq!(event.extra.get("nested"), Some(&json!({"y": [1, 2]})));
    }

    #[test]
    fn test_null_tag_value_is_dropped() {
        let body = r#"{"message":"order failed","level":"error","tags":{"service":"checkout","b":null}}"#;
        assert!(decode("application/json", body.as_bytes()).is_some());

        let event = ingest("application/json", body);
        assert_eq!(event.message, "order failed");
        assert_eq!(event.level, Level::Error);
        assert_eq!(event.tags.get("service").map(String::as_str), Some("checkout"));
        assert!(!event.tags.contains_key("b"));
        assert!(!event.extra.contains_key("raw"));
    }

    #[test]
    fn test_payload_tags_override_base_tags() {
        let event = ingest(
            "application/json",
            r#"{"message":"m","tags":{"path":"/custom"}}"#,
        );
        assert_eq!(event.tags.get("path").map(String::as_str), Some("/custom"));
    }

    #[test]
    fn test_malformed_json_falls_back_to_raw_body() {
        let event = ingest("application/json", "{\"message\": oops");
        assert_eq!(event.message, "{\"message\": oops");
        assert_eq!(event.level, Level::Info);
        assert_eq!(event.extra.get("raw"), Some(&json!("{\"message\": oops")));
    }

    #[test]
    fn test_missing_message_uses_body_text() {
        let body = r#"{"level":"warn"}"#;
        let event = ingest("application/json", body);
        assert_eq!(event.message, body);
        assert_eq!(event.level, Level::Warning);
    }

    #[test]
    fn test_unknown_level_is_info() {
        let event = ingest("application/json", r#"{"message":"m","level":"loud"}"#);
        assert_eq!(event.level, Level::Info);
    }

    #[test]
    fn test_timestamp_overrides_when_valid() {
        let event = ingest(
            "application/json",
            r#"{"message":"m","timestamp":"2024-05-01T10:20:30+02:00"}"#,
        );
        assert_eq!(event.timestamp.to_rfc3339(), "2024-05-01T08:20:30+00:00");
        assert_eq!(
            event.extra.get("payload_timestamp"),
            Some(&json!("2024-05-01T10:20:30+02:00"))
        );
    }

    #[test]
    fn test_invalid_timestamp_is_kept_as_extra_only() {
        let before = Utc::now();
        let event = ingest("application/json", r#"{"message":"m","timestamp":"yesterday"}"#);
        assert!(event.timestamp >= before);
        assert_eq!(event.extra.get("payload_timestamp"), Some(&json!("yesterday")));
    }

    #[test]
    fn test_placeholder_for_empty_body() {
        let request = request("text/plain", "");
        let event = build_event(&request, None);
        assert_eq!(event.message, EMPTY_MESSAGE);
    }

    #[test]
    fn test_invalid_utf8_body_is_lossy() {
        let mut request = request("text/plain", "");
        request.body = Bytes::from_static(&[b'o', b'k', 0xff]);
        let event = build_event(&request, None);
        assert_eq!(event.message, "ok\u{fffd}");
    }
}
