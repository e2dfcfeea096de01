//! Fastly real-time log records.
//!
//! Fastly posts either one JSON record per request or a JSON array of
//! records. Each record becomes one canonical event whose level is derived
//! from the response outcome and status code.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use reqwest::Url;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::event::{Event, RequestContext, UserContext};
use crate::level::Level;

/// Logger name stamped on events built from Fastly records.
pub const LOGGER: &str = "fastly";

/// Leading token of every Fastly event message.
pub const MESSAGE_TAG: &str = "FASTLY";

/// Message used if no message could be derived at all.
pub const EMPTY_MESSAGE: &str = "fastly event";

/// Well-known path Fastly probes before enabling a logging endpoint.
pub const CHALLENGE_PATH: &str = "/.well-known/fastly/logging/challenge";

/// Native Fastly timestamp layout, e.g. `2026-01-29T11:41:12+0000`.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%z";

/// One access-log record emitted by a Fastly service.
///
/// Missing and `null` fields default to empty strings, zero or `false`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FastlyEvent {
    #[serde(deserialize_with = "null_as_default")]
    pub timestamp: String,
    #[serde(deserialize_with = "null_as_default")]
    pub client_ip: String,
    #[serde(deserialize_with = "null_as_default")]
    pub geo_country: String,
    #[serde(deserialize_with = "null_as_default")]
    pub geo_city: String,
    #[serde(deserialize_with = "null_as_default")]
    pub host: String,
    #[serde(deserialize_with = "null_as_default")]
    pub url: String,
    #[serde(deserialize_with = "null_as_default")]
    pub original_url: String,
    #[serde(deserialize_with = "null_as_default")]
    pub request_method: String,
    #[serde(deserialize_with = "null_as_default")]
    pub request_protocol: String,
    #[serde(deserialize_with = "null_as_default")]
    pub request_referer: String,
    #[serde(deserialize_with = "null_as_default")]
    pub request_user_agent: String,
    #[serde(deserialize_with = "null_as_default")]
    pub response_state: String,

    /// HTTP status; `0` when absent
    #[serde(deserialize_with = "null_as_default")]
    pub response_status: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub response_reason: String,
    #[serde(deserialize_with = "null_as_default")]
    pub response_body_size: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub tls_client_ja3_md5: String,
    #[serde(deserialize_with = "null_as_default")]
    pub fastly_server: String,
    #[serde(deserialize_with = "null_as_default")]
    pub fastly_is_edge: bool,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Shape a decoded body turned out to have.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    Single(FastlyEvent),
    Batch(Vec<FastlyEvent>),
}

impl Decoded {
    pub fn into_events(self) -> Vec<FastlyEvent> {
        match self {
            Decoded::Single(event) => vec![event],
            Decoded::Batch(events) => events,
        }
    }
}

/// Decode a request body as one record or an array of records.
///
/// The single-object parse is always attempted first; the array parse only
/// runs when it fails. An empty array decodes successfully to an empty
/// batch. Returns `None` when neither shape matches.
pub fn decode(body: &[u8]) -> Option<Decoded> {
    if let Ok(object) = serde_json::from_slice::<Map<String, Value>>(body) {
        if let Ok(single) = from_object(object) {
            return Some(Decoded::Single(single));
        }
    }

    let objects = serde_json::from_slice::<Vec<Map<String, Value>>>(body).ok()?;
    objects
        .into_iter()
        .map(from_object)
        .collect::<Result<Vec<_>, _>>()
        .ok()
        .map(Decoded::Batch)
}

// Records must be JSON objects; the derived deserializer alone would also
// accept a positional array.
fn from_object(object: Map<String, Value>) -> Result<FastlyEvent, serde_json::Error> {
    serde_json::from_value(Value::Object(object))
}

/// Build the canonical event for one Fastly record.
///
/// `remote_addr` is the address of the connection that delivered the log,
/// not the client the record describes.
pub fn build_event(record: &FastlyEvent, remote_addr: &str) -> Event {
    let mut event = Event::new(LOGGER);
    event.level = Level::from_response(&record.response_state, record.response_status);
    event.message = build_message(record);
    event.ensure_message(EMPTY_MESSAGE);

    if let Some(timestamp) = parse_timestamp(&record.timestamp) {
        event.timestamp = timestamp;
    }

    event.insert_tag("host", record.host.as_str());
    event.insert_tag("response_state", record.response_state.as_str());
    event.insert_tag("request_method", record.request_method.as_str());
    event.insert_tag("request_protocol", record.request_protocol.as_str());
    event.insert_tag("fastly_server", record.fastly_server.as_str());
    event.insert_tag("geo_country", record.geo_country.as_str());
    event.insert_tag("geo_city", record.geo_city.as_str());
    event.insert_tag("tls_client_ja3_md5", record.tls_client_ja3_md5.as_str());
    if record.fastly_is_edge {
        event.insert_tag("fastly_is_edge", "true");
    }
    event.insert_tag("remote_addr", remote_addr);

    event.insert_extra("fastly", serde_json::to_value(record).unwrap_or_default());
    event.insert_extra("fastly_timestamp", record.timestamp.as_str());

    if let Some(url) = build_url(record) {
        let mut headers = BTreeMap::new();
        for (name, value) in [
            ("User-Agent", &record.request_user_agent),
            ("Referer", &record.request_referer),
        ] {
            if !value.is_empty() {
                headers.insert(name.to_string(), value.clone());
            }
        }

        event.request = Some(RequestContext {
            query_string: query_string(&url),
            url,
            method: record.request_method.clone(),
            headers,
        });
    }

    if !record.client_ip.is_empty() {
        event.user = Some(UserContext {
            ip_address: record.client_ip.clone(),
        });
    }

    event
}

/// `FASTLY <OUTCOME> <STATUS> (<reason>)`, skipping whatever is missing.
fn build_message(record: &FastlyEvent) -> String {
    let mut parts = vec![MESSAGE_TAG.to_string()];

    let outcome = record.response_state.trim().to_uppercase();
    if !outcome.is_empty() {
        parts.push(outcome);
    }
    if record.response_status != 0 {
        parts.push(record.response_status.to_string());
    }

    let mut message = parts.join(" ");
    let reason = record.response_reason.trim();
    if !reason.is_empty() {
        message.push_str(&format!(" ({})", reason));
    }
    message
}

fn build_url(record: &FastlyEvent) -> Option<String> {
    if record.host.is_empty() && record.url.is_empty() {
        return None;
    }

    let path = match record.url.as_str() {
        "" => "/".to_string(),
        p if p.starts_with('/') => p.to_string(),
        p => format!("/{}", p),
    };
    Some(format!("https://{}{}", record.host, path))
}

fn query_string(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| u.query().map(str::to_string))
        .unwrap_or_default()
}

/// Parse a Fastly timestamp, accepting RFC 3339 as a fallback.
fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    DateTime::parse_from_str(value, TIMESTAMP_FORMAT)
        .or_else(|_| DateTime::parse_from_rfc3339(value))
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

/// Body served on [`CHALLENGE_PATH`]: the hex SHA-256 of the service id
/// followed by a newline. `None` when no service id is configured.
pub fn challenge_response(service_id: &str) -> Option<String> {
    let service_id = service_id.trim();
    if service_id.is_empty() {
        return None;
    }
    let digest = Sha256::digest(service_id.as_bytes());
    Some(format!("{}\n", hex::encode(digest)))
}
