//! Canonical event record submitted to the error tracker.
//!
//! Both decoders produce an [`Event`]. The record serializes to the JSON
//! shape accepted by the Sentry store endpoint.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::level::Level;

/// HTTP request context attached to an event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestContext {
    pub url: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub method: String,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub query_string: String,
}

/// User context attached to an event. Only the IP address is ever known.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserContext {
    pub ip_address: String,
}

/// A normalized error-tracking event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// 32 hex digit identifier, assigned at creation
    pub event_id: String,

    /// When the event happened; submission time unless the producer said otherwise
    pub timestamp: DateTime<Utc>,

    /// Which decoder produced the event
    pub logger: String,

    pub platform: String,

    pub level: Level,

    pub message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release: Option<String>,

    /// Tag values are never empty
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<RequestContext>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<UserContext>,
}

impl Event {
    /// Create an info-level event stamped with the current time.
    pub fn new(logger: impl Into<String>) -> Self {
        Self {
            event_id: Uuid::new_v4().simple().to_string(),
            timestamp: Utc::now(),
            logger: logger.into(),
            platform: "other".to_string(),
            level: Level::Info,
            message: String::new(),
            environment: None,
            release: None,
            tags: BTreeMap::new(),
            extra: Map::new(),
            request: None,
            user: None,
        }
    }

    /// Set a tag. Pairs with an empty key or value are ignored.
    pub fn insert_tag(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        if key.is_empty() || value.is_empty() {
            return;
        }
        self.tags.insert(key, value);
    }

    pub fn insert_extra(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.extra.insert(key.into(), value.into());
    }

    /// Replace an empty message with `placeholder`.
    pub fn ensure_message(&mut self, placeholder: &str) {
        if self.message.is_empty() {
            self.message = placeholder.to_string();
        }
    }
}
