//! Submission of canonical events to the error tracker.
//!
//! The tracker is reached through the [`EventSink`] trait so that handlers
//! receive a process-scoped handle instead of touching global client state.

use async_trait::async_trait;
use tracing::debug;

use crate::event::Event;

/// Destination for canonical events.
///
/// Implementations must be safe to call from many requests at once and
/// must not hand back a modified copy of the event.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Accept an event, returning a tracking id when one was assigned.
    async fn capture(&self, event: Event) -> Option<String>;
}

/// Outcome of submitting one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    /// Accepted with an id the caller can report back
    Tracked(String),

    /// Accepted, but no id is available
    Untracked,
}

impl Submission {
    pub fn event_id(&self) -> Option<&str> {
        match self {
            Submission::Tracked(id) => Some(id),
            Submission::Untracked => None,
        }
    }
}

/// Submit one event. An absent or empty id is still an accepted event.
pub async fn submit(sink: &dyn EventSink, event: Event) -> Submission {
    match sink.capture(event).await {
        Some(id) if !id.is_empty() => Submission::Tracked(id),
        _ => Submission::Untracked,
    }
}

/// Submit events in order and collect the ids that came back.
///
/// Untracked submissions are left out rather than failing the batch.
pub async fn submit_all(sink: &dyn EventSink, events: Vec<Event>) -> Vec<String> {
    let mut ids = Vec::with_capacity(events.len());
    for event in events {
        if let Submission::Tracked(id) = submit(sink, event).await {
            ids.push(id);
        }
    }
    ids
}

/// Sink used when no DSN is configured. Events are dropped.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledSink;

#[async_trait]
impl EventSink for DisabledSink {
    async fn capture(&self, event: Event) -> Option<String> {
        debug!(event_id = %event.event_id, logger = %event.logger, "Dropping event, no DSN configured");
        None
    }
}
