//! Background delivery queue in front of the Sentry client.
//!
//! Handlers enqueue events through [`EventSink::capture`] and get the event
//! id back right away. A single worker task drains the queue and hands each
//! event to a delivery callback, so slow or failing upstream calls never hold
//! a request open.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::event::Event;
use crate::sentry::SentryClient;
use crate::sink::EventSink;

/// Default capacity of the delivery queue.
const DEFAULT_QUEUE_CAPACITY: usize = 1_000;

/// Boxed error returned by delivery callbacks.
pub type DeliveryError = Box<dyn std::error::Error + Send + Sync>;

/// Configuration for the transport.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Number of events that may wait for delivery
    pub queue_capacity: usize,

    /// Stamped on events that carry no environment of their own
    pub environment: Option<String>,

    /// Stamped on events that carry no release of their own
    pub release: Option<String>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            environment: None,
            release: None,
        }
    }
}

impl TransportConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            queue_capacity: config.queue_capacity,
            environment: Some(config.sentry_environment.clone()).filter(|e| !e.is_empty()),
            release: config.sentry_release.clone(),
        }
    }
}

/// Counters kept by the worker task.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportStats {
    pub delivered: u64,
    pub failed: u64,
}

/// Errors raised when an event cannot be queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("delivery queue is full")]
    Full,

    #[error("delivery queue has been closed")]
    Closed,
}

/// Queue plus worker that delivers events in the background.
pub struct Transport {
    tx: Mutex<Option<mpsc::Sender<Event>>>,
    worker: Mutex<Option<JoinHandle<TransportStats>>>,
    config: TransportConfig,
}

impl Transport {
    /// Spawn the worker task. `on_event` is awaited once per queued event.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<F, Fut>(config: TransportConfig, on_event: F) -> Self
    where
        F: Fn(Event) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), DeliveryError>> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let worker = tokio::spawn(async move {
            debug!("Transport worker started");
            let stats = transport_task(rx, on_event).await;
            debug!(delivered = stats.delivered, failed = stats.failed, "Transport worker completed");
            stats
        });

        Self {
            tx: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
            config,
        }
    }

    /// Spawn a transport that delivers through `client`.
    pub fn for_client(config: TransportConfig, client: Arc<SentryClient>) -> Self {
        Self::spawn(config, move |event| {
            let client = client.clone();
            async move {
                client
                    .send_event(&event)
                    .await
                    .map(|_| ())
                    .map_err(DeliveryError::from)
            }
        })
    }

    /// Queue an event without waiting.
    ///
    /// Returns the id the event will be delivered under.
    pub fn enqueue(&self, mut event: Event) -> Result<String, QueueError> {
        if event.environment.is_none() {
            event.environment = self.config.environment.clone();
        }
        if event.release.is_none() {
            event.release = self.config.release.clone();
        }

        let tx = self
            .tx
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or(QueueError::Closed)?;

        let event_id = event.event_id.clone();
        tx.try_send(event).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => QueueError::Full,
            mpsc::error::TrySendError::Closed(_) => QueueError::Closed,
        })?;
        Ok(event_id)
    }

    /// Stop accepting events and wait for queued ones to be delivered.
    ///
    /// Gives up after `timeout`; events still queued at that point are lost.
    /// Returns the worker's counters when it finished in time.
    pub async fn flush(&self, timeout: Duration) -> Option<TransportStats> {
        drop(self.tx.lock().unwrap_or_else(|e| e.into_inner()).take());
        let worker = self.worker.lock().unwrap_or_else(|e| e.into_inner()).take()?;

        match tokio::time::timeout(timeout, worker).await {
            Ok(Ok(stats)) => {
                info!(
                    delivered = stats.delivered,
                    failed = stats.failed,
                    "Transport flushed"
                );
                Some(stats)
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Transport worker panicked during flush");
                None
            }
            Err(_) => {
                warn!("Transport flush timed out after {:?}", timeout);
                None
            }
        }
    }
}

#[async_trait]
impl EventSink for Transport {
    async fn capture(&self, event: Event) -> Option<String> {
        match self.enqueue(event) {
            Ok(event_id) => Some(event_id),
            Err(e) => {
                warn!(error = %e, "Dropping event");
                None
            }
        }
    }
}

/// Drain `rx`, handing every event to `on_event`, until all senders are gone.
pub async fn transport_task<F, Fut>(mut rx: mpsc::Receiver<Event>, on_event: F) -> TransportStats
where
    F: Fn(Event) -> Fut,
    Fut: Future<Output = Result<(), DeliveryError>>,
{
    let mut stats = TransportStats::default();

    while let Some(event) = rx.recv().await {
        let event_id = event.event_id.clone();
        match on_event(event).await {
            Ok(()) => stats.delivered += 1,
            Err(e) => {
                stats.failed += 1;
                warn!(event_id = %event_id, error = %e, "Failed to deliver event");
            }
        }
    }

    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    fn event(message: &str) -> Event {
        let mut event = Event::new("http");
        event.message = message.to_string();
        event
    }

    fn recording() -> (Arc<Mutex<Vec<Event>>>, TransportConfig) {
        let config = TransportConfig {
            queue_capacity: 16,
            environment: Some("staging".to_string()),
            release: Some("1.2.3".to_string()),
        };
        (Arc::new(Mutex::new(Vec::new())), config)
    }

    #[test]
    fn test_transport_config_from_config() {
        let config = Config {
            sentry_environment: "production".to_string(),
            sentry_release: Some("abc".to_string()),
            queue_capacity: 7,
            ..Config::default()
        };
        let transport = TransportConfig::from_config(&config);
        assert_eq!(transport.queue_capacity, 7);
        assert_eq!(transport.environment.as_deref(), Some("production"));
        assert_eq!(transport.release.as_deref(), Some("abc"));
    }

    #[tokio::test]
    async fn test_capture_returns_id_and_delivers_in_order() {
        let (seen, config) = recording();
        let sink = seen.clone();
        let transport = Transport::spawn(config, move |event| {
            let sink = sink.clone();
            async move {
                sink.lock().unwrap().push(event);
                Ok::<(), DeliveryError>(())
            }
        });

        let first = event("a");
        let first_id = first.event_id.clone();
        assert_eq!(transport.capture(first).await, Some(first_id.clone()));
        assert!(transport.capture(event("b")).await.is_some());

        let stats = transport.flush(Duration::from_secs(1)).await.unwrap();
        assert_eq!(stats, TransportStats { delivered: 2, failed: 0 });

        let seen = seen.lock().unwrap();
        assert_eq!(seen[0].event_id, first_id);
        assert_eq!(seen[1].message, "b");
        assert_eq!(seen[0].environment.as_deref(), Some("staging"));
        assert_eq!(seen[0].release.as_deref(), Some("1.2.3"));
    }

    #[tokio::test]
    async fn test_existing_environment_is_kept() {
        let (seen, config) = recording();
        let sink = seen.clone();
        let transport = Transport::spawn(config, move |event| {
            let sink = sink.clone();
            async move {
                sink.lock().unwrap().push(event);
                Ok::<(), DeliveryError>(())
            }
        });

        let mut event = event("a");
        event.environment = Some("canary".to_string());
        transport.capture(event).await;
        transport.flush(Duration::from_secs(1)).await;

        assert_eq!(seen.lock().unwrap()[0].environment.as_deref(), Some("canary"));
    }

    #[tokio::test]
    async fn test_failed_deliveries_are_counted() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let transport = Transport::spawn(TransportConfig::default(), move |_event| {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    return Err::<(), DeliveryError>("upstream down".into());
                }
                Ok::<(), DeliveryError>(())
            }
        });

        transport.capture(event("a")).await;
        transport.capture(event("b")).await;

        let stats = transport.flush(Duration::from_secs(1)).await.unwrap();
        assert_eq!(stats, TransportStats { delivered: 1, failed: 1 });
    }

    #[tokio::test]
    async fn test_full_queue_drops_event() {
        let gate = Arc::new(Notify::new());
        let release = gate.clone();
        let config = TransportConfig {
            queue_capacity: 1,
            ..TransportConfig::default()
        };
        let transport = Transport::spawn(config, move |_event| {
            let gate = gate.clone();
            async move {
                gate.notified().await;
                Ok::<(), DeliveryError>(())
            }
        });

        // First event is taken by the worker and blocks it, second fills the queue.
        assert!(transport.enqueue(event("a")).is_ok());
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(transport.enqueue(event("b")).is_ok());

        assert_eq!(transport.enqueue(event("c")), Err(QueueError::Full));
        assert_eq!(transport.capture(event("d")).await, None);

        release.notify_one();
        release.notify_one();
        let stats = transport.flush(Duration::from_secs(1)).await.unwrap();
        assert_eq!(stats.delivered, 2);
    }

    #[tokio::test]
    async fn test_capture_after_flush_is_rejected() {
        let transport = Transport::spawn(TransportConfig::default(), |_event| async {
            Ok::<(), DeliveryError>(())
        });
        transport.flush(Duration::from_secs(1)).await;

        assert_eq!(transport.enqueue(event("late")), Err(QueueError::Closed));
        assert_eq!(transport.capture(event("late")).await, None);
        assert!(transport.flush(Duration::from_secs(1)).await.is_none());
    }

    #[tokio::test]
    async fn test_flush_times_out_on_stuck_delivery() {
        let transport = Transport::spawn(TransportConfig::default(), |_event| async {
            std::future::pending::<()>().await;
            Ok::<(), DeliveryError>(())
        });
        transport.capture(event("a")).await;

        assert!(transport.flush(Duration::from_millis(50)).await.is_none());
    }
}
