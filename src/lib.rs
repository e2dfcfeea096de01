//! HTTP to Sentry ingestion library
//!
//! This library turns HTTP-delivered log payloads into Sentry events:
//!
//! - **body**: bounded request body reader
//! - **payload**: generic log payload decoding and event building
//! - **fastly**: Fastly real-time log decoding, event building and the
//!   logging verification challenge
//! - **level**: severity classification
//! - **event**: the canonical event record
//! - **sink**: the [`EventSink`] seam and submission outcome handling
//! - **transport**: background delivery queue
//! - **sentry**: DSN parsing and the store endpoint client
//! - **handler**: per-request ingest flow and HTTP outcomes
//! - **server**: axum router, middleware and graceful shutdown
//! - **config**: environment-based configuration
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use http_to_sentry::config::Config;
//! use http_to_sentry::sentry::SentryClient;
//! use http_to_sentry::transport::{Transport, TransportConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = Config::from_env().expect("Failed to load config");
//!     let client = SentryClient::new(&config).expect("Failed to create client");
//!
//!     let transport = Arc::new(Transport::for_client(
//!         TransportConfig::from_config(&config),
//!         Arc::new(client),
//!     ));
//!
//!     http_to_sentry::server::run(&config, transport.clone()).await.ok();
//!     transport.flush(config.flush_timeout).await;
//! }
//! ```

pub mod body;
pub mod config;
pub mod event;
pub mod fastly;
pub mod handler;
pub mod level;
pub mod payload;
pub mod sentry;
pub mod server;
pub mod sink;
pub mod transport;

pub use config::{Config, ConfigError};
pub use event::{Event, RequestContext, UserContext};
pub use handler::{Accepted, IngestError, RawRequest};
pub use level::Level;
pub use sentry::{ClientError, Dsn, DsnError, SentryClient};
pub use server::build_router;
pub use sink::{DisabledSink, EventSink, Submission};
pub use transport::{QueueError, Transport, TransportConfig};
