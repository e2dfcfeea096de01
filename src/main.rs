//! http-to-sentry - HTTP log ingestion service that forwards events to Sentry
//!
//! Accepts generic log payloads and Fastly real-time log deliveries over
//! HTTP, normalizes them into Sentry events and delivers them in the
//! background.
//!
//! ## Configuration
//!
//! Configuration is loaded from environment variables:
//!
//! - `HTTP_ADDR`: listen address (default: 0.0.0.0:8080)
//! - `HTTP_PATH`: generic ingest path (default: /ingest)
//! - `HTTP_FASTLY_PATH`: Fastly ingest path (default: /fastly)
//! - `HTTP_AUTH_TOKEN`: bearer token for both ingest paths (default: none)
//! - `HTTP_MAX_BODY_BYTES`: request body ceiling (default: 262144)
//! - `FASTLY_SERVICE_ID`: enables the logging challenge endpoint
//! - `SENTRY_DSN`: Sentry project DSN; events are dropped when unset
//! - `SENTRY_ENVIRONMENT` / `SENTRY_RELEASE`: stamped on every event
//! - `RUST_LOG`: Logging level filter (default: info)

use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use http_to_sentry::config::Config;
use http_to_sentry::sentry::SentryClient;
use http_to_sentry::server;
use http_to_sentry::sink::{DisabledSink, EventSink};
use http_to_sentry::transport::{Transport, TransportConfig};

#[tokio::main]
async fn main() {
    init_tracing();

    info!("Starting http-to-sentry...");

    let config = match Config::from_env() {
        Ok(config) => {
            info!(
                http_addr = %config.http_addr,
                environment = %config.sentry_environment,
                max_retries = config.max_retries,
                queue_capacity = config.queue_capacity,
                "Configuration loaded"
            );
            config
        }
        Err(e) => {
            error!(error = %e, "Failed to load configuration");
            std::process::exit(1);
        }
    };

    let transport = if config.sentry_dsn.is_some() {
        match SentryClient::new(&config) {
            Ok(client) => {
                info!(store_url = %client.store_url(), "Sentry client initialized");
                Some(Arc::new(Transport::for_client(
                    TransportConfig::from_config(&config),
                    Arc::new(client),
                )))
            }
            Err(e) => {
                error!(error = %e, "Failed to create Sentry client");
                std::process::exit(1);
            }
        }
    } else {
        warn!("SENTRY_DSN is not set, events will be dropped");
        None
    };

    let sink: Arc<dyn EventSink> = match &transport {
        Some(transport) => transport.clone(),
        None => Arc::new(DisabledSink),
    };

    let served = server::run(&config, sink).await;
    if let Err(e) = &served {
        error!(error = %e, "HTTP listener failed");
    }

    if let Some(transport) = transport {
        info!("Flushing queued events...");
        transport.flush(config.flush_timeout).await;
    }

    info!("http-to-sentry stopped");
    if served.is_err() {
        std::process::exit(1);
    }
}

/// Initialize the tracing subscriber with environment-based filtering.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();
}
