//! Configuration module for the ingestion service.
//!
//! Everything is read from environment variables once at startup. The
//! request-handling code only ever sees already-resolved values.

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

/// Default listen address for the HTTP listener
const DEFAULT_HTTP_ADDR: &str = "0.0.0.0:8080";

/// Default path of the generic ingest endpoint
const DEFAULT_HTTP_PATH: &str = "/ingest";

/// Default path of the Fastly log endpoint
const DEFAULT_FASTLY_PATH: &str = "/fastly";

/// Default request body ceiling in bytes
const DEFAULT_MAX_BODY_BYTES: usize = 262_144;

/// Smallest body ceiling accepted; lower values are raised to this
const MIN_MAX_BODY_BYTES: usize = 1024;

const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_SHUTDOWN_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_FLUSH_TIMEOUT_MS: u64 = 2_000;
const DEFAULT_SENTRY_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_SENTRY_ENVIRONMENT: &str = "development";
const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_QUEUE_CAPACITY: usize = 1_000;

/// Configuration for the ingestion service.
///
/// All settings can be configured via environment variables:
/// - `HTTP_ADDR`: listen address (default: 0.0.0.0:8080)
/// - `HTTP_PATH` / `HTTP_FASTLY_PATH`: endpoint paths (default: /ingest, /fastly)
/// - `HTTP_AUTH_TOKEN`: bearer token required on both endpoints (default: none)
/// - `HTTP_MAX_BODY_BYTES`: request body ceiling (default: 262144, floor 1024)
/// - `FASTLY_SERVICE_ID`: enables the logging challenge endpoint (default: none)
/// - `SENTRY_DSN`: where events are sent; events are dropped when unset
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the HTTP listener binds to
    pub http_addr: SocketAddr,

    /// Path of the generic log endpoint
    pub http_path: String,

    /// Path of the Fastly log endpoint
    pub fastly_path: String,

    /// Fastly service id answered on the challenge endpoint
    pub fastly_service_id: Option<String>,

    /// Bearer token both ingest endpoints require
    pub auth_token: Option<String>,

    /// Maximum accepted request body size in bytes
    pub max_body_bytes: usize,

    /// Per-request timeout enforced by the listener
    pub request_timeout: Duration,

    /// How long open connections get to finish after a shutdown signal
    pub shutdown_grace: Duration,

    /// Sentry DSN; `None` disables delivery
    pub sentry_dsn: Option<String>,

    /// Environment name attached to every event
    pub sentry_environment: String,

    /// Release name attached to every event
    pub sentry_release: Option<String>,

    /// Time allowed to drain queued events at shutdown
    pub flush_timeout: Duration,

    /// HTTP timeout for one call to the Sentry store endpoint
    pub sentry_timeout: Duration,

    /// Maximum number of retry attempts per event
    pub max_retries: u32,

    /// Number of events that may wait for delivery
    pub queue_capacity: usize,
}

/// Error type for configuration loading failures
#[derive(Debug)]
pub struct ConfigError {
    pub message: String,
    pub env_var: Option<String>,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.env_var {
            Some(var) => write!(f, "Configuration error for {}: {}", var, self.message),
            None => write!(f, "Configuration error: {}", self.message),
        }
    }
}

impl std::error::Error for ConfigError {}

impl ConfigError {
    fn for_var(env_var: &str, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            env_var: Some(env_var.to_string()),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Empty or whitespace-only values count as unset.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - `HTTP_ADDR` is not a socket address
    /// - a numeric variable is not a valid number
    /// - both endpoints are configured on the same path
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use http_to_sentry::config::Config;
    ///
    /// let config = Config::from_env().expect("Failed to load config");
    /// println!("Listening on {}", config.http_addr);
    /// ```
    pub fn from_env() -> Result<Self, ConfigError> {
        let http_addr = env_string("HTTP_ADDR").unwrap_or_else(|| DEFAULT_HTTP_ADDR.to_string());
        let http_addr: SocketAddr = http_addr.parse().map_err(|_| {
            ConfigError::for_var("HTTP_ADDR", format!("'{}' is not a valid socket address", http_addr))
        })?;

        let http_path = normalize_path(env_string("HTTP_PATH").as_deref(), DEFAULT_HTTP_PATH);
        let fastly_path =
            normalize_path(env_string("HTTP_FASTLY_PATH").as_deref(), DEFAULT_FASTLY_PATH);
        if http_path == fastly_path {
            return Err(ConfigError::for_var(
                "HTTP_FASTLY_PATH",
                format!("'{}' is already used by HTTP_PATH", fastly_path),
            ));
        }

        let max_body_bytes =
            parse_number("HTTP_MAX_BODY_BYTES", DEFAULT_MAX_BODY_BYTES)?.max(MIN_MAX_BODY_BYTES);

        let sentry_environment = env_string("SENTRY_ENVIRONMENT")
            .unwrap_or_else(|| DEFAULT_SENTRY_ENVIRONMENT.to_string());

        let queue_capacity = parse_number("SENTRY_QUEUE_CAPACITY", DEFAULT_QUEUE_CAPACITY)?;
        if queue_capacity == 0 {
            return Err(ConfigError::for_var(
                "SENTRY_QUEUE_CAPACITY",
                "queue capacity must be greater than 0",
            ));
        }

        Ok(Self {
            http_addr,
            http_path,
            fastly_path,
            fastly_service_id: env_string("FASTLY_SERVICE_ID"),
            auth_token: env_string("HTTP_AUTH_TOKEN"),
            max_body_bytes,
            request_timeout: parse_millis("HTTP_REQUEST_TIMEOUT_MS", DEFAULT_REQUEST_TIMEOUT_MS)?,
            shutdown_grace: parse_millis("HTTP_SHUTDOWN_TIMEOUT_MS", DEFAULT_SHUTDOWN_TIMEOUT_MS)?,
            sentry_dsn: env_string("SENTRY_DSN"),
            sentry_environment,
            sentry_release: env_string("SENTRY_RELEASE"),
            flush_timeout: parse_millis("SENTRY_FLUSH_TIMEOUT_MS", DEFAULT_FLUSH_TIMEOUT_MS)?,
            sentry_timeout: parse_millis("SENTRY_REQUEST_TIMEOUT_MS", DEFAULT_SENTRY_TIMEOUT_MS)?,
            max_retries: parse_number("SENTRY_MAX_RETRIES", DEFAULT_MAX_RETRIES)?,
            queue_capacity,
        })
    }
}

impl Default for Config {
    /// Create a default configuration using default values.
    ///
    /// This is useful for testing or when environment variables are not set.
    fn default() -> Self {
        Self {
            http_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            http_path: DEFAULT_HTTP_PATH.to_string(),
            fastly_path: DEFAULT_FASTLY_PATH.to_string(),
            fastly_service_id: None,
            auth_token: None,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
            shutdown_grace: Duration::from_millis(DEFAULT_SHUTDOWN_TIMEOUT_MS),
            sentry_dsn: None,
            sentry_environment: DEFAULT_SENTRY_ENVIRONMENT.to_string(),
            sentry_release: None,
            flush_timeout: Duration::from_millis(DEFAULT_FLUSH_TIMEOUT_MS),
            sentry_timeout: Duration::from_millis(DEFAULT_SENTRY_TIMEOUT_MS),
            max_retries: DEFAULT_MAX_RETRIES,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

/// Read a variable, trimmed. Unset and blank values are `None`.
fn env_string(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_number<T: FromStr>(env_var: &str, default: T) -> Result<T, ConfigError> {
    match env_string(env_var) {
        Some(value) => value
            .parse()
            .map_err(|_| ConfigError::for_var(env_var, format!("'{}' is not a valid number", value))),
        None => Ok(default),
    }
}

/// Parse a millisecond duration. Zero and negative values fall back to the default.
fn parse_millis(env_var: &str, default_ms: u64) -> Result<Duration, ConfigError> {
    let millis: i64 = parse_number(env_var, default_ms as i64)?;
    if millis <= 0 {
        return Ok(Duration::from_millis(default_ms));
    }
    Ok(Duration::from_millis(millis as u64))
}

fn normalize_path(value: Option<&str>, default: &str) -> String {
    match value {
        Some(path) if path.starts_with('/') => path.to_string(),
        Some(path) => format!("/{}", path),
        None => default.to_string(),
    }
}
