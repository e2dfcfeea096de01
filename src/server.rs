//! HTTP listener: routing, middleware and graceful shutdown.
//!
//! Routes:
//! - `<HTTP_PATH>` generic log payloads (bearer auth when configured)
//! - `<HTTP_FASTLY_PATH>` Fastly real-time logs (bearer auth when configured)
//! - `GET /health`
//! - `GET /.well-known/fastly/logging/challenge`
//!
//! Both ingest routes accept every method so that the ingest handlers can
//! answer 405 themselves after authentication.

use std::future::{Future, IntoFuture};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{ConnectInfo, Request, State};
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::StatusCode;
use axum::middleware::{from_fn, from_fn_with_state, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get};
use axum::Router;
use subtle::ConstantTimeEq;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::timeout::TimeoutLayer;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::fastly;
use crate::handler::{self, Accepted, IngestError};
use crate::sink::EventSink;

/// Shared state handed to every route.
#[derive(Clone)]
pub struct AppState {
    pub sink: Arc<dyn EventSink>,
    pub max_body_bytes: usize,
    pub auth_token: Option<Arc<str>>,
    pub fastly_service_id: Option<Arc<str>>,
}

impl AppState {
    pub fn new(config: &Config, sink: Arc<dyn EventSink>) -> Self {
        Self {
            sink,
            max_body_bytes: config.max_body_bytes,
            auth_token: config.auth_token.as_deref().map(Arc::from),
            fastly_service_id: config.fastly_service_id.as_deref().map(Arc::from),
        }
    }
}

/// Build the router for the configured paths.
///
/// Middleware, outermost first: request logging, request timeout, and
/// bearer auth on the ingest routes only.
pub fn build_router(config: &Config, sink: Arc<dyn EventSink>) -> Router {
    let state = AppState::new(config, sink);

    let public_routes = Router::new()
        .route("/health", get(health))
        .route(fastly::CHALLENGE_PATH, get(challenge));

    let ingest_routes = Router::new()
        .route(&config.http_path, any(ingest_generic))
        .route(&config.fastly_path, any(ingest_fastly))
        .layer(from_fn_with_state(state.clone(), require_bearer));

    Router::new()
        .merge(public_routes)
        .merge(ingest_routes)
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            config.request_timeout,
        ))
        .layer(from_fn(log_requests))
        .with_state(state)
}

async fn ingest_generic(
    State(state): State<AppState>,
    request: Request,
) -> Result<Accepted, IngestError> {
    let raw = handler::read_request(request, state.max_body_bytes).await?;
    Ok(handler::ingest_generic(raw, state.sink.as_ref()).await)
}

async fn ingest_fastly(
    State(state): State<AppState>,
    request: Request,
) -> Result<Accepted, IngestError> {
    let raw = handler::read_request(request, state.max_body_bytes).await?;
    handler::ingest_fastly(raw, state.sink.as_ref()).await
}

async fn health() -> &'static str {
    "ok"
}

async fn challenge(State(state): State<AppState>) -> Response {
    match state
        .fastly_service_id
        .as_deref()
        .and_then(fastly::challenge_response)
    {
        Some(body) => (
            StatusCode::OK,
            [(CONTENT_TYPE, "text/plain; charset=utf-8")],
            body,
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// Require `Authorization: Bearer <token>` when a token is configured.
pub async fn require_bearer(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, IngestError> {
    let Some(token) = state.auth_token.as_deref() else {
        return Ok(next.run(request).await);
    };

    let provided = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .unwrap_or_default();
    let expected = format!("Bearer {}", token);

    if bool::from(provided.as_bytes().ct_eq(expected.as_bytes())) {
        Ok(next.run(request).await)
    } else {
        warn!(path = %request.uri().path(), "Rejected request with missing or invalid bearer token");
        Err(IngestError::Unauthorized)
    }
}

/// Log one line per request.
pub async fn log_requests(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let remote_addr = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.to_string())
        .unwrap_or_default();
    let start = Instant::now();

    let response = next.run(request).await;

    info!(
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        duration_ms = start.elapsed().as_millis() as u64,
        remote_addr = %remote_addr,
        "Request completed"
    );

    response
}

/// Serve `router` on `listener` until `signal` resolves.
///
/// Once the signal fires no new connections are accepted and in-flight
/// requests get `shutdown_grace` to finish before they are abandoned.
pub async fn serve<S>(
    listener: TcpListener,
    router: Router,
    shutdown_grace: Duration,
    signal: S,
) -> std::io::Result<()>
where
    S: Future<Output = ()> + Send + 'static,
{
    let (stopping_tx, mut stopping_rx) = watch::channel(false);

    let server = axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        signal.await;
        let _ = stopping_tx.send(true);
    })
    .into_future();
    tokio::pin!(server);

    tokio::select! {
        biased;

        result = &mut server => result,
        _ = stopping_rx.changed() => {
            match tokio::time::timeout(shutdown_grace, &mut server).await {
                Ok(result) => result,
                Err(_) => {
                    warn!("In-flight requests still running after {:?}, abandoning them", shutdown_grace);
                    Ok(())
                }
            }
        }
    }
}

/// Bind the configured address and serve until SIGINT or SIGTERM.
pub async fn run(config: &Config, sink: Arc<dyn EventSink>) -> std::io::Result<()> {
    let router = build_router(config, sink);
    let listener = TcpListener::bind(config.http_addr).await?;

    info!(
        addr = %listener.local_addr()?,
        http_path = %config.http_path,
        fastly_path = %config.fastly_path,
        auth = config.auth_token.is_some(),
        challenge = config.fastly_service_id.is_some(),
        max_body_bytes = config.max_body_bytes,
        "HTTP listener started"
    );

    serve(listener, router, config.shutdown_grace, shutdown_signal()).await?;

    info!("HTTP listener stopped");
    Ok(())
}

/// Resolve on Ctrl+C or SIGTERM.
pub async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
