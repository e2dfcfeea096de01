//! Request handling for both ingest endpoints.
//!
//! Each request is read through the bounded reader, decoded, turned into
//! canonical events and submitted. The result is either an [`Accepted`]
//! outcome or an [`IngestError`], both of which render as HTTP responses.

use std::net::SocketAddr;

use axum::body::Body;
use axum::extract::{ConnectInfo, Request};
use axum::http::request::Parts;
use axum::http::{header, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use futures::Stream;
use serde_json::json;
use tracing::{debug, warn};

use crate::body::{self, BodyError};
use crate::fastly;
use crate::payload;
use crate::sink::{self, EventSink};

/// Largest body prefix written to debug logs
pub const PREVIEW_BYTES: usize = 4096;

/// Request fields the decoders work from.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRequest {
    pub method: Method,
    pub path: String,
    pub content_type: String,
    /// `ip:port` of the connection, empty when unknown
    pub remote_addr: String,
    pub body: Bytes,
}

impl RawRequest {
    pub fn from_parts(parts: &Parts, body: Bytes) -> Self {
        let content_type = parts
            .headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        let remote_addr = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.to_string())
            .unwrap_or_default();

        Self {
            method: parts.method.clone(),
            path: parts.uri.path().to_string(),
            content_type,
            remote_addr,
            body,
        }
    }
}

/// Ways an ingest request can be rejected.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("method not allowed")]
    MethodNotAllowed,

    #[error("unauthorized")]
    Unauthorized,

    #[error(transparent)]
    Read(#[from] BodyError),

    #[error("request body exceeds {limit} bytes")]
    TooLarge { limit: usize },

    #[error("request body is empty")]
    EmptyBody,

    #[error("request body is not a log record or array of records")]
    Unparseable,

    #[error("request body contains no events")]
    NoEvents,
}

impl IngestError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            IngestError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            IngestError::Unauthorized => StatusCode::UNAUTHORIZED,
            IngestError::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            IngestError::Read(_)
            | IngestError::EmptyBody
            | IngestError::Unparseable
            | IngestError::NoEvents => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for IngestError {
    fn into_response(self) -> Response {
        debug!(error = %self, status = %self.status_code(), "Rejecting request");
        self.status_code().into_response()
    }
}

/// Successful ingest outcome; always rendered as 202.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Accepted {
    /// One event, with its id when the sink reported one
    Single(Option<String>),

    /// Ids of the tracked events of a batch, in submission order
    Batch(Vec<String>),
}

impl IntoResponse for Accepted {
    fn into_response(self) -> Response {
        match self {
            Accepted::Single(Some(id)) => {
                (StatusCode::ACCEPTED, Json(json!({ "event_id": id }))).into_response()
            }
            Accepted::Single(None) => StatusCode::ACCEPTED.into_response(),
            Accepted::Batch(ids) => {
                (StatusCode::ACCEPTED, Json(json!({ "event_ids": ids }))).into_response()
            }
        }
    }
}

pub fn ensure_post(method: &Method) -> Result<(), IngestError> {
    if *method == Method::POST {
        Ok(())
    } else {
        Err(IngestError::MethodNotAllowed)
    }
}

/// Read a body through the bounded reader, rejecting oversized and empty ones.
pub async fn read_body<S, E>(stream: S, limit: usize) -> Result<Bytes, IngestError>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: std::fmt::Display,
{
    let body = body::read_limited(stream, limit).await?;
    if body.truncated {
        return Err(IngestError::TooLarge { limit });
    }
    if body.is_empty() {
        return Err(IngestError::EmptyBody);
    }
    Ok(body.bytes)
}

/// Check the method and read the body of an incoming request.
pub async fn read_request(request: Request<Body>, limit: usize) -> Result<RawRequest, IngestError> {
    let (parts, incoming) = request.into_parts();
    ensure_post(&parts.method)?;

    let body = read_body(incoming.into_data_stream(), limit).await.map_err(|e| {
        if let IngestError::Read(ref err) = e {
            warn!(error = %err, path = %parts.uri.path(), "Failed to read request body");
        }
        e
    })?;

    Ok(RawRequest::from_parts(&parts, body))
}

/// Handle a generic log payload.
pub async fn ingest_generic(request: RawRequest, sink: &dyn EventSink) -> Accepted {
    debug!(
        remote_addr = %request.remote_addr,
        content_type = %request.content_type,
        bytes = request.body.len(),
        body = %body::preview(&request.body, PREVIEW_BYTES),
        "Received log payload"
    );

    let payload = payload::decode(&request.content_type, &request.body);
    let event = payload::build_event(&request, payload);
    let submission = sink::submit(sink, event).await;

    Accepted::Single(submission.event_id().map(str::to_string))
}

/// Handle a Fastly real-time log delivery of one record or a batch.
pub async fn ingest_fastly(request: RawRequest, sink: &dyn EventSink) -> Result<Accepted, IngestError> {
    debug!(
        remote_addr = %request.remote_addr,
        bytes = request.body.len(),
        body = %body::preview(&request.body, PREVIEW_BYTES),
        "Received Fastly payload"
    );

    let records = fastly::decode(&request.body)
        .ok_or(IngestError::Unparseable)?
        .into_events();
    if records.is_empty() {
        return Err(IngestError::NoEvents);
    }

    let events = records
        .iter()
        .map(|record| fastly::build_event(record, &request.remote_addr))
        .collect();
    let ids = sink::submit_all(sink, events).await;

    debug!(records = records.len(), tracked = ids.len(), "Submitted Fastly events");
    Ok(Accepted::Batch(ids))
}
