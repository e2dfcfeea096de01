//! Bounded request body reader.
//!
//! Bodies arrive as a stream of byte chunks. The reader keeps at most
//! `limit + 1` bytes in memory, which is enough to tell a body that fits
//! from one that was cut at the ceiling.

use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};

/// A request body read up to a byte ceiling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LimitedBody {
    /// Body bytes, never longer than the ceiling
    pub bytes: Bytes,

    /// True when the producer sent more than the ceiling
    pub truncated: bool,
}

impl LimitedBody {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Errors raised while pulling the body off the wire.
#[derive(Debug, thiserror::Error)]
pub enum BodyError {
    #[error("failed to read request body: {0}")]
    Read(String),
}

/// Read a body stream, keeping at most `limit` bytes.
///
/// Stops pulling chunks as soon as more than `limit` bytes have been seen.
/// The stream is consumed and dropped on every path, releasing the
/// underlying connection body.
///
/// # Errors
///
/// Returns [`BodyError::Read`] if the stream yields an error before the
/// ceiling is crossed.
pub async fn read_limited<S, E>(stream: S, limit: usize) -> Result<LimitedBody, BodyError>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: std::fmt::Display,
{
    let ceiling = limit.saturating_add(1);
    let mut buf = BytesMut::with_capacity(limit.min(64 * 1024));
    let mut stream = std::pin::pin!(stream);

    while buf.len() < ceiling {
        let chunk = match stream.next().await {
            Some(Ok(chunk)) => chunk,
            Some(Err(e)) => return Err(BodyError::Read(e.to_string())),
            None => break,
        };

        let take = chunk.len().min(ceiling - buf.len());
        buf.extend_from_slice(&chunk[..take]);
    }

    let truncated = buf.len() > limit;
    if truncated {
        buf.truncate(limit);
    }

    Ok(LimitedBody {
        bytes: buf.freeze(),
        truncated,
    })
}

/// Render a body for log output, cut at `max` bytes with a trailing ellipsis.
pub fn preview(bytes: &[u8], max: usize) -> String {
    if bytes.len() <= max {
        return String::from_utf8_lossy(bytes).into_owned();
    }
    let mut text = String::from_utf8_lossy(&bytes[..max]).into_owned();
    text.push('…');
    text
}
