//! Severity scale shared by every event source.
//!
//! Two classifiers feed the same five-level scale: free-text level labels
//! sent by generic producers, and the response outcome / status code pair
//! carried by Fastly log records.

use serde::{Deserialize, Serialize};

/// Event severity, ordered from least to most severe.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Debug,
    #[default]
    Info,
    Warning,
    Error,
    Fatal,
}

impl Level {
    /// Get all possible levels in ascending order.
    pub fn all() -> &'static [Level] {
        &[
            Level::Debug,
            Level::Info,
            Level::Warning,
            Level::Error,
            Level::Fatal,
        ]
    }

    /// Classify a free-text level label.
    ///
    /// Matching ignores case and surrounding whitespace. Unknown labels and
    /// the empty string map to [`Level::Info`].
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "fatal" => Level::Fatal,
            "error" => Level::Error,
            "warning" | "warn" => Level::Warning,
            "debug" => Level::Debug,
            _ => Level::Info,
        }
    }

    /// Classify a Fastly response by its outcome string and status code.
    ///
    /// A recognised outcome wins over the status code. A status of `0`
    /// means the producer did not send one.
    pub fn from_response(outcome: &str, status: i64) -> Self {
        match outcome.trim().to_ascii_lowercase().as_str() {
            "error" | "fail" | "failed" => return Level::Error,
            "warning" | "warn" => return Level::Warning,
            _ => {}
        }

        if status >= 500 {
            Level::Error
        } else if status >= 400 {
            Level::Warning
        } else {
            Level::Info
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warning => "warning",
            Level::Error => "error",
            Level::Fatal => "fatal",
        }
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
