//! Error types for JobCompass.
//!
//! Library crates use [`JobCompassError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all JobCompass operations.
#[derive(Debug, thiserror::Error)]
pub enum JobCompassError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Missing or rejected credentials for a source. Never retried.
    #[error("auth error ({source_name}): {message}")]
    Auth {
        source_name: String,
        message: String,
    },

    /// Connection-level failure (reset, DNS, TLS).
    #[error("network error: {0}")]
    Network(String),

    /// Per-call timeout elapsed.
    #[error("timeout: {0}")]
    Timeout(String),

    /// Non-success HTTP status.
    #[error("http {status}: {message}")]
    Http { status: u16, message: String },

    /// Response body or item could not be parsed.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (bad input, invalid format, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, JobCompassError>;

impl JobCompassError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create an auth error for the named source.
    pub fn auth(source_name: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Auth {
            source_name: source_name.into(),
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether a retry could plausibly succeed: timeouts, connection
    /// failures, HTTP 429 and 5xx.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout(_) => true,
            Self::Http { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// Whether the failure should disable the source for the rest of a run.
    pub fn disables_source(&self) -> bool {
        matches!(self, Self::Auth { .. } | Self::Config { .. })
    }
}
