//! Error types for drive-mirror
//!
//! Every failure the pipeline can observe is classified into one of these
//! variants. The classification decides whether an error is retried, skipped,
//! isolated to one file or subtree, or fatal for the whole run.

use std::fmt;

/// Main error type for drive-mirror operations
#[derive(Debug)]
pub enum Error {
    /// Retryable network fault, rate limit or server-side hiccup
    Transient(String),

    /// Provider-native document with no binary export
    NotExportable(String),

    /// Node disappeared or never existed
    NotFound(String),

    /// Credential lapsed or was rejected
    AuthExpired(String),

    /// Two distinct source nodes map to the same destination key
    KeyCollision { key: String, source_id: String },

    /// Non-retryable HTTP error from the source provider
    Http(String),

    /// Non-retryable failure reported by the destination store
    Destination(String),

    /// Local I/O error
    IoError(std::io::Error),

    /// Invalid configuration or parameters
    InvalidInput(String),

    /// Work was abandoned because the run was cancelled
    Cancelled,
}

impl Error {
    /// Whether the transfer worker should retry after this error
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Transient(_))
    }

    /// Whether this error aborts the whole run
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::AuthExpired(_))
    }

    /// Whether this error is an expected skip rather than a failure
    pub fn is_skip(&self) -> bool {
        matches!(self, Error::NotExportable(_))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Transient(msg) => {
                write!(f, "Transient error: {}", msg)
            }
            Error::NotExportable(msg) => {
                write!(f, "Not exportable: {}", msg)
            }
            Error::NotFound(msg) => {
                write!(f, "Not found: {}", msg)
            }
            Error::AuthExpired(msg) => {
                write!(f, "Authorization expired or rejected: {}", msg)
            }
            Error::KeyCollision { key, source_id } => {
                write!(
                    f,
                    "Destination key '{}' already claimed; refusing to overwrite with node {}",
                    key, source_id
                )
            }
            Error::Http(msg) => {
                write!(f, "HTTP error: {}", msg)
            }
            Error::Destination(msg) => {
                write!(f, "Destination error: {}", msg)
            }
            Error::IoError(err) => {
                write!(f, "I/O error: {}", err)
            }
            Error::InvalidInput(msg) => {
                write!(f, "Invalid input: {}", msg)
            }
            Error::Cancelled => {
                write!(f, "Cancelled")
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::IoError(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::IoError(err)
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() || err.is_body() || err.is_request() {
            Error::Transient(err.to_string())
        } else {
            Error::Http(err.to_string())
        }
    }
}

/// Convenience result type for drive-mirror operations
pub type Result<T> = std::result::Result<T, Error>;
