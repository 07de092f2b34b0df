//! Error types for download operations.
//!
//! Every failure a transfer can hit is recorded on its task as a message and
//! surfaced to callers through [`Error`]. Nothing in this crate retries on its
//! own; the only restart is the non-ranged re-download when a server ignores
//! a `Range` header.

use std::io;
use std::path::PathBuf;

/// Result type alias for download operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while fetching a remote artifact.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The transport could not complete the request.
    #[error("HTTP request failed: {message}")]
    Http {
        /// Error message.
        message: String,
        /// HTTP status code if available.
        status: Option<u16>,
    },

    /// The server answered with a status that is neither success nor 304.
    #[error("unexpected HTTP status {status} for {url}")]
    BadStatus {
        /// Requested URL.
        url: String,
        /// Status code returned by the server.
        status: u16,
    },

    /// The downloaded bytes do not hash to the expected digest.
    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// Digest the caller asked for.
        expected: String,
        /// Digest of the bytes that arrived.
        actual: String,
    },

    /// IO error while staging the artifact.
    #[error("IO error at {path}: {source}")]
    Io {
        /// Path involved in the error.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },

    /// The manager was cancelled before the task started.
    #[error("download cancelled")]
    Cancelled,
}

impl Error {
    /// Create an IO error with path context.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create an HTTP error.
    pub fn http(message: impl Into<String>, status: Option<u16>) -> Self {
        Self::Http {
            message: message.into(),
            status,
        }
    }

    /// HTTP status attached to this error, if any.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => *status,
            Self::BadStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<ureq::Error> for Error {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::StatusCode(code) => Self::Http {
                message: format!("HTTP {code}"),
                status: Some(code),
            },
            other => Self::Http {
                message: other.to_string(),
                status: None,
            },
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Self::Io {
            path: PathBuf::new(),
            source: err,
        }
    }
}
