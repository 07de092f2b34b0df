//! Errors that abort a run

use thiserror::Error;

/// Result type for running a run-list
pub type Result<T> = std::result::Result<T, RunError>;

/// Why a run stopped before the end of the run-list
#[derive(Debug, Error)]
pub enum RunError {
    /// A guard predicate could not be evaluated
    #[error("{resource}: guard failed: {source:#}")]
    Guard {
        resource: String,
        #[source]
        source: anyhow::Error,
    },

    /// Apply failed on a resource that does not ignore failures
    #[error("{resource}: {source:#}")]
    Apply {
        resource: String,
        #[source]
        source: anyhow::Error,
    },

    /// The prefetch for a resource failed
    #[error("{resource}: download failed: {message}")]
    DownloadFailed { resource: String, message: String },

    /// The download pool could not be started
    #[error("could not start downloads: {0}")]
    Prefetch(#[from] prefetch::Error),
}

impl RunError {
    /// Id of the resource that stopped the run, if one did
    pub fn resource(&self) -> Option<&str> {
        match self {
            Self::Guard { resource, .. }
            | Self::Apply { resource, .. }
            | Self::DownloadFailed { resource, .. } => Some(resource),
            Self::Prefetch(_) => None,
        }
    }
}
