//! Error taxonomy for a diagnostic run.
//!
//! Everything except [`Error::InvalidSelector`] is fatal: the run stops and the
//! process exits non-zero. An invalid selector only disqualifies the one PDB
//! that carries it.

use std::time::Duration;

/// Result alias used across the library.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Kubeconfig or context could not be resolved.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The API server could not be reached, or refused the request.
    #[error("transport error during {operation}: {reason}")]
    Transport {
        operation: &'static str,
        reason: String,
    },

    /// The pod cache did not finish its initial list before the deadline.
    #[error("pod cache did not sync within {0:?}")]
    SyncTimeout(Duration),

    /// The pod event stream failed or ended before the initial list completed.
    #[error("pod cache sync failed: {0}")]
    SyncFailed(String),

    /// The pod watch disconnected and cannot be resumed.
    #[error("pod watch stream closed: {0}")]
    StreamClosed(String),

    /// A query reached the cache before its initial sync.
    #[error("pod cache queried before initial sync completed")]
    NotSynced,

    /// The cache's background consumer was already started.
    #[error("pod cache already started")]
    AlreadyStarted,

    /// A PDB selector cannot be turned into a predicate.
    #[error("invalid selector: {0}")]
    InvalidSelector(String),

    /// The report could not be written to the output stream.
    #[error("failed to write report: {0}")]
    Output(#[from] std::io::Error),

    /// The run was cancelled before it could finish.
    #[error("run cancelled")]
    Cancelled,
}

impl Error {
    pub(crate) fn transport(operation: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Transport {
            operation,
            reason: err.to_string(),
        }
    }

    /// Whether the error ends the run. Only selector errors are recoverable.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::InvalidSelector(_))
    }
}
