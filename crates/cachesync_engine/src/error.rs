//! Error types for the sync engine.

use cachesync_model::{EntityKind, ModelError};
use cachesync_remote::RemoteError;
use cachesync_store::StorageError;
use std::fmt;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The remote source could not be reached.
    #[error("network error: {0}")]
    Network(String),

    /// The remote source rejected a call.
    #[error("remote returned {status}: {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Response body or reason phrase.
        message: String,
    },

    /// The local store rejected a batch or could not be read.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Remote data could not be reconciled with the local cache.
    #[error("reconciliation error: {0}")]
    Reconciliation(String),

    /// The round was cancelled.
    #[error("sync cancelled")]
    Cancelled,

    /// A round touching this kind is already running or queued.
    #[error("a round for {kind} is already in flight")]
    RoundInFlight {
        /// The contended kind.
        kind: EntityKind,
    },

    /// The worker queue is full.
    #[error("sync queue is full ({capacity} rounds)")]
    QueueFull {
        /// Configured queue capacity.
        capacity: usize,
    },

    /// A round was requested for a kind the engine does not track.
    #[error("kind {kind} is not tracked")]
    UnknownKind {
        /// The requested kind.
        kind: EntityKind,
    },

    /// The worker thread has shut down.
    #[error("sync worker stopped")]
    WorkerStopped,

    /// Invalid state transition.
    #[error("invalid state transition from {from} to {to}")]
    InvalidStateTransition {
        /// Current state.
        from: String,
        /// Attempted target state.
        to: String,
    },
}

/// Coarse classification of a [`SyncError`] for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Network or remote API failure.
    Remote,
    /// Local store failure.
    Storage,
    /// Inconsistent remote data.
    Reconciliation,
    /// Cancellation.
    Cancelled,
    /// Scheduling conflict or worker failure.
    Scheduling,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ErrorKind::Remote => "remote",
            ErrorKind::Storage => "storage",
            ErrorKind::Reconciliation => "reconciliation",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Scheduling => "scheduling",
        })
    }
}

impl SyncError {
    /// Creates a reconciliation error.
    pub fn reconciliation(message: impl Into<String>) -> Self {
        Self::Reconciliation(message.into())
    }

    /// Classifies the error for reporting.
    pub fn phase_kind(&self) -> ErrorKind {
        match self {
            SyncError::Network(_) | SyncError::Api { .. } => ErrorKind::Remote,
            SyncError::Storage(_) => ErrorKind::Storage,
            SyncError::Reconciliation(_) => ErrorKind::Reconciliation,
            SyncError::Cancelled => ErrorKind::Cancelled,
            SyncError::RoundInFlight { .. }
            | SyncError::QueueFull { .. }
            | SyncError::UnknownKind { .. }
            | SyncError::WorkerStopped
            | SyncError::InvalidStateTransition { .. } => ErrorKind::Scheduling,
        }
    }
}

impl From<RemoteError> for SyncError {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::Network(message) => SyncError::Network(message),
            RemoteError::Api { status, message } => SyncError::Api { status, message },
            RemoteError::Malformed(message) => SyncError::Reconciliation(message),
        }
    }
}

impl From<ModelError> for SyncError {
    fn from(err: ModelError) -> Self {
        SyncError::Reconciliation(err.to_string())
    }
}
