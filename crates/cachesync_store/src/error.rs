//! Error types for store operations.

use cachesync_model::{EntityKind, StorageId};
use std::io;
use thiserror::Error;

/// Result type for store operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur while reading or writing the local store.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Snapshot encoding or decoding failed.
    #[error("codec error: {0}")]
    Codec(String),

    /// The snapshot file is corrupted.
    #[error("store corrupted: {0}")]
    Corrupted(String),

    /// Another process holds the store lock.
    #[error("store locked: another process has exclusive access")]
    Locked,

    /// An operation referenced a record that does not exist.
    #[error("operation {op}: record {id} not found")]
    RecordNotFound {
        /// Index of the failing operation in its batch.
        op: usize,
        /// The missing record.
        id: StorageId,
    },

    /// A nested insert referenced an owner that does not exist.
    #[error("operation {op}: owner {owner} not found")]
    OwnerNotFound {
        /// Index of the failing operation in its batch.
        op: usize,
        /// The missing owner.
        owner: StorageId,
    },

    /// A back-reference does not point at an earlier insert.
    #[error("operation {op}: back-reference to {target} is not an earlier insert")]
    InvalidBackReference {
        /// Index of the failing operation in its batch.
        op: usize,
        /// The referenced index.
        target: usize,
    },

    /// An insert would duplicate an entity id within its kind.
    #[error("operation {op}: entity {id} already cached as {kind}")]
    DuplicateEntity {
        /// Index of the failing operation in its batch.
        op: usize,
        /// Kind of the entity.
        kind: EntityKind,
        /// The duplicated entity id.
        id: String,
    },

    /// An operation is malformed.
    #[error("operation {op}: {message}")]
    InvalidOperation {
        /// Index of the failing operation in its batch.
        op: usize,
        /// Description of the problem.
        message: String,
    },
}

impl StorageError {
    /// Creates an invalid operation error.
    pub fn invalid_operation(op: usize, message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            op,
            message: message.into(),
        }
    }

    /// Creates a codec error.
    pub fn codec(err: impl std::fmt::Display) -> Self {
        Self::Codec(err.to_string())
    }
}
