use thiserror::Error;
use verso_types::{ObjId, ObjKind};

/// Errors from persistence operations.
#[derive(Debug, Error)]
pub enum PersistError {
    /// The requested object does not exist (data-integrity fault when the
    /// id came from a parent edge).
    #[error("object not found: {0}")]
    ObjNotFound(ObjId),

    /// An object of a different kind is stored under this id.
    #[error("object {id} is a {actual}, expected {expected}")]
    ObjMismatch {
        id: ObjId,
        expected: ObjKind,
        actual: ObjKind,
    },

    /// The encoded object exceeds the backend's hard size limit.
    #[error("object too large: {size} bytes exceeds limit of {limit}")]
    ObjTooLarge { size: usize, limit: usize },

    /// The named reference does not exist.
    #[error("reference not found: {name}")]
    RefNotFound { name: String },

    /// A reference with this name already exists (possibly soft-deleted).
    #[error("reference already exists: {name}")]
    RefAlreadyExists { name: String },

    /// The stored reference row no longer matches the expected state
    /// (compare-and-swap lost a race). Recoverable by refetch + recompute.
    #[error("reference condition failed: {name}")]
    RefConditionFailed { name: String },

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Backend-specific failure (connection loss, quota, ...).
    #[error("backend error: {0}")]
    Backend(String),
}

/// Result alias for persistence operations.
pub type PersistResult<T> = Result<T, PersistError>;
