use thiserror::Error;
use verso_persist::PersistError;
use verso_types::{CommitConflict, ObjId};

/// Errors surfaced by the version store.
///
/// `ReferenceConflict` is the optimistic-lock loss: it is recovered
/// locally by the retry coordinator and only escapes as `RetryExhausted`
/// once the attempt ceiling is hit. Everything else propagates
/// immediately with no partial mutation.
#[derive(Debug, Error)]
pub enum VersionStoreError {
    /// Named reference (or required ancestor hash) absent. Never retried.
    #[error("reference not found: {name}")]
    ReferenceNotFound { name: String },

    /// Create collided with an existing, possibly soft-deleted, name.
    #[error("reference already exists: {name}")]
    ReferenceAlreadyExists { name: String },

    /// CAS lost the race. Recovered by the retry coordinator.
    #[error("reference {name} changed concurrently")]
    ReferenceConflict { name: String },

    /// The retry ceiling was exceeded; distinct from a data conflict.
    #[error("{operation} on {name} gave up after {attempts} attempts")]
    RetryExhausted {
        operation: &'static str,
        name: String,
        attempts: u32,
    },

    /// Per-key data conflicts; the operation applied nothing.
    #[error("{} conflicting key(s), first: {}", .0.len(), .0.first().map(|c| c.to_string()).unwrap_or_default())]
    Conflict(Vec<CommitConflict>),

    /// A commit hash named by the caller does not exist.
    #[error("commit not found: {0}")]
    CommitNotFound(ObjId),

    /// The two histories share no common ancestor.
    #[error("no common ancestor between {a} and {b}")]
    NoCommonAncestor { a: ObjId, b: ObjId },

    /// Data-integrity fault or backend failure. Fatal, not retried.
    #[error(transparent)]
    Storage(#[from] PersistError),

    /// Serialization failure while building objects.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<verso_types::TypeError> for VersionStoreError {
    fn from(e: verso_types::TypeError) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// Result alias for engine operations.
pub type EngineResult<T> = Result<T, VersionStoreError>;
