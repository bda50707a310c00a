use std::fmt;

use serde::{Deserialize, Serialize};

use crate::key::StoreKey;
use crate::op::CommitOp;

/// Why an operation against a single key could not be applied.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConflictType {
    /// The key is present but the operation requires absence (create-only).
    KeyExists,
    /// The key is absent but the operation requires presence.
    KeyDoesNotExist,
    /// Structural payload kind mismatch between expected and existing.
    PayloadDiffers,
    /// The existing entity's stable identity differs from what the caller
    /// expected (the entity was dropped and recreated under the same key).
    ContentIdDiffers,
    /// Same identity, but the value diverged since the caller's base.
    ValueDiffers,
}

impl fmt::Display for ConflictType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::KeyExists => write!(f, "key exists"),
            Self::KeyDoesNotExist => write!(f, "key does not exist"),
            Self::PayloadDiffers => write!(f, "payload differs"),
            Self::ContentIdDiffers => write!(f, "content id differs"),
            Self::ValueDiffers => write!(f, "value differs"),
        }
    }
}

/// A per-key conflict report.
///
/// Produced by conflict detection, never persisted. If any key in an
/// operation set conflicts, the whole operation is rejected; callers that
/// opted into conflict-as-result receive these without an error being
/// raised.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitConflict {
    /// The conflicting key.
    pub key: StoreKey,
    /// Conflict classification.
    pub conflict_type: ConflictType,
    /// The operation that was attempted, if relevant.
    pub op: Option<CommitOp>,
    /// The competing state on the other side, if relevant.
    pub existing: Option<CommitOp>,
    /// Target key of a pending rename, if the conflict involves one.
    pub rename_to: Option<StoreKey>,
}

impl CommitConflict {
    /// A conflict with no competing op recorded.
    pub fn of(key: StoreKey, conflict_type: ConflictType) -> Self {
        Self {
            key,
            conflict_type,
            op: None,
            existing: None,
            rename_to: None,
        }
    }

    /// A conflict recording the attempted op.
    pub fn with_op(key: StoreKey, conflict_type: ConflictType, op: CommitOp) -> Self {
        Self {
            key,
            conflict_type,
            op: Some(op),
            existing: None,
            rename_to: None,
        }
    }

    /// Record the competing state on the other side.
    pub fn against(mut self, existing: CommitOp) -> Self {
        self.existing = Some(existing);
        self
    }
}

impl fmt::Display for CommitConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.key, self.conflict_type)
    }
}
