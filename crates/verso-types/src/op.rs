use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::id::ContentId;
use crate::payload::Payload;

/// One mutation against a key, with the caller's declared expectations.
///
/// Expectations drive conflict detection (see `ConflictType`):
///
/// - `Put` with no `expected_content_id` requires the key to be absent
///   (create-only).
/// - `Put` with an `expected_content_id` requires the key to hold an entity
///   with exactly that identity (guarded update).
/// - `Delete` requires the key to be present; an `expected_content_id`
///   additionally guards against drop-and-recreate races.
/// - `Unchanged` writes nothing but asserts the key's current state, so a
///   commit can declare read dependencies.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommitOp {
    /// Create or update the entity at a key.
    Put {
        payload: Payload,
        expected_content_id: Option<ContentId>,
    },
    /// Remove the entity at a key.
    Delete {
        expected_content_id: Option<ContentId>,
    },
    /// Assert the key's state without mutating it.
    Unchanged {
        expected_content_id: Option<ContentId>,
    },
}

impl CommitOp {
    /// Create-only put: requires the key to be absent.
    pub fn put_new(payload: Payload) -> Self {
        Self::Put {
            payload,
            expected_content_id: None,
        }
    }

    /// Guarded update: requires the existing entity's identity to match.
    pub fn put_on(expected: ContentId, payload: Payload) -> Self {
        Self::Put {
            payload,
            expected_content_id: Some(expected),
        }
    }

    /// Unguarded delete: requires only that the key is present.
    pub fn delete() -> Self {
        Self::Delete {
            expected_content_id: None,
        }
    }

    /// Guarded delete.
    pub fn delete_of(expected: ContentId) -> Self {
        Self::Delete {
            expected_content_id: Some(expected),
        }
    }

    /// Returns `true` for `Put`.
    pub fn is_put(&self) -> bool {
        matches!(self, Self::Put { .. })
    }

    /// Returns `true` for `Delete`.
    pub fn is_delete(&self) -> bool {
        matches!(self, Self::Delete { .. })
    }

    /// Returns `true` for `Unchanged` (validation-only, never stored).
    pub fn is_unchanged(&self) -> bool {
        matches!(self, Self::Unchanged { .. })
    }

    /// The payload this op would leave at the key, if any.
    pub fn payload(&self) -> Option<&Payload> {
        match self {
            Self::Put { payload, .. } => Some(payload),
            _ => None,
        }
    }

    /// The caller's expected prior identity, if declared.
    pub fn expected_content_id(&self) -> Option<ContentId> {
        match self {
            Self::Put {
                expected_content_id,
                ..
            }
            | Self::Delete {
                expected_content_id,
            }
            | Self::Unchanged {
                expected_content_id,
            } => *expected_content_id,
        }
    }
}

/// Opaque commit metadata supplied by the caller and stored verbatim.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitMeta {
    /// Human-readable commit message.
    pub message: String,
    /// Author, if known.
    pub author: Option<String>,
    /// Free-form properties (sign-off, job id, ...).
    pub properties: BTreeMap<String, String>,
}

impl CommitMeta {
    /// Metadata carrying only a message.
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }
}
