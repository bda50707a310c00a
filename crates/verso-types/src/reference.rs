use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::id::ObjId;
use crate::time::now_micros;

/// A named mutable pointer into the commit DAG.
///
/// References are created once, mutated many times via compare-and-swap on
/// the pointer, and soft-deleted before physical removal. The CAS identity
/// of a reference row is (`pointer`, `deleted`, `created_at`,
/// `extended_info`); `previous_pointer` is bookkeeping written by the swap
/// itself and is not part of the comparison.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    /// Unique reference name (e.g. "main", "release/v2").
    pub name: String,
    /// Current pointer. Names a reachable commit, or the
    /// [`ObjId::no_ancestor`] sentinel for an empty branch.
    pub pointer: ObjId,
    /// The pointer before the most recent swap, if any.
    pub previous_pointer: Option<ObjId>,
    /// Soft-delete flag. Deleted rows are invisible to normal reads but
    /// still occupy the name until purged.
    pub deleted: bool,
    /// Creation timestamp, microseconds since the UNIX epoch.
    pub created_at: u64,
    /// Opaque per-reference blob, round-tripped untouched.
    pub extended_info: Option<Value>,
}

impl Reference {
    /// Create a live reference at the given pointer.
    pub fn new(name: impl Into<String>, pointer: ObjId) -> Self {
        Self {
            name: name.into(),
            pointer,
            previous_pointer: None,
            deleted: false,
            created_at: now_micros(),
            extended_info: None,
        }
    }

    /// Attach an extended-info blob.
    pub fn with_extended_info(mut self, info: Value) -> Self {
        self.extended_info = Some(info);
        self
    }

    /// Returns `true` if the stored row `other` matches this row's CAS
    /// identity. Compared fields: pointer, deleted, created_at,
    /// extended_info.
    pub fn cas_matches(&self, other: &Reference) -> bool {
        self.pointer == other.pointer
            && self.deleted == other.deleted
            && self.created_at == other.created_at
            && self.extended_info == other.extended_info
    }

    /// The row that results from swapping the pointer to `new_pointer`.
    pub fn advanced_to(&self, new_pointer: ObjId) -> Reference {
        Reference {
            previous_pointer: Some(self.pointer),
            pointer: new_pointer,
            ..self.clone()
        }
    }

    /// The row that results from soft deletion.
    pub fn as_deleted(&self) -> Reference {
        Reference {
            deleted: true,
            ..self.clone()
        }
    }
}
