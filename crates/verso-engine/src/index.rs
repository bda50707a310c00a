//! Materialized key index and size-bounded segmentation.
//!
//! A commit's full key index (every tracked key and its committed payload)
//! is persisted as a sequence of [`IndexSegmentObj`]s, chunked so each
//! segment's encoded size stays under the backend's segment target.
//! Segments are content-addressed, so index regions untouched by a commit
//! are shared with its parent for free.

use std::collections::BTreeMap;

use tracing::trace;
use verso_persist::{fetch_commit, fetch_index_segment, Persist, PersistResult};
use verso_types::{CommitOp, IndexEntry, IndexSegmentObj, Obj, ObjId, Payload, StoreKey};

use crate::error::{EngineResult, VersionStoreError};

/// The key index as of one commit: every tracked key mapped to its
/// committed payload, in key order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct KeyIndex {
    entries: BTreeMap<StoreKey, Payload>,
}

impl KeyIndex {
    /// An empty index (the state of an empty branch).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load the full index as of `head`.
    ///
    /// The no-ancestor sentinel loads as the empty index. Missing segment
    /// objects are a data-integrity fault and propagate as `ObjNotFound`.
    pub fn load(persist: &dyn Persist, head: &ObjId) -> EngineResult<Self> {
        if head.is_no_ancestor() {
            return Ok(Self::empty());
        }
        let commit = fetch_commit(persist, head)?;
        let mut entries = BTreeMap::new();
        for segment_id in &commit.index_segments {
            let segment = fetch_index_segment(persist, segment_id)?;
            for entry in segment.entries {
                entries.insert(entry.key, entry.payload);
            }
        }
        Ok(Self { entries })
    }

    /// Look up the payload at a key.
    pub fn get(&self, key: &StoreKey) -> Option<&Payload> {
        self.entries.get(key)
    }

    /// Returns `true` if the key is tracked.
    pub fn contains(&self, key: &StoreKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Number of tracked keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no key is tracked.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate entries in ascending key order.
    pub fn iter(&self) -> impl Iterator<Item = (&StoreKey, &Payload)> {
        self.entries.iter()
    }

    /// All tracked keys in ascending order.
    pub fn keys(&self) -> Vec<StoreKey> {
        self.entries.keys().cloned().collect()
    }

    /// Layer a delta over this index. `Unchanged` ops are assertions and
    /// leave the index untouched.
    pub fn apply(&mut self, delta: &BTreeMap<StoreKey, CommitOp>) {
        for (key, op) in delta {
            match op {
                CommitOp::Put { payload, .. } => {
                    self.entries.insert(key.clone(), payload.clone());
                }
                CommitOp::Delete { .. } => {
                    self.entries.remove(key);
                }
                CommitOp::Unchanged { .. } => {}
            }
        }
    }

    /// Persist this index as size-bounded segments and return their ids
    /// in key order.
    ///
    /// Chunking is greedy over the ordered entries: a segment is cut when
    /// adding the next entry would push its encoded size past the
    /// backend's segment target. An empty index produces no segments.
    pub fn write_segments(&self, persist: &dyn Persist) -> EngineResult<Vec<ObjId>> {
        let target = persist.limits().index_segment_size as u64;
        let mut segment_ids = Vec::new();
        let mut pending: Vec<IndexEntry> = Vec::new();
        let mut pending_size: u64 = 0;

        for (key, payload) in &self.entries {
            let entry = IndexEntry {
                key: key.clone(),
                payload: payload.clone(),
            };
            let entry_size = encoded_size(&entry)?;
            if !pending.is_empty() && pending_size + entry_size > target {
                segment_ids.push(store_segment(persist, std::mem::take(&mut pending))?);
                pending_size = 0;
            }
            pending_size += entry_size;
            pending.push(entry);
        }
        if !pending.is_empty() {
            segment_ids.push(store_segment(persist, pending)?);
        }

        trace!(
            keys = self.entries.len(),
            segments = segment_ids.len(),
            "wrote key index"
        );
        Ok(segment_ids)
    }
}

fn encoded_size(entry: &IndexEntry) -> EngineResult<u64> {
    bincode::serialized_size(entry)
        .map_err(|e| VersionStoreError::Serialization(e.to_string()))
}

fn store_segment(persist: &dyn Persist, entries: Vec<IndexEntry>) -> EngineResult<ObjId> {
    let segment = IndexSegmentObj::build(entries)?;
    let id = segment.id;
    store_idempotent(persist, &Obj::IndexSegment(segment))?;
    Ok(id)
}

fn store_idempotent(persist: &dyn Persist, obj: &Obj) -> PersistResult<()> {
    // `false` means the object already existed, which is fine.
    persist.store_obj(obj, false).map(|_| ())
}
