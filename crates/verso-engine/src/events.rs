//! Mutation event sink.
//!
//! After every successful commit, merge, transplant, or reference
//! mutation the engine emits one event describing the change. Delivery
//! semantics are the sink's business; the engine calls `emit` once,
//! synchronously, after the CAS has succeeded.
//!
//! Events track pointer mutations only. Purging an already soft-deleted
//! reference row (whose deletion event was emitted when it was deleted)
//! and dry runs emit nothing.

use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use verso_types::{ObjId, StoreKey};

/// Kind of reference mutation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MutationKind {
    Commit,
    Merge,
    Transplant,
    CreateReference,
    AssignReference,
    DeleteReference,
}

/// One successful mutation of a reference.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationEvent {
    /// What happened.
    pub kind: MutationKind,
    /// The mutated reference.
    pub ref_name: String,
    /// Pointer before the mutation.
    pub old_pointer: ObjId,
    /// Pointer after the mutation.
    pub new_pointer: ObjId,
    /// Keys added or changed, in key order. Empty for pure reference
    /// mutations.
    pub keys: Vec<StoreKey>,
}

/// Pluggable receiver for mutation events.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: MutationEvent);
}

/// Discards every event. The default sink.
#[derive(Debug, Default)]
pub struct NoopSink;

impl EventSink for NoopSink {
    fn emit(&self, _event: MutationEvent) {}
}

/// Records every event in memory, for tests.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<MutationEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything emitted so far.
    pub fn events(&self) -> Vec<MutationEvent> {
        self.events.lock().expect("lock poisoned").clone()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: MutationEvent) {
        self.events.lock().expect("lock poisoned").push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_sink_keeps_order() {
        let sink = RecordingSink::new();
        for i in 0..3u8 {
            sink.emit(MutationEvent {
                kind: MutationKind::Commit,
                ref_name: "main".into(),
                old_pointer: ObjId::no_ancestor(),
                new_pointer: ObjId::hash_bytes(&[i]),
                keys: vec![],
            });
        }
        let events = sink.events();
        assert_eq!(events.len(), 3);
        assert_eq!(events[2].new_pointer, ObjId::hash_bytes(&[2]));
    }

    #[test]
    fn noop_sink_accepts_events() {
        NoopSink.emit(MutationEvent {
            kind: MutationKind::DeleteReference,
            ref_name: "gone".into(),
            old_pointer: ObjId::no_ancestor(),
            new_pointer: ObjId::no_ancestor(),
            keys: vec![],
        });
    }
}
