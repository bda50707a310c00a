//! The commit engine: one atomic multi-key commit against a branch.
//!
//! A single attempt runs `LOAD_HEAD → VALIDATE_OPS → BUILD_COMMIT_OBJ →
//! CAS_UPDATE_REF`. A lost CAS means the head advanced under us; the
//! attempt is recomputed from scratch by the retry coordinator. Nothing is
//! visible to other readers until the CAS succeeds.

use std::collections::BTreeMap;

use tracing::debug;
use verso_persist::{fetch_commit, Persist, PersistError};
use verso_types::{now_micros, CommitMeta, CommitObj, CommitOp, Obj, ObjId, Reference, StoreKey};

use crate::conflict::validate_ops;
use crate::error::{EngineResult, VersionStoreError};
use crate::index::KeyIndex;

/// A commit request against one branch.
#[derive(Clone, Debug)]
pub struct CommitRequest {
    /// The branch to commit on.
    pub branch: String,
    /// The head the caller's expectations were formed against, if any.
    /// Must lie on the branch's primary-parent chain.
    pub expected_head: Option<ObjId>,
    /// Opaque commit metadata.
    pub metadata: CommitMeta,
    /// The operation set, one op per key.
    pub ops: BTreeMap<StoreKey, CommitOp>,
}

/// The outcome of a successful commit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommitResult {
    /// The new branch head.
    pub new_head: ObjId,
    /// The head the commit was applied on (its primary parent).
    pub parent: ObjId,
    /// Keys actually added or changed, in key order. `Unchanged`
    /// assertions are not included.
    pub affected_keys: Vec<StoreKey>,
}

/// Resolve a live (not soft-deleted) reference.
pub(crate) fn live_reference(persist: &dyn Persist, name: &str) -> EngineResult<Reference> {
    match persist.fetch_reference(name)? {
        Some(reference) if !reference.deleted => Ok(reference),
        _ => Err(VersionStoreError::ReferenceNotFound {
            name: name.to_string(),
        }),
    }
}

/// Verify that `hash` lies on the primary-parent chain starting at `head`.
pub(crate) fn ensure_hash_on_reference(
    persist: &dyn Persist,
    name: &str,
    head: ObjId,
    hash: ObjId,
) -> EngineResult<()> {
    let mut current = head;
    loop {
        if current == hash {
            return Ok(());
        }
        if current.is_no_ancestor() {
            return Err(VersionStoreError::ReferenceNotFound {
                name: format!("{name}@{}", hash.short_hex()),
            });
        }
        current = fetch_commit(persist, &current)?.primary_parent();
    }
}

/// Map a failed reference CAS into the retryable engine error.
pub(crate) fn map_cas_error(err: PersistError) -> VersionStoreError {
    match err {
        PersistError::RefConditionFailed { name } => {
            VersionStoreError::ReferenceConflict { name }
        }
        other => other.into(),
    }
}

/// One commit attempt. Returns the result and the pre-CAS head so the
/// caller can emit an event.
pub(crate) fn commit_once(
    persist: &dyn Persist,
    request: &CommitRequest,
) -> EngineResult<CommitResult> {
    // LOAD_HEAD
    let reference = live_reference(persist, &request.branch)?;
    let head = reference.pointer;
    if let Some(expected) = request.expected_head {
        ensure_hash_on_reference(persist, &request.branch, head, expected)?;
    }
    let index = KeyIndex::load(persist, &head)?;

    // VALIDATE_OPS
    let conflicts = validate_ops(&index, &request.ops);
    if !conflicts.is_empty() {
        return Err(VersionStoreError::Conflict(conflicts));
    }

    // BUILD_COMMIT_OBJ
    let stored_delta: BTreeMap<StoreKey, CommitOp> = request
        .ops
        .iter()
        .filter(|(_, op)| !op.is_unchanged())
        .map(|(k, op)| (k.clone(), op.clone()))
        .collect();
    let mut new_index = index;
    new_index.apply(&stored_delta);
    let segments = new_index.write_segments(persist)?;
    let affected_keys: Vec<StoreKey> = stored_delta.keys().cloned().collect();
    let commit = CommitObj::build(
        vec![head],
        stored_delta,
        segments,
        request.metadata.clone(),
        now_micros(),
    )?;
    persist.store_obj(&Obj::Commit(commit.clone()), false)?;

    // CAS_UPDATE_REF
    persist
        .update_reference_pointer(&reference, commit.id)
        .map_err(map_cas_error)?;

    debug!(
        branch = %request.branch,
        head = %commit.id.short_hex(),
        keys = affected_keys.len(),
        "committed"
    );
    Ok(CommitResult {
        new_head: commit.id,
        parent: head,
        affected_keys,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use verso_persist::InMemoryPersist;
    use verso_types::{ConflictType, Payload, PayloadKind};

    fn key(s: &str) -> StoreKey {
        s.parse().unwrap()
    }

    fn table(v: u64) -> Payload {
        Payload::new(PayloadKind::Table, json!({ "v": v }))
    }

    fn request(branch: &str, ops: Vec<(&str, CommitOp)>) -> CommitRequest {
        CommitRequest {
            branch: branch.into(),
            expected_head: None,
            metadata: CommitMeta::message("test"),
            ops: ops.into_iter().map(|(k, op)| (key(k), op)).collect(),
        }
    }

    fn new_branch(persist: &InMemoryPersist, name: &str) -> Reference {
        let r = Reference::new(name, ObjId::no_ancestor());
        persist.add_reference(&r).unwrap()
    }

    #[test]
    fn commit_on_empty_branch() {
        let persist = InMemoryPersist::new();
        new_branch(&persist, "main");

        let result = commit_once(
            &persist,
            &request("main", vec![("a/b", CommitOp::put_new(table(1)))]),
        )
        .unwrap();

        assert_eq!(result.parent, ObjId::no_ancestor());
        assert_eq!(result.affected_keys, vec![key("a/b")]);

        let stored = persist.fetch_reference("main").unwrap().unwrap();
        assert_eq!(stored.pointer, result.new_head);

        let commit = fetch_commit(&persist, &result.new_head).unwrap();
        assert!(commit.is_root());
        assert_eq!(commit.delta.len(), 1);
    }

    #[test]
    fn commit_chains_parents() {
        let persist = InMemoryPersist::new();
        new_branch(&persist, "main");

        let first = commit_once(
            &persist,
            &request("main", vec![("a", CommitOp::put_new(table(1)))]),
        )
        .unwrap();
        let second = commit_once(
            &persist,
            &request("main", vec![("b", CommitOp::put_new(table(2)))]),
        )
        .unwrap();

        assert_eq!(second.parent, first.new_head);
        let commit = fetch_commit(&persist, &second.new_head).unwrap();
        assert_eq!(commit.primary_parent(), first.new_head);

        // The second commit's index carries both keys.
        let index = KeyIndex::load(&persist, &second.new_head).unwrap();
        assert!(index.contains(&key("a")));
        assert!(index.contains(&key("b")));
    }

    #[test]
    fn conflicting_ops_reject_everything() {
        let persist = InMemoryPersist::new();
        new_branch(&persist, "main");
        commit_once(
            &persist,
            &request("main", vec![("taken", CommitOp::put_new(table(1)))]),
        )
        .unwrap();
        let head_before = persist.fetch_reference("main").unwrap().unwrap().pointer;

        // One clean op, one conflicting op: nothing applies.
        let err = commit_once(
            &persist,
            &request(
                "main",
                vec![
                    ("clean", CommitOp::put_new(table(2))),
                    ("taken", CommitOp::put_new(table(3))),
                ],
            ),
        )
        .unwrap_err();
        match err {
            VersionStoreError::Conflict(conflicts) => {
                assert_eq!(conflicts.len(), 1);
                assert_eq!(conflicts[0].conflict_type, ConflictType::KeyExists);
            }
            other => panic!("expected Conflict, got {other}"),
        }
        let head_after = persist.fetch_reference("main").unwrap().unwrap().pointer;
        assert_eq!(head_before, head_after);
    }

    #[test]
    fn guarded_update_by_content_id() {
        let persist = InMemoryPersist::new();
        new_branch(&persist, "main");
        let v1 = table(1);
        let id = v1.content_id;
        commit_once(&persist, &request("main", vec![("a/b", CommitOp::put_new(v1))])).unwrap();

        let v2 = Payload::with_id(id, PayloadKind::Table, json!({ "v": 2 }));
        let result = commit_once(
            &persist,
            &request("main", vec![("a/b", CommitOp::put_on(id, v2.clone()))]),
        )
        .unwrap();

        let index = KeyIndex::load(&persist, &result.new_head).unwrap();
        assert_eq!(index.get(&key("a/b")), Some(&v2));
    }

    #[test]
    fn unchanged_ops_are_validated_but_not_stored() {
        let persist = InMemoryPersist::new();
        new_branch(&persist, "main");
        let guard = table(1);
        let guard_id = guard.content_id;
        commit_once(
            &persist,
            &request("main", vec![("guarded", CommitOp::put_new(guard))]),
        )
        .unwrap();

        let result = commit_once(
            &persist,
            &request(
                "main",
                vec![
                    ("new", CommitOp::put_new(table(2))),
                    (
                        "guarded",
                        CommitOp::Unchanged {
                            expected_content_id: Some(guard_id),
                        },
                    ),
                ],
            ),
        )
        .unwrap();

        assert_eq!(result.affected_keys, vec![key("new")]);
        let commit = fetch_commit(&persist, &result.new_head).unwrap();
        assert!(!commit.delta.contains_key(&key("guarded")));
    }

    #[test]
    fn commit_on_missing_branch_fails() {
        let persist = InMemoryPersist::new();
        let err = commit_once(
            &persist,
            &request("ghost", vec![("a", CommitOp::put_new(table(1)))]),
        )
        .unwrap_err();
        assert!(matches!(err, VersionStoreError::ReferenceNotFound { .. }));
    }

    #[test]
    fn commit_on_deleted_branch_fails() {
        let persist = InMemoryPersist::new();
        let r = new_branch(&persist, "doomed");
        persist.mark_reference_as_deleted(&r).unwrap();

        let err = commit_once(
            &persist,
            &request("doomed", vec![("a", CommitOp::put_new(table(1)))]),
        )
        .unwrap_err();
        assert!(matches!(err, VersionStoreError::ReferenceNotFound { .. }));
    }

    #[test]
    fn expected_head_must_be_on_the_branch() {
        let persist = InMemoryPersist::new();
        new_branch(&persist, "main");
        let first = commit_once(
            &persist,
            &request("main", vec![("a", CommitOp::put_new(table(1)))]),
        )
        .unwrap();

        // The real head is fine, and so is an ancestor.
        let mut ok = request("main", vec![("b", CommitOp::put_new(table(2)))]);
        ok.expected_head = Some(first.new_head);
        commit_once(&persist, &ok).unwrap();

        // A hash from nowhere is not.
        let mut bad = request("main", vec![("c", CommitOp::put_new(table(3)))]);
        bad.expected_head = Some(ObjId::hash_bytes(b"elsewhere"));
        let err = commit_once(&persist, &bad).unwrap_err();
        assert!(matches!(err, VersionStoreError::ReferenceNotFound { .. }));
    }

    #[test]
    fn stale_reference_row_surfaces_as_reference_conflict() {
        let persist = InMemoryPersist::new();
        let stale_row = new_branch(&persist, "main");
        commit_once(
            &persist,
            &request("main", vec![("a", CommitOp::put_new(table(1)))]),
        )
        .unwrap();

        // Simulate a racing writer that still holds the original row.
        let err = persist
            .update_reference_pointer(&stale_row, ObjId::hash_bytes(b"x"))
            .map_err(map_cas_error)
            .unwrap_err();
        assert!(matches!(err, VersionStoreError::ReferenceConflict { .. }));
    }
}
