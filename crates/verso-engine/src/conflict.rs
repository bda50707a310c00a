//! Per-key conflict detection.
//!
//! Conflict detection is a pure read-then-compare step over the branch's
//! current key index: it never mutates. If any key in the operation set
//! yields a conflict the entire operation is rejected; partial application
//! never happens.

use std::collections::BTreeMap;

use verso_types::{CommitConflict, CommitOp, ConflictType, Payload, StoreKey};

use crate::index::KeyIndex;

/// Validate an operation set against the current key index and return
/// every conflict found.
///
/// Rules per op, using the caller-declared expectations:
/// - `Put` without an expected content id is create-only: the key must be
///   absent (`KeyExists` otherwise).
/// - `Put` with an expected content id is a guarded update: the key must
///   be present (`KeyDoesNotExist`), its kind must match the new payload's
///   kind (`PayloadDiffers`), and its identity must match the expectation
///   (`ContentIdDiffers`).
/// - `Delete` requires presence; an expected content id guards identity.
/// - `Unchanged` asserts presence and, if given, identity, without
///   mutating anything.
pub fn validate_ops(
    index: &KeyIndex,
    ops: &BTreeMap<StoreKey, CommitOp>,
) -> Vec<CommitConflict> {
    let mut conflicts = Vec::new();
    for (key, op) in ops {
        if let Some(conflict) = validate_op(index.get(key), key, op) {
            conflicts.push(conflict);
        }
    }
    conflicts
}

fn validate_op(
    existing: Option<&Payload>,
    key: &StoreKey,
    op: &CommitOp,
) -> Option<CommitConflict> {
    match op {
        CommitOp::Put {
            payload,
            expected_content_id: None,
        } => {
            // Create-only.
            let _ = payload;
            existing.map(|_| {
                CommitConflict::with_op(key.clone(), ConflictType::KeyExists, op.clone())
            })
        }
        CommitOp::Put {
            payload,
            expected_content_id: Some(expected),
        } => match existing {
            None => Some(CommitConflict::with_op(
                key.clone(),
                ConflictType::KeyDoesNotExist,
                op.clone(),
            )),
            Some(current) if current.kind != payload.kind => Some(CommitConflict::with_op(
                key.clone(),
                ConflictType::PayloadDiffers,
                op.clone(),
            )),
            Some(current) if current.content_id != *expected => Some(
                CommitConflict::with_op(key.clone(), ConflictType::ContentIdDiffers, op.clone()),
            ),
            Some(_) => None,
        },
        CommitOp::Delete {
            expected_content_id,
        }
        | CommitOp::Unchanged {
            expected_content_id,
        } => match existing {
            None => Some(CommitConflict::with_op(
                key.clone(),
                ConflictType::KeyDoesNotExist,
                op.clone(),
            )),
            Some(current) => match expected_content_id {
                Some(expected) if current.content_id != *expected => Some(
                    CommitConflict::with_op(key.clone(), ConflictType::ContentIdDiffers, op.clone()),
                ),
                _ => None,
            },
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use verso_types::{ContentId, PayloadKind};

    fn key(s: &str) -> StoreKey {
        s.parse().unwrap()
    }

    fn index_with(entries: &[(&str, Payload)]) -> KeyIndex {
        let mut index = KeyIndex::empty();
        let mut delta = BTreeMap::new();
        for (k, p) in entries {
            delta.insert(key(k), CommitOp::put_new(p.clone()));
        }
        index.apply(&delta);
        index
    }

    fn ops(entries: Vec<(&str, CommitOp)>) -> BTreeMap<StoreKey, CommitOp> {
        entries.into_iter().map(|(k, op)| (key(k), op)).collect()
    }

    fn table() -> Payload {
        Payload::new(PayloadKind::Table, json!({"schema": 1}))
    }

    #[test]
    fn create_on_empty_index_is_clean() {
        let conflicts = validate_ops(
            &KeyIndex::empty(),
            &ops(vec![("a/b", CommitOp::put_new(table()))]),
        );
        assert!(conflicts.is_empty());
    }

    #[test]
    fn create_over_existing_key_conflicts() {
        let index = index_with(&[("a/b", table())]);
        let conflicts = validate_ops(&index, &ops(vec![("a/b", CommitOp::put_new(table()))]));
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].conflict_type, ConflictType::KeyExists);
    }

    #[test]
    fn guarded_update_on_absent_key_conflicts() {
        let expected = ContentId::generate();
        let conflicts = validate_ops(
            &KeyIndex::empty(),
            &ops(vec![("a/b", CommitOp::put_on(expected, table()))]),
        );
        assert_eq!(conflicts[0].conflict_type, ConflictType::KeyDoesNotExist);
    }

    #[test]
    fn guarded_update_with_matching_identity_is_clean() {
        let current = table();
        let index = index_with(&[("a/b", current.clone())]);
        let update = Payload::with_id(current.content_id, PayloadKind::Table, json!({"schema": 2}));
        let conflicts = validate_ops(
            &index,
            &ops(vec![("a/b", CommitOp::put_on(current.content_id, update))]),
        );
        assert!(conflicts.is_empty());
    }

    #[test]
    fn recreated_entity_is_detected() {
        // The caller expected the identity of a since-dropped entity.
        let stale = ContentId::generate();
        let index = index_with(&[("a/b", table())]);
        let update = Payload::with_id(stale, PayloadKind::Table, json!({}));
        let conflicts = validate_ops(&index, &ops(vec![("a/b", CommitOp::put_on(stale, update))]));
        assert_eq!(conflicts[0].conflict_type, ConflictType::ContentIdDiffers);
    }

    #[test]
    fn kind_mismatch_is_structural() {
        let current = table();
        let index = index_with(&[("a/b", current.clone())]);
        let as_view = Payload::with_id(current.content_id, PayloadKind::View, json!({}));
        let conflicts = validate_ops(
            &index,
            &ops(vec![("a/b", CommitOp::put_on(current.content_id, as_view))]),
        );
        assert_eq!(conflicts[0].conflict_type, ConflictType::PayloadDiffers);
    }

    #[test]
    fn delete_of_absent_key_conflicts() {
        let conflicts = validate_ops(&KeyIndex::empty(), &ops(vec![("gone", CommitOp::delete())]));
        assert_eq!(conflicts[0].conflict_type, ConflictType::KeyDoesNotExist);
    }

    #[test]
    fn guarded_delete_checks_identity() {
        let current = table();
        let index = index_with(&[("a/b", current.clone())]);

        let clean = validate_ops(
            &index,
            &ops(vec![("a/b", CommitOp::delete_of(current.content_id))]),
        );
        assert!(clean.is_empty());

        let stale = validate_ops(
            &index,
            &ops(vec![("a/b", CommitOp::delete_of(ContentId::generate()))]),
        );
        assert_eq!(stale[0].conflict_type, ConflictType::ContentIdDiffers);
    }

    #[test]
    fn unchanged_asserts_presence() {
        let conflicts = validate_ops(
            &KeyIndex::empty(),
            &ops(vec![(
                "a/b",
                CommitOp::Unchanged {
                    expected_content_id: None,
                },
            )]),
        );
        assert_eq!(conflicts[0].conflict_type, ConflictType::KeyDoesNotExist);
    }

    #[test]
    fn all_conflicts_are_reported() {
        let index = index_with(&[("present", table())]);
        let conflicts = validate_ops(
            &index,
            &ops(vec![
                ("present", CommitOp::put_new(table())),
                ("absent", CommitOp::delete()),
            ]),
        );
        assert_eq!(conflicts.len(), 2);
    }
}
