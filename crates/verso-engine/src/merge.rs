//! Three-way merge and transplant (cherry-pick-squash).
//!
//! Both algorithms share a base: compute the set of keys touched on each
//! side, classify every key, resolve or report conflicts per key, and
//! produce at most one synthetic commit on the target branch. Whatever
//! subset of keys *can* be resolved is never partially committed: one
//! unresolved key rejects the whole operation.

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::debug;
use verso_persist::{fetch_commit, Persist, PersistError};
use verso_types::{
    now_micros, CommitConflict, CommitMeta, CommitObj, CommitOp, ConflictType, Obj, ObjId,
    StoreKey,
};

use crate::commit::{ensure_hash_on_reference, live_reference, map_cas_error};
use crate::conflict::validate_ops;
use crate::error::{EngineResult, VersionStoreError};
use crate::index::KeyIndex;

/// Per-key resolution behavior.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum MergeBehavior {
    /// Apply the normal three-way rule; divergence is a conflict.
    #[default]
    Normal,
    /// Always take the source side.
    Force,
    /// Always keep the target side (omit the source change).
    Drop,
}

/// What the engine decided for one key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyAction {
    /// Source change applied to the target.
    Apply,
    /// Target-only change kept as-is.
    Keep,
    /// Both sides made the identical change; nothing to do.
    AlreadyApplied,
    /// Source change omitted per `MergeBehavior::Drop`.
    Dropped,
    /// Unresolved divergence.
    Conflict,
}

/// Per-key report entry in a [`MergeResult`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyDetail {
    pub key: StoreKey,
    pub behavior: MergeBehavior,
    pub action: KeyAction,
}

/// A three-way merge request.
#[derive(Clone, Debug)]
pub struct MergeRequest {
    /// Head of the source history to merge in.
    pub from_hash: ObjId,
    /// The branch receiving the merge commit.
    pub target_branch: String,
    /// The target head the caller observed, if any. Must lie on the
    /// target's primary-parent chain.
    pub expected_head: Option<ObjId>,
    /// Behavior for keys not listed in `key_behaviors`.
    pub default_behavior: MergeBehavior,
    /// Per-key behavior overrides.
    pub key_behaviors: BTreeMap<StoreKey, MergeBehavior>,
    /// Classify only; build no commit.
    pub dry_run: bool,
    /// Report conflicts in the result instead of raising them.
    pub return_conflict_as_result: bool,
    /// Metadata for the merge commit.
    pub metadata: CommitMeta,
    /// Advisory correlation blob, round-tripped untouched.
    pub merge_session: Option<Value>,
}

impl MergeRequest {
    /// A plain merge of `from_hash` into `target_branch`.
    pub fn new(from_hash: ObjId, target_branch: impl Into<String>) -> Self {
        Self {
            from_hash,
            target_branch: target_branch.into(),
            expected_head: None,
            default_behavior: MergeBehavior::Normal,
            key_behaviors: BTreeMap::new(),
            dry_run: false,
            return_conflict_as_result: false,
            metadata: CommitMeta::default(),
            merge_session: None,
        }
    }
}

/// A transplant (cherry-pick-squash) request.
#[derive(Clone, Debug)]
pub struct TransplantRequest {
    /// Source commits to replay, oldest first.
    pub sequence: Vec<ObjId>,
    /// The branch receiving the squashed commit.
    pub target_branch: String,
    /// The target head the caller observed, if any.
    pub expected_head: Option<ObjId>,
    /// Behavior for keys not listed in `key_behaviors`.
    pub default_behavior: MergeBehavior,
    /// Per-key behavior overrides.
    pub key_behaviors: BTreeMap<StoreKey, MergeBehavior>,
    /// Classify only; build no commit.
    pub dry_run: bool,
    /// Report conflicts in the result instead of raising them.
    pub return_conflict_as_result: bool,
    /// Metadata for the squashed commit.
    pub metadata: CommitMeta,
    /// Advisory correlation blob, round-tripped untouched.
    pub merge_session: Option<Value>,
}

impl TransplantRequest {
    /// A plain transplant of `sequence` onto `target_branch`.
    pub fn new(sequence: Vec<ObjId>, target_branch: impl Into<String>) -> Self {
        Self {
            sequence,
            target_branch: target_branch.into(),
            expected_head: None,
            default_behavior: MergeBehavior::Normal,
            key_behaviors: BTreeMap::new(),
            dry_run: false,
            return_conflict_as_result: false,
            metadata: CommitMeta::default(),
            merge_session: None,
        }
    }
}

/// The outcome of a merge or transplant.
#[derive(Clone, Debug)]
pub struct MergeResult {
    /// `true` iff a commit was built and the target head advanced.
    pub was_applied: bool,
    /// Whether this was a dry run.
    pub dry_run: bool,
    /// The merge-base (for merges) or the target head the sequence was
    /// applied on (for transplants).
    pub base: ObjId,
    /// The target head after the operation: the new commit when applied,
    /// otherwise the unchanged head.
    pub effective_head: ObjId,
    /// Per-key classification report.
    pub details: Vec<KeyDetail>,
    /// Unresolved conflicts. Non-empty implies `was_applied == false`.
    pub conflicts: Vec<CommitConflict>,
    /// The request's advisory blob, returned unchanged.
    pub merge_session: Option<Value>,
}

// ---------------------------------------------------------------------------
// Merge-base
// ---------------------------------------------------------------------------

/// Find the nearest common ancestor of two commits by walking both
/// primary-parent chains synchronously.
///
/// Both chains are advanced in lockstep, each tracking its own visited
/// set; the first hash seen on both walks is the base. Two histories
/// whose only shared "ancestor" is the no-ancestor sentinel are unrelated,
/// which is fatal rather than a conflict.
pub(crate) fn merge_base(persist: &dyn Persist, a: ObjId, b: ObjId) -> EngineResult<ObjId> {
    use std::collections::HashSet;

    let unrelated = |id: ObjId| {
        if id.is_no_ancestor() {
            Err(VersionStoreError::NoCommonAncestor { a, b })
        } else {
            Ok(id)
        }
    };

    if a == b {
        return unrelated(a);
    }

    let mut visited_a: HashSet<ObjId> = HashSet::from([a]);
    let mut visited_b: HashSet<ObjId> = HashSet::from([b]);
    let mut frontier_a = Some(a);
    let mut frontier_b = Some(b);

    while frontier_a.is_some() || frontier_b.is_some() {
        if let Some(current) = frontier_a.take() {
            if let Some(parent) = primary_parent_of(persist, current)? {
                if visited_b.contains(&parent) {
                    return unrelated(parent);
                }
                visited_a.insert(parent);
                frontier_a = Some(parent);
            }
        }
        if let Some(current) = frontier_b.take() {
            if let Some(parent) = primary_parent_of(persist, current)? {
                if visited_a.contains(&parent) {
                    return unrelated(parent);
                }
                visited_b.insert(parent);
                frontier_b = Some(parent);
            }
        }
    }

    Err(VersionStoreError::NoCommonAncestor { a, b })
}

/// The primary parent of `id`, or `None` once the walk leaves the graph.
/// The sentinel is passed through as a legitimate "node" exactly once so
/// it can be recognized as the shared root of unrelated histories.
fn primary_parent_of(persist: &dyn Persist, id: ObjId) -> EngineResult<Option<ObjId>> {
    if id.is_no_ancestor() {
        return Ok(None);
    }
    let commit = fetch_commit(persist, &id).map_err(not_found_to_commit(id))?;
    Ok(Some(commit.primary_parent()))
}

fn not_found_to_commit(id: ObjId) -> impl Fn(PersistError) -> VersionStoreError {
    move |err| match err {
        PersistError::ObjNotFound(_) => VersionStoreError::CommitNotFound(id),
        other => other.into(),
    }
}

/// Collect the cumulative delta of the primary-parent chain from `head`
/// (inclusive) back to `base` (exclusive), later commits overriding
/// earlier ones per key.
fn delta_since(
    persist: &dyn Persist,
    head: ObjId,
    base: ObjId,
) -> EngineResult<BTreeMap<StoreKey, CommitOp>> {
    let mut chain = Vec::new();
    let mut current = head;
    while current != base {
        if current.is_no_ancestor() {
            // The base must lie on the primary-parent chain.
            return Err(VersionStoreError::CommitNotFound(base));
        }
        let commit = fetch_commit(persist, &current).map_err(not_found_to_commit(current))?;
        current = commit.primary_parent();
        chain.push(commit);
    }

    let mut delta = BTreeMap::new();
    // Oldest first, so later commits override earlier ones.
    for commit in chain.into_iter().rev() {
        for (key, op) in commit.delta {
            delta.insert(key, op);
        }
    }
    Ok(delta)
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

struct Classified {
    apply: BTreeMap<StoreKey, CommitOp>,
    details: Vec<KeyDetail>,
    conflicts: Vec<CommitConflict>,
}

fn behavior_for(
    key: &StoreKey,
    overrides: &BTreeMap<StoreKey, MergeBehavior>,
    default: MergeBehavior,
) -> MergeBehavior {
    overrides.get(key).copied().unwrap_or(default)
}

/// Returns `true` if two ops have the same effect on a key (expectations
/// are not part of the effect).
fn same_effect(a: &CommitOp, b: &CommitOp) -> bool {
    match (a, b) {
        (CommitOp::Put { payload: pa, .. }, CommitOp::Put { payload: pb, .. }) => pa == pb,
        (CommitOp::Delete { .. }, CommitOp::Delete { .. }) => true,
        (CommitOp::Unchanged { .. }, CommitOp::Unchanged { .. }) => true,
        _ => false,
    }
}

/// The three-way rule, applied per key over both sides' deltas since the
/// merge-base.
fn classify(
    source: &BTreeMap<StoreKey, CommitOp>,
    target: &BTreeMap<StoreKey, CommitOp>,
    overrides: &BTreeMap<StoreKey, MergeBehavior>,
    default: MergeBehavior,
) -> Classified {
    let mut apply = BTreeMap::new();
    let mut details = Vec::new();
    let mut conflicts = Vec::new();

    let mut keys: Vec<&StoreKey> = source.keys().chain(target.keys()).collect();
    keys.sort();
    keys.dedup();

    for key in keys {
        let behavior = behavior_for(key, overrides, default);
        let action = match (source.get(key), target.get(key)) {
            (Some(op), None) => {
                if behavior == MergeBehavior::Drop {
                    KeyAction::Dropped
                } else {
                    apply.insert(key.clone(), op.clone());
                    KeyAction::Apply
                }
            }
            (None, Some(_)) => KeyAction::Keep,
            (Some(src), Some(tgt)) => {
                if same_effect(src, tgt) {
                    KeyAction::AlreadyApplied
                } else {
                    match behavior {
                        MergeBehavior::Normal => {
                            conflicts.push(
                                CommitConflict::with_op(
                                    key.clone(),
                                    ConflictType::ValueDiffers,
                                    src.clone(),
                                )
                                .against(tgt.clone()),
                            );
                            KeyAction::Conflict
                        }
                        MergeBehavior::Force => {
                            apply.insert(key.clone(), src.clone());
                            KeyAction::Apply
                        }
                        MergeBehavior::Drop => KeyAction::Dropped,
                    }
                }
            }
            (None, None) => unreachable!("key came from one of the two maps"),
        };
        details.push(KeyDetail {
            key: key.clone(),
            behavior,
            action,
        });
    }

    Classified {
        apply,
        details,
        conflicts,
    }
}

// ---------------------------------------------------------------------------
// Merge
// ---------------------------------------------------------------------------

/// One merge attempt.
pub(crate) fn merge_once(
    persist: &dyn Persist,
    request: &MergeRequest,
) -> EngineResult<MergeResult> {
    let reference = live_reference(persist, &request.target_branch)?;
    let head = reference.pointer;
    if let Some(expected) = request.expected_head {
        ensure_hash_on_reference(persist, &request.target_branch, head, expected)?;
    }
    // The source hash must exist before any walk.
    fetch_commit(persist, &request.from_hash)
        .map_err(not_found_to_commit(request.from_hash))?;

    let base = merge_base(persist, head, request.from_hash)?;
    let source_delta = delta_since(persist, request.from_hash, base)?;
    let target_delta = delta_since(persist, head, base)?;

    let classified = classify(
        &source_delta,
        &target_delta,
        &request.key_behaviors,
        request.default_behavior,
    );
    debug!(
        target = %request.target_branch,
        from = %request.from_hash.short_hex(),
        base = %base.short_hex(),
        keys = classified.details.len(),
        conflicts = classified.conflicts.len(),
        "classified merge"
    );

    let unresolved = !classified.conflicts.is_empty();
    if unresolved && !request.return_conflict_as_result {
        return Err(VersionStoreError::Conflict(classified.conflicts));
    }
    if unresolved || request.dry_run || classified.apply.is_empty() {
        return Ok(MergeResult {
            was_applied: false,
            dry_run: request.dry_run,
            base,
            effective_head: head,
            details: classified.details,
            conflicts: classified.conflicts,
            merge_session: request.merge_session.clone(),
        });
    }

    let new_head = apply_to_target(
        persist,
        &reference,
        vec![head, request.from_hash],
        &classified.apply,
        &request.metadata,
    )?;
    Ok(MergeResult {
        was_applied: true,
        dry_run: false,
        base,
        effective_head: new_head,
        details: classified.details,
        conflicts: Vec::new(),
        merge_session: request.merge_session.clone(),
    })
}

// ---------------------------------------------------------------------------
// Transplant
// ---------------------------------------------------------------------------

/// Squash an ordered sequence of per-commit deltas into one cumulative
/// delta: the effect comes from the last op per key, the expectation from
/// the first. A key created and deleted within the sequence nets out to
/// nothing.
fn squash_sequence(
    persist: &dyn Persist,
    sequence: &[ObjId],
) -> EngineResult<BTreeMap<StoreKey, CommitOp>> {
    let mut squashed: BTreeMap<StoreKey, CommitOp> = BTreeMap::new();
    for hash in sequence {
        let commit = fetch_commit(persist, hash).map_err(not_found_to_commit(*hash))?;
        for (key, op) in commit.delta {
            if op.is_unchanged() {
                continue;
            }
            match squashed.remove(&key) {
                None => {
                    squashed.insert(key, op);
                }
                Some(first) => {
                    let first_expectation = first.expected_content_id();
                    let created_here = first.is_put() && first_expectation.is_none();
                    match op {
                        CommitOp::Put { payload, .. } => {
                            squashed.insert(
                                key,
                                CommitOp::Put {
                                    payload,
                                    expected_content_id: first_expectation,
                                },
                            );
                        }
                        CommitOp::Delete { .. } if created_here => {
                            // Created and deleted within the sequence.
                        }
                        CommitOp::Delete { .. } => {
                            squashed.insert(
                                key,
                                CommitOp::Delete {
                                    expected_content_id: first_expectation,
                                },
                            );
                        }
                        CommitOp::Unchanged { .. } => unreachable!("filtered above"),
                    }
                }
            }
        }
    }
    Ok(squashed)
}

/// One transplant attempt.
pub(crate) fn transplant_once(
    persist: &dyn Persist,
    request: &TransplantRequest,
) -> EngineResult<MergeResult> {
    let reference = live_reference(persist, &request.target_branch)?;
    let head = reference.pointer;
    if let Some(expected) = request.expected_head {
        ensure_hash_on_reference(persist, &request.target_branch, head, expected)?;
    }

    let squashed = squash_sequence(persist, &request.sequence)?;
    let index = KeyIndex::load(persist, &head)?;

    // Validate the cumulative delta against the target's current index,
    // honoring per-key behaviors: Force skips validation, Drop omits the
    // key entirely.
    let mut apply = BTreeMap::new();
    let mut details = Vec::new();
    let mut conflicts = Vec::new();
    for (key, op) in &squashed {
        let behavior = behavior_for(key, &request.key_behaviors, request.default_behavior);
        let action = match behavior {
            MergeBehavior::Drop => KeyAction::Dropped,
            MergeBehavior::Force => {
                apply.insert(key.clone(), op.clone());
                KeyAction::Apply
            }
            MergeBehavior::Normal => {
                let single = BTreeMap::from([(key.clone(), op.clone())]);
                let mut found = validate_ops(&index, &single);
                if found.is_empty() {
                    apply.insert(key.clone(), op.clone());
                    KeyAction::Apply
                } else {
                    conflicts.append(&mut found);
                    KeyAction::Conflict
                }
            }
        };
        details.push(KeyDetail {
            key: key.clone(),
            behavior,
            action,
        });
    }
    debug!(
        target = %request.target_branch,
        commits = request.sequence.len(),
        keys = details.len(),
        conflicts = conflicts.len(),
        "classified transplant"
    );

    let unresolved = !conflicts.is_empty();
    if unresolved && !request.return_conflict_as_result {
        return Err(VersionStoreError::Conflict(conflicts));
    }
    if unresolved || request.dry_run || apply.is_empty() {
        return Ok(MergeResult {
            was_applied: false,
            dry_run: request.dry_run,
            base: head,
            effective_head: head,
            details,
            conflicts,
            merge_session: request.merge_session.clone(),
        });
    }

    // One squashed commit with a single parent: the target head.
    let new_head = apply_to_target(persist, &reference, vec![head], &apply, &request.metadata)?;
    Ok(MergeResult {
        was_applied: true,
        dry_run: false,
        base: head,
        effective_head: new_head,
        details,
        conflicts: Vec::new(),
        merge_session: request.merge_session.clone(),
    })
}

// ---------------------------------------------------------------------------
// Shared tail: build the synthetic commit and swap the pointer
// ---------------------------------------------------------------------------

fn apply_to_target(
    persist: &dyn Persist,
    reference: &verso_types::Reference,
    parents: Vec<ObjId>,
    delta: &BTreeMap<StoreKey, CommitOp>,
    metadata: &CommitMeta,
) -> EngineResult<ObjId> {
    let mut index = KeyIndex::load(persist, &reference.pointer)?;
    index.apply(delta);
    let segments = index.write_segments(persist)?;
    let commit = CommitObj::build(
        parents,
        delta.clone(),
        segments,
        metadata.clone(),
        now_micros(),
    )?;
    persist.store_obj(&Obj::Commit(commit.clone()), false)?;
    persist
        .update_reference_pointer(reference, commit.id)
        .map_err(map_cas_error)?;
    Ok(commit.id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use verso_persist::InMemoryPersist;
    use verso_types::{Payload, PayloadKind, Reference};

    use crate::commit::{commit_once, CommitRequest};

    fn key(s: &str) -> StoreKey {
        s.parse().unwrap()
    }

    fn table(v: u64) -> Payload {
        Payload::new(PayloadKind::Table, json!({ "v": v }))
    }

    fn branch(persist: &InMemoryPersist, name: &str, pointer: ObjId) {
        persist.add_reference(&Reference::new(name, pointer)).unwrap();
    }

    fn commit(persist: &InMemoryPersist, branch: &str, ops: Vec<(&str, CommitOp)>) -> ObjId {
        commit_once(
            persist,
            &CommitRequest {
                branch: branch.into(),
                expected_head: None,
                metadata: CommitMeta::message("test"),
                ops: ops.into_iter().map(|(k, op)| (key(k), op)).collect(),
            },
        )
        .unwrap()
        .new_head
    }

    /// main with one seed commit, plus a side branch forked from it.
    fn forked(persist: &InMemoryPersist) -> ObjId {
        branch(persist, "main", ObjId::no_ancestor());
        let seed = commit(
            persist,
            "main",
            vec![("shared", CommitOp::put_new(table(0)))],
        );
        branch(persist, "side", seed);
        seed
    }

    // -----------------------------------------------------------------------
    // Merge-base
    // -----------------------------------------------------------------------

    #[test]
    fn base_of_diverged_branches_is_the_fork_point() {
        let persist = InMemoryPersist::new();
        let seed = forked(&persist);
        let main_head = commit(&persist, "main", vec![("m", CommitOp::put_new(table(1)))]);
        let side_head = commit(&persist, "side", vec![("s", CommitOp::put_new(table(2)))]);

        let base = merge_base(&persist, main_head, side_head).unwrap();
        assert_eq!(base, seed);
    }

    #[test]
    fn base_handles_unequal_chain_lengths() {
        let persist = InMemoryPersist::new();
        let seed = forked(&persist);
        let mut main_head = seed;
        for i in 0..5 {
            main_head = commit(
                &persist,
                "main",
                vec![("m", CommitOp::put_new(table(i)))],
            );
        }
        let side_head = commit(&persist, "side", vec![("s", CommitOp::put_new(table(9)))]);
        assert_eq!(merge_base(&persist, main_head, side_head).unwrap(), seed);
        assert_eq!(merge_base(&persist, side_head, main_head).unwrap(), seed);
    }

    #[test]
    fn ancestor_is_its_own_base() {
        let persist = InMemoryPersist::new();
        let seed = forked(&persist);
        let head = commit(&persist, "main", vec![("m", CommitOp::put_new(table(1)))]);
        assert_eq!(merge_base(&persist, head, seed).unwrap(), seed);
        assert_eq!(merge_base(&persist, seed, head).unwrap(), seed);
    }

    #[test]
    fn unrelated_histories_are_fatal() {
        let persist = InMemoryPersist::new();
        branch(&persist, "a", ObjId::no_ancestor());
        branch(&persist, "b", ObjId::no_ancestor());
        let ha = commit(&persist, "a", vec![("x", CommitOp::put_new(table(1)))]);
        let hb = commit(&persist, "b", vec![("y", CommitOp::put_new(table(2)))]);

        let err = merge_base(&persist, ha, hb).unwrap_err();
        assert!(matches!(err, VersionStoreError::NoCommonAncestor { .. }));
    }

    // -----------------------------------------------------------------------
    // Merge
    // -----------------------------------------------------------------------

    #[test]
    fn clean_merge_applies_source_changes() {
        let persist = InMemoryPersist::new();
        forked(&persist);
        let main_head = commit(&persist, "main", vec![("m", CommitOp::put_new(table(1)))]);
        let side_head = commit(&persist, "side", vec![("s", CommitOp::put_new(table(2)))]);

        let result = merge_once(&persist, &MergeRequest::new(side_head, "main")).unwrap();
        assert!(result.was_applied);

        let merged = fetch_commit(&persist, &result.effective_head).unwrap();
        assert_eq!(merged.parents, vec![main_head, side_head]);

        let index = KeyIndex::load(&persist, &result.effective_head).unwrap();
        assert!(index.contains(&key("m")));
        assert!(index.contains(&key("s")));
        assert!(index.contains(&key("shared")));
    }

    #[test]
    fn divergent_key_conflicts_without_override() {
        let persist = InMemoryPersist::new();
        forked(&persist);
        commit(&persist, "main", vec![("k", CommitOp::put_new(table(1)))]);
        let side_head = commit(&persist, "side", vec![("k", CommitOp::put_new(table(2)))]);
        let head_before = live_reference(&persist, "main").unwrap().pointer;

        let err = merge_once(&persist, &MergeRequest::new(side_head, "main")).unwrap_err();
        match err {
            VersionStoreError::Conflict(conflicts) => {
                assert_eq!(conflicts.len(), 1);
                assert_eq!(conflicts[0].conflict_type, ConflictType::ValueDiffers);
                assert_eq!(conflicts[0].key, key("k"));
            }
            other => panic!("expected Conflict, got {other}"),
        }
        // No commit was applied.
        assert_eq!(
            live_reference(&persist, "main").unwrap().pointer,
            head_before
        );
    }

    #[test]
    fn force_default_takes_the_source_value() {
        let persist = InMemoryPersist::new();
        forked(&persist);
        commit(&persist, "main", vec![("k", CommitOp::put_new(table(1)))]);
        let winning = table(2);
        let side_head = commit(
            &persist,
            "side",
            vec![("k", CommitOp::put_new(winning.clone()))],
        );

        let mut request = MergeRequest::new(side_head, "main");
        request.default_behavior = MergeBehavior::Force;
        let result = merge_once(&persist, &request).unwrap();
        assert!(result.was_applied);

        let index = KeyIndex::load(&persist, &result.effective_head).unwrap();
        assert_eq!(index.get(&key("k")), Some(&winning));
    }

    #[test]
    fn per_key_drop_keeps_the_target_value() {
        let persist = InMemoryPersist::new();
        forked(&persist);
        let keep = table(1);
        commit(
            &persist,
            "main",
            vec![
                ("k", CommitOp::put_new(keep.clone())),
                ("m", CommitOp::put_new(table(5))),
            ],
        );
        let side_head = commit(
            &persist,
            "side",
            vec![
                ("k", CommitOp::put_new(table(2))),
                ("s", CommitOp::put_new(table(6))),
            ],
        );

        let mut request = MergeRequest::new(side_head, "main");
        request
            .key_behaviors
            .insert(key("k"), MergeBehavior::Drop);
        let result = merge_once(&persist, &request).unwrap();
        assert!(result.was_applied);

        let index = KeyIndex::load(&persist, &result.effective_head).unwrap();
        assert_eq!(index.get(&key("k")), Some(&keep));
        assert!(index.contains(&key("s")));

        let detail = result.details.iter().find(|d| d.key == key("k")).unwrap();
        assert_eq!(detail.action, KeyAction::Dropped);
    }

    #[test]
    fn identical_changes_on_both_sides_are_no_ops() {
        let persist = InMemoryPersist::new();
        forked(&persist);
        let same = table(7);
        commit(
            &persist,
            "main",
            vec![("k", CommitOp::put_new(same.clone()))],
        );
        let side_head = commit(&persist, "side", vec![("k", CommitOp::put_new(same))]);

        let result = merge_once(&persist, &MergeRequest::new(side_head, "main")).unwrap();
        // The only touched key was already applied, so nothing to commit.
        assert!(!result.was_applied);
        assert_eq!(result.details[0].action, KeyAction::AlreadyApplied);
        assert!(result.conflicts.is_empty());
    }

    #[test]
    fn dry_run_reports_without_committing() {
        let persist = InMemoryPersist::new();
        forked(&persist);
        let side_head = commit(&persist, "side", vec![("s", CommitOp::put_new(table(2)))]);
        let head_before = live_reference(&persist, "main").unwrap().pointer;

        let mut request = MergeRequest::new(side_head, "main");
        request.dry_run = true;
        let result = merge_once(&persist, &request).unwrap();
        assert!(!result.was_applied);
        assert!(result.dry_run);
        assert_eq!(result.details[0].action, KeyAction::Apply);
        assert_eq!(
            live_reference(&persist, "main").unwrap().pointer,
            head_before
        );
    }

    #[test]
    fn conflict_as_result_reports_instead_of_raising() {
        let persist = InMemoryPersist::new();
        forked(&persist);
        commit(&persist, "main", vec![("k", CommitOp::put_new(table(1)))]);
        let side_head = commit(&persist, "side", vec![("k", CommitOp::put_new(table(2)))]);

        let mut request = MergeRequest::new(side_head, "main");
        request.return_conflict_as_result = true;
        request.merge_session = Some(json!({"attempt": 1}));
        let result = merge_once(&persist, &request).unwrap();
        assert!(!result.was_applied);
        assert_eq!(result.conflicts.len(), 1);
        // The advisory blob is round-tripped untouched.
        assert_eq!(result.merge_session, Some(json!({"attempt": 1})));

        // Resubmission with an explicit override resolves the key.
        let mut resubmit = MergeRequest::new(side_head, "main");
        resubmit
            .key_behaviors
            .insert(key("k"), MergeBehavior::Force);
        resubmit.merge_session = Some(json!({"attempt": 2}));
        let resolved = merge_once(&persist, &resubmit).unwrap();
        assert!(resolved.was_applied);
    }

    #[test]
    fn merge_of_unknown_source_hash_fails() {
        let persist = InMemoryPersist::new();
        forked(&persist);
        let err = merge_once(
            &persist,
            &MergeRequest::new(ObjId::hash_bytes(b"nowhere"), "main"),
        )
        .unwrap_err();
        assert!(matches!(err, VersionStoreError::CommitNotFound(_)));
    }

    #[test]
    fn spec_scenario_put_update_then_side_merge() {
        let persist = InMemoryPersist::new();
        branch(&persist, "main", ObjId::no_ancestor());

        // commit Put(a/b, v1) -> H1
        let v1 = table(1);
        let v1_id = v1.content_id;
        let h1 = commit(&persist, "main", vec![("a/b", CommitOp::put_new(v1))]);

        // side branch forks at H1 and only adds key c
        branch(&persist, "side", h1);
        let side_head = commit(&persist, "side", vec![("c", CommitOp::put_new(table(3)))]);

        // commit Put(a/b, v2, expected=v1) -> H2, single parent H1
        let v2 = Payload::with_id(v1_id, PayloadKind::Table, json!({ "v": 2 }));
        let h2 = commit(
            &persist,
            "main",
            vec![("a/b", CommitOp::put_on(v1_id, v2.clone()))],
        );
        assert_eq!(
            fetch_commit(&persist, &h2).unwrap().parents,
            vec![h1]
        );

        // merge side into main@H2
        let result = merge_once(&persist, &MergeRequest::new(side_head, "main")).unwrap();
        assert!(result.was_applied);
        let h3 = fetch_commit(&persist, &result.effective_head).unwrap();
        assert_eq!(h3.parents, vec![h2, side_head]);

        let index = KeyIndex::load(&persist, &result.effective_head).unwrap();
        assert_eq!(index.get(&key("a/b")), Some(&v2));
        assert!(index.contains(&key("c")));
    }

    // -----------------------------------------------------------------------
    // Transplant
    // -----------------------------------------------------------------------

    #[test]
    fn transplant_squashes_to_one_commit_with_last_value() {
        let persist = InMemoryPersist::new();
        forked(&persist);

        // Three commits on side, each modifying the same key.
        let p1 = table(1);
        let pid = p1.content_id;
        let c1 = commit(&persist, "side", vec![("k", CommitOp::put_new(p1))]);
        let p2 = Payload::with_id(pid, PayloadKind::Table, json!({ "v": 2 }));
        let c2 = commit(&persist, "side", vec![("k", CommitOp::put_on(pid, p2))]);
        let p3 = Payload::with_id(pid, PayloadKind::Table, json!({ "v": 3 }));
        let c3 = commit(
            &persist,
            "side",
            vec![("k", CommitOp::put_on(pid, p3.clone()))],
        );

        let main_head = live_reference(&persist, "main").unwrap().pointer;
        let result = transplant_once(
            &persist,
            &TransplantRequest::new(vec![c1, c2, c3], "main"),
        )
        .unwrap();
        assert!(result.was_applied);

        // Exactly one new commit, single parent, last value wins.
        let squashed = fetch_commit(&persist, &result.effective_head).unwrap();
        assert_eq!(squashed.parents, vec![main_head]);
        let index = KeyIndex::load(&persist, &result.effective_head).unwrap();
        assert_eq!(index.get(&key("k")), Some(&p3));
    }

    #[test]
    fn transplant_create_then_delete_nets_out() {
        let persist = InMemoryPersist::new();
        forked(&persist);
        let temp = table(1);
        let temp_id = temp.content_id;
        let c1 = commit(&persist, "side", vec![("tmp", CommitOp::put_new(temp))]);
        let c2 = commit(
            &persist,
            "side",
            vec![("tmp", CommitOp::delete_of(temp_id))],
        );

        let result =
            transplant_once(&persist, &TransplantRequest::new(vec![c1, c2], "main")).unwrap();
        // The key was created and deleted within the sequence: nothing to
        // apply, no conflict against a target that never had it.
        assert!(!result.was_applied);
        assert!(result.conflicts.is_empty());
    }

    #[test]
    fn transplant_detects_target_conflicts() {
        let persist = InMemoryPersist::new();
        forked(&persist);
        let c1 = commit(&persist, "side", vec![("k", CommitOp::put_new(table(1)))]);
        // Target creates the same key independently.
        commit(&persist, "main", vec![("k", CommitOp::put_new(table(9)))]);

        let err =
            transplant_once(&persist, &TransplantRequest::new(vec![c1], "main")).unwrap_err();
        match err {
            VersionStoreError::Conflict(conflicts) => {
                assert_eq!(conflicts[0].conflict_type, ConflictType::KeyExists);
            }
            other => panic!("expected Conflict, got {other}"),
        }

        // Force override replays it anyway.
        let mut request = TransplantRequest::new(vec![c1], "main");
        request.default_behavior = MergeBehavior::Force;
        assert!(transplant_once(&persist, &request).unwrap().was_applied);
    }

    #[test]
    fn transplant_of_unknown_hash_fails() {
        let persist = InMemoryPersist::new();
        forked(&persist);
        let err = transplant_once(
            &persist,
            &TransplantRequest::new(vec![ObjId::hash_bytes(b"ghost")], "main"),
        )
        .unwrap_err();
        assert!(matches!(err, VersionStoreError::CommitNotFound(_)));
    }

    #[test]
    fn transplant_dry_run_leaves_target_untouched() {
        let persist = InMemoryPersist::new();
        forked(&persist);
        let c1 = commit(&persist, "side", vec![("k", CommitOp::put_new(table(1)))]);
        let head_before = live_reference(&persist, "main").unwrap().pointer;

        let mut request = TransplantRequest::new(vec![c1], "main");
        request.dry_run = true;
        let result = transplant_once(&persist, &request).unwrap();
        assert!(!result.was_applied);
        assert_eq!(
            live_reference(&persist, "main").unwrap().pointer,
            head_before
        );
    }
}
