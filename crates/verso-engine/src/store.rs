//! The caller-facing operation surface.
//!
//! [`VersionStore`] wires the single-attempt engines (commit, merge,
//! transplant) into the bounded retry coordinator, owns the reference
//! lifecycle, and emits one [`MutationEvent`] per successful mutation.
//! It is cheap to clone and safe to share across threads; all coordination
//! happens in the backend's reference CAS.

use std::sync::Arc;

use tracing::debug;
use verso_persist::{fetch_commit, Persist, PersistError};
use verso_types::{CommitObj, ObjId, Payload, Reference, StoreKey};

use crate::commit::{
    commit_once, ensure_hash_on_reference, live_reference, map_cas_error, CommitRequest,
    CommitResult,
};
use crate::error::{EngineResult, VersionStoreError};
use crate::events::{EventSink, MutationEvent, MutationKind, NoopSink};
use crate::history::{diff_indexes, KeyDiffEntry};
use crate::index::KeyIndex;
use crate::merge::{
    merge_once, transplant_once, KeyAction, MergeRequest, MergeResult, TransplantRequest,
};
use crate::retry::{with_retry, RetryConfig};

/// A handle to one versioned store.
#[derive(Clone)]
pub struct VersionStore {
    persist: Arc<dyn Persist>,
    retry: RetryConfig,
    sink: Arc<dyn EventSink>,
}

impl VersionStore {
    /// A store over `persist` with the default retry policy and no event
    /// sink.
    pub fn new(persist: Arc<dyn Persist>) -> Self {
        Self {
            persist,
            retry: RetryConfig::default(),
            sink: Arc::new(NoopSink),
        }
    }

    /// Replace the event sink.
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Replace the retry policy.
    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// The backend this store runs against.
    pub fn persist(&self) -> &dyn Persist {
        self.persist.as_ref()
    }

    fn emit(
        &self,
        kind: MutationKind,
        ref_name: &str,
        old_pointer: ObjId,
        new_pointer: ObjId,
        keys: Vec<StoreKey>,
    ) {
        self.sink.emit(MutationEvent {
            kind,
            ref_name: ref_name.to_string(),
            old_pointer,
            new_pointer,
            keys,
        });
    }

    // -------------------------------------------------------------------
    // Reference lifecycle
    // -------------------------------------------------------------------

    /// Create a reference at `pointer`, which must be a stored commit or
    /// the empty sentinel.
    pub fn create_reference(&self, name: &str, pointer: ObjId) -> EngineResult<Reference> {
        self.ensure_commit_exists(pointer)?;
        let created = self
            .persist
            .add_reference(&Reference::new(name, pointer))
            .map_err(|err| match err {
                PersistError::RefAlreadyExists { name } => {
                    VersionStoreError::ReferenceAlreadyExists { name }
                }
                other => other.into(),
            })?;
        self.emit(
            MutationKind::CreateReference,
            name,
            ObjId::no_ancestor(),
            pointer,
            vec![],
        );
        Ok(created)
    }

    /// The current head of a live reference.
    pub fn hash_on_reference(&self, name: &str) -> EngineResult<ObjId> {
        Ok(live_reference(self.persist(), name)?.pointer)
    }

    /// Point a live reference at `new_hash`.
    ///
    /// `expected_hash`, when given, must lie on the reference's current
    /// primary-parent chain. The new hash must be a stored commit or the
    /// empty sentinel; it need not be related to the old head.
    pub fn assign_reference(
        &self,
        name: &str,
        expected_hash: Option<ObjId>,
        new_hash: ObjId,
    ) -> EngineResult<Reference> {
        self.ensure_commit_exists(new_hash)?;
        let updated = with_retry("assign", name, &self.retry, || {
            let reference = live_reference(self.persist(), name)?;
            if let Some(expected) = expected_hash {
                ensure_hash_on_reference(self.persist(), name, reference.pointer, expected)?;
            }
            self.persist
                .update_reference_pointer(&reference, new_hash)
                .map_err(map_cas_error)
        })?;
        self.emit(
            MutationKind::AssignReference,
            name,
            updated.previous_pointer.unwrap_or_else(ObjId::no_ancestor),
            new_hash,
            vec![],
        );
        Ok(updated)
    }

    /// Delete a live reference, freeing its name for reuse.
    ///
    /// The row is soft-deleted first (winning the CAS against concurrent
    /// writers) and then purged, so a later [`Self::create_reference`]
    /// under the same name starts an independent history.
    pub fn delete_reference(
        &self,
        name: &str,
        expected_hash: Option<ObjId>,
    ) -> EngineResult<()> {
        let deleted = with_retry("delete", name, &self.retry, || {
            let reference = live_reference(self.persist(), name)?;
            if let Some(expected) = expected_hash {
                ensure_hash_on_reference(self.persist(), name, reference.pointer, expected)?;
            }
            self.persist
                .mark_reference_as_deleted(&reference)
                .map_err(map_cas_error)
        })?;
        self.persist.purge_reference(&deleted)?;
        self.emit(
            MutationKind::DeleteReference,
            name,
            deleted.pointer,
            ObjId::no_ancestor(),
            vec![],
        );
        Ok(())
    }

    /// Physically remove a soft-deleted reference row, freeing the name.
    ///
    /// [`Self::delete_reference`] already purges what it deletes; this is
    /// cleanup for rows left soft-deleted at the backend level.
    pub fn purge_reference(&self, name: &str) -> EngineResult<()> {
        let row = self
            .persist
            .fetch_reference(name)?
            .ok_or_else(|| VersionStoreError::ReferenceNotFound {
                name: name.to_string(),
            })?;
        if !row.deleted {
            // A live row must be soft-deleted first.
            return Err(VersionStoreError::ReferenceConflict {
                name: name.to_string(),
            });
        }
        self.persist.purge_reference(&row)?;
        Ok(())
    }

    /// All live references, sorted by name.
    pub fn list_references(&self) -> EngineResult<Vec<Reference>> {
        Ok(self
            .persist
            .list_references()?
            .into_iter()
            .filter(|r| !r.deleted)
            .collect())
    }

    fn ensure_commit_exists(&self, pointer: ObjId) -> EngineResult<()> {
        if pointer.is_no_ancestor() {
            return Ok(());
        }
        fetch_commit(self.persist(), &pointer).map_err(|err| match err {
            PersistError::ObjNotFound(_) => VersionStoreError::CommitNotFound(pointer),
            other => other.into(),
        })?;
        Ok(())
    }

    // -------------------------------------------------------------------
    // Mutations
    // -------------------------------------------------------------------

    /// Apply one atomic multi-key commit, retrying lost CAS races.
    pub fn commit(&self, request: CommitRequest) -> EngineResult<CommitResult> {
        let result = with_retry("commit", &request.branch, &self.retry, || {
            commit_once(self.persist(), &request)
        })?;
        self.emit(
            MutationKind::Commit,
            &request.branch,
            result.parent,
            result.new_head,
            result.affected_keys.clone(),
        );
        Ok(result)
    }

    /// Merge a source history into a branch, retrying lost CAS races.
    pub fn merge(&self, request: MergeRequest) -> EngineResult<MergeResult> {
        let result = with_retry("merge", &request.target_branch, &self.retry, || {
            merge_once(self.persist(), &request)
        })?;
        if result.was_applied {
            self.emit_applied(MutationKind::Merge, &request.target_branch, &result)?;
        }
        Ok(result)
    }

    /// Replay a commit sequence onto a branch as one squashed commit,
    /// retrying lost CAS races.
    pub fn transplant(&self, request: TransplantRequest) -> EngineResult<MergeResult> {
        let result = with_retry("transplant", &request.target_branch, &self.retry, || {
            transplant_once(self.persist(), &request)
        })?;
        if result.was_applied {
            self.emit_applied(MutationKind::Transplant, &request.target_branch, &result)?;
        }
        Ok(result)
    }

    fn emit_applied(
        &self,
        kind: MutationKind,
        branch: &str,
        result: &MergeResult,
    ) -> EngineResult<()> {
        // The pre-mutation head is the new commit's primary parent.
        let commit = fetch_commit(self.persist(), &result.effective_head)?;
        let keys = result
            .details
            .iter()
            .filter(|d| d.action == KeyAction::Apply)
            .map(|d| d.key.clone())
            .collect();
        self.emit(kind, branch, commit.primary_parent(), result.effective_head, keys);
        Ok(())
    }

    // -------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------

    /// All tracked keys on a reference, in ascending order.
    pub fn keys(&self, ref_name: &str) -> EngineResult<Vec<StoreKey>> {
        let head = self.hash_on_reference(ref_name)?;
        Ok(KeyIndex::load(self.persist(), &head)?.keys())
    }

    /// The payload at a key on a reference, if tracked.
    pub fn content(&self, ref_name: &str, key: &StoreKey) -> EngineResult<Option<Payload>> {
        let head = self.hash_on_reference(ref_name)?;
        Ok(KeyIndex::load(self.persist(), &head)?.get(key).cloned())
    }

    /// The full key index on a reference.
    pub fn index(&self, ref_name: &str) -> EngineResult<KeyIndex> {
        let head = self.hash_on_reference(ref_name)?;
        KeyIndex::load(self.persist(), &head)
    }

    /// Walk a reference's primary-parent chain newest-first, up to `limit`
    /// commits (all of them when `None`).
    pub fn commit_log(
        &self,
        ref_name: &str,
        limit: Option<usize>,
    ) -> EngineResult<Vec<CommitObj>> {
        let mut current = self.hash_on_reference(ref_name)?;
        let mut log = Vec::new();
        while !current.is_no_ancestor() {
            if limit.is_some_and(|n| log.len() >= n) {
                break;
            }
            let commit = fetch_commit(self.persist(), &current)?;
            current = commit.primary_parent();
            log.push(commit);
        }
        debug!(ref_name, commits = log.len(), "walked commit log");
        Ok(log)
    }

    /// Key-level difference between two commits (either may be the empty
    /// sentinel).
    pub fn diff(&self, from_hash: ObjId, to_hash: ObjId) -> EngineResult<Vec<KeyDiffEntry>> {
        let from = KeyIndex::load(self.persist(), &from_hash)?;
        let to = KeyIndex::load(self.persist(), &to_hash)?;
        Ok(diff_indexes(&from, &to))
    }
}
