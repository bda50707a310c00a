use verso_types::{CommitObj, GenericObj, IndexSegmentObj, Obj, ObjId, ObjKind, Reference};

use crate::error::{PersistError, PersistResult};
use crate::limits::StoreLimits;

/// The storage contract Verso runs against.
///
/// One trait, two halves: a content-addressed object store and a
/// CAS-mutated reference store. Implementations must satisfy:
///
/// - Objects are immutable once written; storing the same content twice is
///   idempotent and yields the same id.
/// - The reference pointer is the sole unit of coordinated mutation. All
///   pointer swaps compare the full CAS identity of the stored row
///   (pointer, deleted, created_at, extended_info) before replacing it.
/// - Concurrent reads are always safe and never block writers.
/// - All I/O errors are propagated, never silently ignored.
pub trait Persist: Send + Sync {
    /// Backend name, for diagnostics.
    fn name(&self) -> &str;

    /// Backend-declared size limits.
    fn limits(&self) -> StoreLimits;

    // -------------------------------------------------------------------
    // Object store contract
    // -------------------------------------------------------------------

    /// Fetch an object by id. Fails with [`PersistError::ObjNotFound`] if
    /// absent.
    fn fetch_obj(&self, id: &ObjId) -> PersistResult<Obj>;

    /// Fetch many objects; the element is `None` per absent id.
    ///
    /// Default implementation calls `fetch_obj` per id. Backends may
    /// override for fewer round-trips.
    fn fetch_objs(&self, ids: &[ObjId]) -> PersistResult<Vec<Option<Obj>>> {
        ids.iter()
            .map(|id| match self.fetch_obj(id) {
                Ok(obj) => Ok(Some(obj)),
                Err(PersistError::ObjNotFound(_)) => Ok(None),
                Err(e) => Err(e),
            })
            .collect()
    }

    /// Fetch many objects of an expected kind; the element is `None` per
    /// absent id or kind mismatch.
    fn fetch_objs_of_kind(
        &self,
        ids: &[ObjId],
        kind: ObjKind,
    ) -> PersistResult<Vec<Option<Obj>>> {
        Ok(self
            .fetch_objs(ids)?
            .into_iter()
            .map(|maybe| maybe.filter(|obj| obj.kind() == kind))
            .collect())
    }

    /// Store an object. Returns `false` if an object with the same id
    /// already exists; that is the idempotent success case, not an error.
    ///
    /// Fails with [`PersistError::ObjTooLarge`] if the encoded object
    /// exceeds the hard limit, unless `allow_oversize` is set.
    fn store_obj(&self, obj: &Obj, allow_oversize: bool) -> PersistResult<bool>;

    /// Delete an object by id. Best-effort: absent ids are not an error.
    fn delete_obj(&self, id: &ObjId) -> PersistResult<()>;

    /// Store or replace an object with a stable id and mutable payload.
    /// Subject to the same size limit as `store_obj`.
    fn upsert_obj(&self, obj: &Obj) -> PersistResult<()>;

    /// Conditionally replace a payload-mutable object.
    ///
    /// Succeeds (returns `true`) only if the stored object equals
    /// `expected`, including its version token. Used outside the hot
    /// commit path (e.g. the repository-description singleton).
    fn update_conditional(
        &self,
        expected: &GenericObj,
        new: &GenericObj,
    ) -> PersistResult<bool>;

    /// Lazily iterate over all stored objects, optionally filtered by
    /// kind. Intended for maintenance (migration, erasure), not for
    /// commit-time reads. Pass an empty filter for every kind.
    fn scan_all_objects(
        &self,
        kinds: &[ObjKind],
    ) -> PersistResult<Box<dyn Iterator<Item = Obj> + Send>>;

    // -------------------------------------------------------------------
    // Reference store contract
    // -------------------------------------------------------------------

    /// Fetch a reference row by name, including soft-deleted rows.
    /// Returns `Ok(None)` if the name is unknown.
    fn fetch_reference(&self, name: &str) -> PersistResult<Option<Reference>>;

    /// Fetch many references; the element is `None` per absent name.
    fn fetch_references(&self, names: &[&str]) -> PersistResult<Vec<Option<Reference>>> {
        names.iter().map(|n| self.fetch_reference(n)).collect()
    }

    /// Create a reference. Fails with [`PersistError::RefAlreadyExists`]
    /// if the name is taken, including by a soft-deleted row that has not
    /// been purged.
    fn add_reference(&self, reference: &Reference) -> PersistResult<Reference>;

    /// Soft-delete a reference. The stored row must match `expected`'s CAS
    /// identity; otherwise fails with [`PersistError::RefConditionFailed`].
    fn mark_reference_as_deleted(&self, expected: &Reference) -> PersistResult<Reference>;

    /// The CAS primitive: atomically swap the pointer to `new_pointer`
    /// (pushing the old pointer into `previous_pointer`) iff the stored
    /// row matches `expected`'s CAS identity. Fails with
    /// [`PersistError::RefConditionFailed`] otherwise; the caller must
    /// refetch and recompute.
    fn update_reference_pointer(
        &self,
        expected: &Reference,
        new_pointer: ObjId,
    ) -> PersistResult<Reference>;

    /// Physically remove a soft-deleted row, same CAS discipline.
    fn purge_reference(&self, expected: &Reference) -> PersistResult<()>;

    /// List all reference rows, sorted by name. Includes soft-deleted
    /// rows; callers filter as needed.
    fn list_references(&self) -> PersistResult<Vec<Reference>>;
}

/// Fetch an object expected to be a commit.
pub fn fetch_commit(persist: &dyn Persist, id: &ObjId) -> PersistResult<CommitObj> {
    let obj = persist.fetch_obj(id)?;
    match obj {
        Obj::Commit(commit) => Ok(commit),
        other => Err(PersistError::ObjMismatch {
            id: *id,
            expected: ObjKind::Commit,
            actual: other.kind(),
        }),
    }
}

/// Fetch an object expected to be an index segment.
pub fn fetch_index_segment(
    persist: &dyn Persist,
    id: &ObjId,
) -> PersistResult<IndexSegmentObj> {
    let obj = persist.fetch_obj(id)?;
    match obj {
        Obj::IndexSegment(segment) => Ok(segment),
        other => Err(PersistError::ObjMismatch {
            id: *id,
            expected: ObjKind::IndexSegment,
            actual: other.kind(),
        }),
    }
}
