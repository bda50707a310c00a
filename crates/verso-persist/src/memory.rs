//! In-memory Persist backend for tests and embedding.
//!
//! [`InMemoryPersist`] keeps objects and references in `HashMap`s behind
//! `RwLock`s. The reference CAS is implemented by comparing the stored row
//! under the write lock, which gives the same atomicity a real backend
//! provides via conditional writes.

use std::collections::HashMap;
use std::sync::RwLock;

use tracing::trace;
use verso_types::{GenericObj, Obj, ObjId, ObjKind, Reference};

use crate::error::{PersistError, PersistResult};
use crate::limits::StoreLimits;
use crate::traits::Persist;

/// HashMap-backed implementation of [`Persist`].
///
/// All data is lost when the store is dropped. Objects are cloned on
/// read/write.
pub struct InMemoryPersist {
    name: String,
    limits: StoreLimits,
    objects: RwLock<HashMap<ObjId, Obj>>,
    references: RwLock<HashMap<String, Reference>>,
}

impl InMemoryPersist {
    /// Create an empty store with default limits.
    pub fn new() -> Self {
        Self::with_limits(StoreLimits::default())
    }

    /// Create an empty store with explicit limits.
    pub fn with_limits(limits: StoreLimits) -> Self {
        Self {
            name: "in-memory".to_string(),
            limits,
            objects: RwLock::new(HashMap::new()),
            references: RwLock::new(HashMap::new()),
        }
    }

    /// Number of objects currently stored.
    pub fn obj_count(&self) -> usize {
        self.objects.read().expect("lock poisoned").len()
    }

    /// Number of reference rows, including soft-deleted ones.
    pub fn ref_count(&self) -> usize {
        self.references.read().expect("lock poisoned").len()
    }

    fn encoded_size(obj: &Obj) -> PersistResult<usize> {
        bincode::serialized_size(obj)
            .map(|s| s as usize)
            .map_err(|e| PersistError::Serialization(e.to_string()))
    }

    fn check_size(&self, obj: &Obj, allow_oversize: bool) -> PersistResult<()> {
        let size = Self::encoded_size(obj)?;
        if !allow_oversize && size > self.limits.max_obj_size {
            return Err(PersistError::ObjTooLarge {
                size,
                limit: self.limits.max_obj_size,
            });
        }
        Ok(())
    }
}

impl Default for InMemoryPersist {
    fn default() -> Self {
        Self::new()
    }
}

impl Persist for InMemoryPersist {
    fn name(&self) -> &str {
        &self.name
    }

    fn limits(&self) -> StoreLimits {
        self.limits
    }

    fn fetch_obj(&self, id: &ObjId) -> PersistResult<Obj> {
        let map = self.objects.read().expect("lock poisoned");
        map.get(id)
            .cloned()
            .ok_or(PersistError::ObjNotFound(*id))
    }

    fn store_obj(&self, obj: &Obj, allow_oversize: bool) -> PersistResult<bool> {
        self.check_size(obj, allow_oversize)?;
        let id = obj.id();
        if id.is_no_ancestor() {
            return Err(PersistError::Serialization(
                "cannot store an object under the no-ancestor sentinel".into(),
            ));
        }
        let mut map = self.objects.write().expect("lock poisoned");
        if map.contains_key(&id) {
            // Idempotent: same content hash, same content.
            return Ok(false);
        }
        trace!(id = %id.short_hex(), kind = %obj.kind(), "stored object");
        map.insert(id, obj.clone());
        Ok(true)
    }

    fn delete_obj(&self, id: &ObjId) -> PersistResult<()> {
        let mut map = self.objects.write().expect("lock poisoned");
        map.remove(id);
        Ok(())
    }

    fn upsert_obj(&self, obj: &Obj) -> PersistResult<()> {
        self.check_size(obj, false)?;
        let mut map = self.objects.write().expect("lock poisoned");
        map.insert(obj.id(), obj.clone());
        Ok(())
    }

    fn update_conditional(
        &self,
        expected: &GenericObj,
        new: &GenericObj,
    ) -> PersistResult<bool> {
        if expected.id != new.id {
            return Err(PersistError::Serialization(
                "conditional update must keep the object id".into(),
            ));
        }
        self.check_size(&Obj::Generic(new.clone()), false)?;
        let mut map = self.objects.write().expect("lock poisoned");
        match map.get(&expected.id) {
            Some(Obj::Generic(stored)) if stored == expected => {
                map.insert(new.id, Obj::Generic(new.clone()));
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn scan_all_objects(
        &self,
        kinds: &[ObjKind],
    ) -> PersistResult<Box<dyn Iterator<Item = Obj> + Send>> {
        let map = self.objects.read().expect("lock poisoned");
        let filter: Vec<ObjKind> = kinds.to_vec();
        let mut objs: Vec<Obj> = map
            .values()
            .filter(|obj| filter.is_empty() || filter.contains(&obj.kind()))
            .cloned()
            .collect();
        objs.sort_by_key(|obj| obj.id());
        Ok(Box::new(objs.into_iter()))
    }

    fn fetch_reference(&self, name: &str) -> PersistResult<Option<Reference>> {
        let refs = self.references.read().expect("lock poisoned");
        Ok(refs.get(name).cloned())
    }

    fn add_reference(&self, reference: &Reference) -> PersistResult<Reference> {
        let mut refs = self.references.write().expect("lock poisoned");
        if refs.contains_key(&reference.name) {
            // Soft-deleted rows still occupy the name until purged.
            return Err(PersistError::RefAlreadyExists {
                name: reference.name.clone(),
            });
        }
        refs.insert(reference.name.clone(), reference.clone());
        Ok(reference.clone())
    }

    fn mark_reference_as_deleted(&self, expected: &Reference) -> PersistResult<Reference> {
        let mut refs = self.references.write().expect("lock poisoned");
        let stored = refs
            .get(&expected.name)
            .ok_or_else(|| PersistError::RefNotFound {
                name: expected.name.clone(),
            })?;
        if !expected.cas_matches(stored) {
            return Err(PersistError::RefConditionFailed {
                name: expected.name.clone(),
            });
        }
        let deleted = stored.as_deleted();
        refs.insert(expected.name.clone(), deleted.clone());
        Ok(deleted)
    }

    fn update_reference_pointer(
        &self,
        expected: &Reference,
        new_pointer: ObjId,
    ) -> PersistResult<Reference> {
        let mut refs = self.references.write().expect("lock poisoned");
        let stored = refs
            .get(&expected.name)
            .ok_or_else(|| PersistError::RefNotFound {
                name: expected.name.clone(),
            })?;
        if !expected.cas_matches(stored) {
            return Err(PersistError::RefConditionFailed {
                name: expected.name.clone(),
            });
        }
        let advanced = stored.advanced_to(new_pointer);
        trace!(
            name = %expected.name,
            old = %expected.pointer.short_hex(),
            new = %new_pointer.short_hex(),
            "swapped reference pointer"
        );
        refs.insert(expected.name.clone(), advanced.clone());
        Ok(advanced)
    }

    fn purge_reference(&self, expected: &Reference) -> PersistResult<()> {
        let mut refs = self.references.write().expect("lock poisoned");
        let stored = refs
            .get(&expected.name)
            .ok_or_else(|| PersistError::RefNotFound {
                name: expected.name.clone(),
            })?;
        if !expected.cas_matches(stored) {
            return Err(PersistError::RefConditionFailed {
                name: expected.name.clone(),
            });
        }
        refs.remove(&expected.name);
        Ok(())
    }

    fn list_references(&self) -> PersistResult<Vec<Reference>> {
        let refs = self.references.read().expect("lock poisoned");
        let mut rows: Vec<Reference> = refs.values().cloned().collect();
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(rows)
    }
}

impl std::fmt::Debug for InMemoryPersist {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryPersist")
            .field("objects", &self.obj_count())
            .field("references", &self.ref_count())
            .finish()
    }
}
