//! The repository-description singleton.
//!
//! Every store carries exactly one repository description, stored as a
//! payload-mutable [`GenericObj`] under a well-known id. It lives outside
//! the commit DAG: reads and writes go through upsert and conditional
//! update, never through the commit path.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use serde::{Deserialize, Serialize};
use tracing::debug;
use verso_persist::{Persist, PersistError};
use verso_types::{ContentId, GenericObj, Obj, ObjId, Reference};

use crate::error::{EngineResult, VersionStoreError};

/// Well-known id of the repository-description singleton.
pub static REPOSITORY_OBJ_ID: LazyLock<ObjId> =
    LazyLock::new(|| ObjId::hash_bytes(b"verso:repository"));

const REPOSITORY_TAG: &str = "repository";

/// Attempt ceiling for the description's conditional-update loop.
const UPDATE_ATTEMPTS: u32 = 5;

/// The repository description.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryInfo {
    /// Name of the branch created at initialization.
    pub default_branch: String,
    /// Free-form description.
    pub description: Option<String>,
    /// Free-form properties.
    pub properties: BTreeMap<String, String>,
}

impl RepositoryInfo {
    pub fn new(default_branch: impl Into<String>) -> Self {
        Self {
            default_branch: default_branch.into(),
            ..Self::default()
        }
    }
}

fn encode(info: &RepositoryInfo, version_token: String) -> EngineResult<GenericObj> {
    let payload = serde_json::to_vec(info)
        .map_err(|e| VersionStoreError::Serialization(e.to_string()))?;
    Ok(GenericObj {
        id: *REPOSITORY_OBJ_ID,
        tag: REPOSITORY_TAG.into(),
        payload,
        version_token: Some(version_token),
    })
}

fn decode(obj: &GenericObj) -> EngineResult<RepositoryInfo> {
    serde_json::from_slice(&obj.payload)
        .map_err(|e| VersionStoreError::Serialization(e.to_string()))
}

/// Write the repository description and create its default branch at the
/// empty pointer. Re-running against an initialized store is a no-op for
/// the branch and replaces the description.
pub fn initialize_repository(persist: &dyn Persist, info: &RepositoryInfo) -> EngineResult<()> {
    let obj = encode(info, ContentId::generate().to_string())?;
    persist.upsert_obj(&Obj::Generic(obj))?;

    let branch = Reference::new(&info.default_branch, ObjId::no_ancestor());
    match persist.add_reference(&branch) {
        Ok(_) => {
            debug!(branch = %info.default_branch, "initialized repository");
            Ok(())
        }
        Err(PersistError::RefAlreadyExists { .. }) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Fetch the repository description, if the store has been initialized.
pub fn fetch_repository_info(persist: &dyn Persist) -> EngineResult<Option<RepositoryInfo>> {
    match persist.fetch_obj(&REPOSITORY_OBJ_ID) {
        Ok(Obj::Generic(obj)) => Ok(Some(decode(&obj)?)),
        Ok(_) | Err(PersistError::ObjNotFound(_)) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Replace the repository description through `update`, retrying the
/// conditional swap a bounded number of times against concurrent writers.
pub fn update_repository_info(
    persist: &dyn Persist,
    update: impl Fn(RepositoryInfo) -> RepositoryInfo,
) -> EngineResult<RepositoryInfo> {
    for _ in 0..UPDATE_ATTEMPTS {
        let current = match persist.fetch_obj(&REPOSITORY_OBJ_ID) {
            Ok(Obj::Generic(obj)) => obj,
            Ok(_) | Err(PersistError::ObjNotFound(_)) => {
                return Err(VersionStoreError::ReferenceNotFound {
                    name: REPOSITORY_TAG.into(),
                })
            }
            Err(e) => return Err(e.into()),
        };
        let updated = update(decode(&current)?);
        let new_obj = encode(&updated, ContentId::generate().to_string())?;
        if persist.update_conditional(&current, &new_obj)? {
            return Ok(updated);
        }
        debug!("lost repository-description swap, refetching");
    }
    Err(VersionStoreError::RetryExhausted {
        operation: "update-repository",
        name: REPOSITORY_TAG.into(),
        attempts: UPDATE_ATTEMPTS,
    })
}

/// Destroy the whole store: every object and every reference row,
/// including soft-deleted ones. Intended for maintenance; concurrent
/// writers see undefined contents.
pub fn erase_repository(persist: &dyn Persist) -> EngineResult<()> {
    let ids: Vec<ObjId> = persist.scan_all_objects(&[])?.map(|obj| obj.id()).collect();
    let objects = ids.len();
    for id in ids {
        persist.delete_obj(&id)?;
    }

    let rows = persist.list_references()?;
    let references = rows.len();
    for row in rows {
        let deleted = if row.deleted {
            row
        } else {
            persist.mark_reference_as_deleted(&row)?
        };
        persist.purge_reference(&deleted)?;
    }
    debug!(objects, references, "erased repository");
    Ok(())
}
