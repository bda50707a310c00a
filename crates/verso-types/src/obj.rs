use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::id::ObjId;
use crate::key::StoreKey;
use crate::op::{CommitMeta, CommitOp};
use crate::payload::Payload;

/// Discriminant for the persisted object kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjKind {
    /// A commit in the version DAG.
    Commit,
    /// One segment of a materialized key index.
    IndexSegment,
    /// An opaque, payload-mutable object with a stable id.
    Generic,
}

impl fmt::Display for ObjKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Commit => write!(f, "commit"),
            Self::IndexSegment => write!(f, "index-segment"),
            Self::Generic => write!(f, "generic"),
        }
    }
}

/// A commit in the version DAG.
///
/// Immutable once stored. The first parent is the primary parent (the
/// branch head the commit was applied on); secondary parents record merge
/// provenance. `delta` holds only the keys this commit touched;
/// `index_segments` names the segments of the full key index as of this
/// commit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitObj {
    /// Content-addressed identity, derived from all other fields.
    pub id: ObjId,
    /// Parent commits; first is the primary parent. A root commit has the
    /// single parent [`ObjId::no_ancestor`].
    pub parents: Vec<ObjId>,
    /// Keys touched by this commit and how.
    pub delta: BTreeMap<StoreKey, CommitOp>,
    /// Segments of the full key index as of this commit, in key order.
    pub index_segments: Vec<ObjId>,
    /// Opaque caller-supplied metadata.
    pub metadata: CommitMeta,
    /// Creation timestamp, microseconds since the UNIX epoch.
    pub created_at: u64,
}

impl CommitObj {
    /// Build a commit, deriving its id from the canonical encoding of its
    /// content.
    pub fn build(
        parents: Vec<ObjId>,
        delta: BTreeMap<StoreKey, CommitOp>,
        index_segments: Vec<ObjId>,
        metadata: CommitMeta,
        created_at: u64,
    ) -> Result<Self, TypeError> {
        let encoded = bincode::serialize(&(
            &parents,
            &delta,
            &index_segments,
            &metadata,
            created_at,
        ))
        .map_err(|e| TypeError::Serialization(e.to_string()))?;
        Ok(Self {
            id: ObjId::hash_bytes(&encoded),
            parents,
            delta,
            index_segments,
            metadata,
            created_at,
        })
    }

    /// The primary parent (first in the parent list).
    pub fn primary_parent(&self) -> ObjId {
        self.parents
            .first()
            .copied()
            .unwrap_or_else(ObjId::no_ancestor)
    }

    /// Returns `true` if this commit's primary parent is the sentinel.
    pub fn is_root(&self) -> bool {
        self.primary_parent().is_no_ancestor()
    }

    /// Returns `true` if this commit has more than one parent.
    pub fn is_merge(&self) -> bool {
        self.parents.len() > 1
    }
}

/// One entry of a materialized key index.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub key: StoreKey,
    pub payload: Payload,
}

/// One segment of a materialized key index.
///
/// A commit's full index is the ordered concatenation of its segments.
/// Segments are content-addressed, so unchanged index regions are shared
/// between commits for free.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSegmentObj {
    /// Content-addressed identity, derived from the entries.
    pub id: ObjId,
    /// First key in this segment (segments are sorted and disjoint).
    pub first_key: StoreKey,
    /// Entries in ascending key order.
    pub entries: Vec<IndexEntry>,
}

impl IndexSegmentObj {
    /// Build a segment from entries already in ascending key order.
    pub fn build(entries: Vec<IndexEntry>) -> Result<Self, TypeError> {
        let first = entries
            .first()
            .ok_or_else(|| TypeError::Serialization("empty index segment".into()))?;
        debug_assert!(entries.windows(2).all(|w| w[0].key < w[1].key));
        let first_key = first.key.clone();
        let encoded = bincode::serialize(&entries)
            .map_err(|e| TypeError::Serialization(e.to_string()))?;
        Ok(Self {
            id: ObjId::hash_bytes(&encoded),
            first_key,
            entries,
        })
    }
}

/// An opaque object with a stable id and mutable payload.
///
/// Unlike commits and index segments, a `GenericObj`'s id is chosen by the
/// caller (e.g. a well-known singleton id) and its payload may be replaced
/// via upsert or a conditional update guarded by `version_token`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenericObj {
    /// Caller-chosen stable id.
    pub id: ObjId,
    /// Free-form kind tag (e.g. "repository").
    pub tag: String,
    /// Opaque payload bytes.
    pub payload: Vec<u8>,
    /// Version token for conditional updates. Compared verbatim.
    pub version_token: Option<String>,
}

/// Closed union of every persisted object kind.
///
/// Deserialization at the storage boundary matches exhaustively on this
/// union; kinds outside the engine's scope travel as [`GenericObj`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Obj {
    Commit(CommitObj),
    IndexSegment(IndexSegmentObj),
    Generic(GenericObj),
}

impl Obj {
    /// The object's id.
    pub fn id(&self) -> ObjId {
        match self {
            Self::Commit(c) => c.id,
            Self::IndexSegment(s) => s.id,
            Self::Generic(g) => g.id,
        }
    }

    /// The object's kind discriminant.
    pub fn kind(&self) -> ObjKind {
        match self {
            Self::Commit(_) => ObjKind::Commit,
            Self::IndexSegment(_) => ObjKind::IndexSegment,
            Self::Generic(_) => ObjKind::Generic,
        }
    }

    /// Borrow as a commit, if this is one.
    pub fn as_commit(&self) -> Option<&CommitObj> {
        match self {
            Self::Commit(c) => Some(c),
            _ => None,
        }
    }

    /// Borrow as an index segment, if this is one.
    pub fn as_index_segment(&self) -> Option<&IndexSegmentObj> {
        match self {
            Self::IndexSegment(s) => Some(s),
            _ => None,
        }
    }

    /// Borrow as a generic object, if this is one.
    pub fn as_generic(&self) -> Option<&GenericObj> {
        match self {
            Self::Generic(g) => Some(g),
            _ => None,
        }
    }
}
