//! Foundation types for Verso.
//!
//! Verso is a content-addressed version-control engine for structured data
//! catalogs. This crate provides the types shared by every other Verso
//! crate: identifiers, keys, commit operations, references, the persisted
//! object union, and the conflict model.
//!
//! # Key Types
//!
//! - [`ObjId`] — Content-addressed identifier (BLAKE3 hash)
//! - [`StoreKey`] — Hierarchical, totally ordered key into the catalog index
//! - [`ContentId`] — Stable UUID identity of a tracked entity
//! - [`CommitOp`] — One mutation against a key, with caller expectations
//! - [`Reference`] — Named mutable pointer into the commit DAG
//! - [`Obj`] — Closed union of persisted object kinds
//! - [`CommitConflict`] — Structured per-key conflict report

pub mod conflict;
pub mod error;
pub mod id;
pub mod key;
pub mod obj;
pub mod op;
pub mod payload;
pub mod reference;
pub mod time;

pub use conflict::{CommitConflict, ConflictType};
pub use error::TypeError;
pub use id::{ContentId, ObjId};
pub use key::StoreKey;
pub use obj::{CommitObj, GenericObj, IndexEntry, IndexSegmentObj, Obj, ObjKind};
pub use op::{CommitMeta, CommitOp};
pub use payload::{Payload, PayloadKind};
pub use reference::Reference;
pub use time::now_micros;
