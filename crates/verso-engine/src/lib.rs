//! The Verso versioned storage engine.
//!
//! This crate implements the commit, merge, and transplant algorithms over
//! the Persist SPI:
//! - [`VersionStore`] — the caller-facing operation surface (commits,
//!   merges, transplants, reference lifecycle, reads)
//! - [`KeyIndex`] — materialized key index with size-bounded segmentation
//! - Conflict detection — per-key read-then-compare, all-or-nothing
//! - Merge-base computation and per-key three-way classification
//! - The bounded optimistic-retry loop around reference CAS
//!
//! The engine is agnostic to threading: it is invoked synchronously per
//! request, and safety under concurrent writers comes entirely from the
//! backend's compare-and-swap on the reference row. No durable state is
//! touched until the final successful swap, which makes retries idempotent.

pub mod commit;
pub mod conflict;
pub mod error;
pub mod events;
pub mod history;
pub mod index;
pub mod merge;
pub mod repository;
pub mod retry;
pub mod store;

pub use commit::{CommitRequest, CommitResult};
pub use error::{EngineResult, VersionStoreError};
pub use events::{EventSink, MutationEvent, MutationKind, NoopSink, RecordingSink};
pub use history::{diff_indexes, KeyChange, KeyDiffEntry};
pub use index::KeyIndex;
pub use merge::{
    KeyAction, KeyDetail, MergeBehavior, MergeRequest, MergeResult, TransplantRequest,
};
pub use repository::{
    erase_repository, fetch_repository_info, initialize_repository, update_repository_info,
    RepositoryInfo, REPOSITORY_OBJ_ID,
};
pub use retry::RetryConfig;
pub use store::VersionStore;
