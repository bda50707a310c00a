//! Persist SPI for Verso.
//!
//! This crate defines the storage contract the engine runs against:
//! - [`Persist`] — the combined object-store and reference-store trait a
//!   backend must implement. Backends only need to provide idempotent
//!   content-addressed object writes and a compare-and-swap on the
//!   reference row; the engine builds everything else on top.
//! - [`StoreLimits`] — backend-declared size limits the engine consults
//!   when splitting key indexes into segments.
//! - [`InMemoryPersist`] — HashMap-backed implementation for tests and
//!   embedding.

pub mod error;
pub mod limits;
pub mod memory;
pub mod traits;

pub use error::{PersistError, PersistResult};
pub use limits::StoreLimits;
pub use memory::InMemoryPersist;
pub use traits::{fetch_commit, fetch_index_segment, Persist};
