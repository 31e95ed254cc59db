//! # revwatch-store
//!
//! Append-only storage for [`RevisionRecord`](revwatch_core::RevisionRecord)s.
//!
//! [`RevisionStore`] is the seam the reconciler writes through.
//! [`JsonRevisionStore`] persists one JSON document per tracked branch;
//! [`MemoryRevisionStore`] keeps everything in process.

pub mod error;
pub mod json;
pub mod memory;
pub mod store;

pub use error::StoreError;
pub use json::JsonRevisionStore;
pub use memory::MemoryRevisionStore;
pub use store::{InsertOutcome, RevisionFile, RevisionStore, StoredRevision};
