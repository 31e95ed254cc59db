//! # revwatch-sync
//!
//! Fetch the upstream head and reconcile it against the revision store.
//!
//! Call [`reconcile`] with any [`RevisionSource`] and
//! [`RevisionStore`](revwatch_store::RevisionStore), or [`pipeline::run_at`]
//! to use the configured GitHub endpoint and on-disk store.

pub mod error;
pub mod fetcher;
pub mod pipeline;
pub mod reconcile;

pub use error::{FetchError, ReconcileError};
pub use fetcher::{GitHubSource, RevisionSource};
pub use reconcile::{reconcile, reconcile_at, ReconcileOutcome, Reconciliation, Report};
