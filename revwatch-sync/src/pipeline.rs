//! Shared reconcile entrypoint used by CLI and daemon.

use std::path::Path;

use revwatch_core::Config;
use revwatch_store::JsonRevisionStore;

use crate::fetcher::GitHubSource;
use crate::reconcile::{reconcile, Reconciliation};

/// Reconcile the configured upstream against the on-disk store under `home`.
pub fn run_at(home: &Path, config: &Config) -> Reconciliation {
    let source = GitHubSource::from_config(config);
    let store = JsonRevisionStore::open_at(home, &config.upstream);
    reconcile(&source, &store)
}
