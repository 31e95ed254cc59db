//! On-disk layout.
//!
//! ```text
//! ~/.revwatch/
//!   config.yaml
//!   revisions/<owner>__<repo>__<branch>.json
//!   daemon.sock
//!   logs/daemon.log, logs/daemon-err.log
//! ```

use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::types::Upstream;

pub const CONFIG_FILE: &str = "config.yaml";

/// Resolve the user's home directory.
pub fn home() -> Result<PathBuf, ConfigError> {
    dirs::home_dir().ok_or(ConfigError::HomeNotFound)
}

pub fn revwatch_root(home: &Path) -> PathBuf {
    home.join(".revwatch")
}

pub fn config_path(home: &Path) -> PathBuf {
    revwatch_root(home).join(CONFIG_FILE)
}

pub fn revisions_dir(home: &Path) -> PathBuf {
    revwatch_root(home).join("revisions")
}

/// `~/.revwatch/revisions/<slug>.json` — pure, no I/O.
pub fn store_path(home: &Path, upstream: &Upstream) -> PathBuf {
    revisions_dir(home).join(format!("{}.json", upstream.slug()))
}
