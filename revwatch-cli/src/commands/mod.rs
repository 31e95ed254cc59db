pub mod daemon;
pub mod history;
pub mod init;
pub mod latest;
pub mod reconcile;

use std::path::PathBuf;

use anyhow::{Context, Result};
use revwatch_core::{config, paths, Config};

/// Home directory and loaded config, shared by every command.
pub(crate) fn home_and_config() -> Result<(PathBuf, Config)> {
    let home = paths::home()?;
    let config = config::load_at(&home).context("failed to load ~/.revwatch/config.yaml")?;
    Ok((home, config))
}
