//! `revwatch init` — write the config file.

use anyhow::{Context, Result};
use clap::Args;

use revwatch_core::{config, paths, Config, Upstream};

/// Write `~/.revwatch/config.yaml`, starting from the defaults.
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Repository owner (user or organisation).
    #[arg(long)]
    pub owner: Option<String>,

    /// Repository name.
    #[arg(long)]
    pub repo: Option<String>,

    /// Branch whose head is tracked.
    #[arg(long)]
    pub branch: Option<String>,

    /// Hosting API base URL.
    #[arg(long)]
    pub api_base: Option<String>,

    /// Environment variable holding the API token.
    #[arg(long)]
    pub token_env: Option<String>,

    /// Daemon scheduler period in seconds.
    #[arg(long, value_name = "SECS")]
    pub interval: Option<u64>,

    /// Address for the daemon's HTTP trigger.
    #[arg(long, value_name = "ADDR")]
    pub bind: Option<String>,

    /// Path for the daemon's HTTP trigger.
    #[arg(long)]
    pub path: Option<String>,

    /// Overwrite an existing config.
    #[arg(long)]
    pub force: bool,
}

impl InitArgs {
    pub fn run(self) -> Result<()> {
        let home = paths::home()?;
        let force = self.force;
        let config = self.into_config();
        config::init_at(&home, &config, force).context("failed to write config")?;

        println!("✓ Tracking {}", config.upstream);
        println!("  Saved to: {}", paths::config_path(&home).display());
        if config.token().is_none() {
            println!(
                "  No token in ${}; upstream requests will be unauthenticated.",
                config.token_env
            );
        }
        Ok(())
    }

    fn into_config(self) -> Config {
        let defaults = Config::default();
        let upstream = Upstream {
            owner: self.owner.unwrap_or(defaults.upstream.owner),
            repo: self.repo.unwrap_or(defaults.upstream.repo),
            branch: self.branch.unwrap_or(defaults.upstream.branch),
        };
        let mut config = Config {
            upstream,
            api_base: self.api_base.unwrap_or(defaults.api_base),
            token_env: self.token_env.unwrap_or(defaults.token_env),
            interval_secs: self.interval.unwrap_or(defaults.interval_secs),
            ..Config::default()
        };
        if let Some(bind) = self.bind {
            config.http.bind = bind;
        }
        if let Some(path) = self.path {
            config.http.path = path;
        }
        config
    }
}
