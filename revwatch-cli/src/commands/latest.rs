//! `revwatch latest` — print the highest-numbered stored revision.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use revwatch_store::{JsonRevisionStore, RevisionStore};

/// Arguments for `revwatch latest`.
#[derive(Args, Debug)]
pub struct LatestArgs {
    /// Emit the record as JSON (`null` when nothing is stored).
    #[arg(long)]
    pub json: bool,
}

impl LatestArgs {
    pub fn run(self) -> Result<()> {
        let (home, config) = super::home_and_config()?;
        let store = JsonRevisionStore::open_at(&home, &config.upstream);
        let latest = store
            .latest()
            .with_context(|| format!("failed to read {}", store.path().display()))?;

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&latest).context("failed to render record JSON")?
            );
            return Ok(());
        }

        match latest {
            Some(record) => {
                println!("{} {}", "Upstream:".bold(), config.upstream);
                println!("{} {}", "Number:".bold(), record.number);
                println!("{} {}", "SHA:".bold(), record.sha);
                println!("{} {}", "Created:".bold(), record.created_at.to_rfc3339());
            }
            None => println!(
                "No revisions recorded for {} yet; run `revwatch reconcile`.",
                config.upstream
            ),
        }
        Ok(())
    }
}
