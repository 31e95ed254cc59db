//! `revwatch history` — stored revisions, newest first.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use revwatch_core::RevisionRecord;
use revwatch_store::{JsonRevisionStore, RevisionStore};

/// Arguments for `revwatch history`.
#[derive(Args, Debug)]
pub struct HistoryArgs {
    /// Show at most this many records.
    #[arg(long)]
    pub limit: Option<usize>,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Tabled)]
struct HistoryRow {
    #[tabled(rename = "#")]
    number: u64,
    #[tabled(rename = "sha")]
    sha: String,
    #[tabled(rename = "created")]
    created_at: String,
    #[tabled(rename = "age")]
    age: String,
}

impl HistoryArgs {
    pub fn run(self) -> Result<()> {
        let (home, config) = super::home_and_config()?;
        let store = JsonRevisionStore::open_at(&home, &config.upstream);
        let mut records = store
            .list()
            .with_context(|| format!("failed to read {}", store.path().display()))?;
        if let Some(limit) = self.limit {
            records.truncate(limit);
        }

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&records)
                    .context("failed to render history JSON")?
            );
            return Ok(());
        }

        if records.is_empty() {
            println!("No revisions recorded for {} yet.", config.upstream);
            return Ok(());
        }

        println!("{}", config.upstream.to_string().bold());
        let now = Utc::now();
        let rows: Vec<HistoryRow> = records.iter().map(|r| history_row(r, now)).collect();
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{table}");
        Ok(())
    }
}

fn history_row(record: &RevisionRecord, now: DateTime<Utc>) -> HistoryRow {
    HistoryRow {
        number: record.number,
        sha: record.sha.short().to_string(),
        created_at: record.created_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        age: format_age(now, record.created_at),
    }
}

/// Coarse "3m ago" / "2h ago" / "5d ago".
fn format_age(now: DateTime<Utc>, then: DateTime<Utc>) -> String {
    let secs = (now - then).num_seconds().max(0);
    match secs {
        0..=59 => "just now".to_string(),
        60..=3_599 => format!("{}m ago", secs / 60),
        3_600..=86_399 => format!("{}h ago", secs / 3_600),
        _ => format!("{}d ago", secs / 86_400),
    }
}
