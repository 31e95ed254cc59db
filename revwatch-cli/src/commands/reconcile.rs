//! `revwatch reconcile` — one fetch/compare/record cycle in the foreground.

use anyhow::{anyhow, Context, Result};
use clap::Args;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use revwatch_sync::{pipeline, ReconcileOutcome, Report};

/// Arguments for `revwatch reconcile`.
#[derive(Args, Debug)]
pub struct ReconcileArgs {
    /// Emit machine-readable JSON instead of the step report.
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct ReconcileJson<'a> {
    ok: bool,
    report: &'a Report,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<&'a ReconcileOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stage: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl ReconcileArgs {
    pub fn run(self) -> Result<()> {
        init_tracing();
        let (home, config) = super::home_and_config()?;

        let run = pipeline::run_at(&home, &config);

        if self.json {
            let payload = ReconcileJson {
                ok: run.is_success(),
                report: &run.report,
                result: run.result.as_ref().ok(),
                stage: run.result.as_ref().err().map(|e| e.stage()),
                error: run.result.as_ref().err().map(|e| e.to_string()),
            };
            println!(
                "{}",
                serde_json::to_string_pretty(&payload)
                    .context("failed to render reconcile JSON")?
            );
        } else {
            print!("{}", run.report);
        }

        match run.result {
            Ok(_) => Ok(()),
            Err(err) => {
                let stage = err.stage();
                Err(anyhow!(err).context(format!("reconcile failed at the {stage} step")))
            }
        }
    }
}

/// Warnings and up go to stderr so stdout stays the report.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
