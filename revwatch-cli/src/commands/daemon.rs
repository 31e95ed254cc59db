//! `revwatch daemon` — foreground scheduler/HTTP trigger and its control socket.

use anyhow::{bail, Context, Result};
use clap::Subcommand;

use revwatch_core::paths;
use revwatch_daemon::{start_blocking, ControlClient, DaemonError};

#[derive(Subcommand, Debug)]
pub enum DaemonCommand {
    /// Run the daemon in the foreground (scheduler + HTTP trigger + socket).
    Start,
    /// Request graceful daemon shutdown over the Unix socket.
    Stop,
    /// Query daemon runtime status over the Unix socket.
    Status,
    /// Run one reconciliation inside the running daemon and print its report.
    Reconcile,
}

pub fn run(command: DaemonCommand) -> Result<()> {
    let home = paths::home()?;
    let client = ControlClient::new(&home);

    match command {
        DaemonCommand::Start => {
            start_blocking(&home).context("daemon exited with error")?;
        }
        DaemonCommand::Stop => match client.stop() {
            Ok(()) => println!("daemon stop requested"),
            Err(DaemonError::DaemonNotRunning { .. }) => println!("daemon is not running"),
            Err(err) => return Err(err).context("failed to stop daemon"),
        },
        DaemonCommand::Status => {
            let status = match client.status() {
                Ok(status) => status,
                Err(DaemonError::DaemonNotRunning { socket }) => serde_json::json!({
                    "running": false,
                    "socket": socket.display().to_string(),
                }),
                Err(err) => return Err(err).context("failed to query daemon status"),
            };
            println!(
                "{}",
                serde_json::to_string_pretty(&status)
                    .context("failed to render daemon status JSON")?
            );
        }
        DaemonCommand::Reconcile => {
            let summary = client.reconcile().context("daemon reconcile failed")?;
            print!("{}", summary.report_text());
            if !summary.ok {
                bail!(
                    "reconcile failed at the {} step",
                    summary.stage.as_deref().unwrap_or("unknown")
                );
            }
        }
    }

    Ok(())
}
