//! revwatch — track the head of an upstream branch as numbered revisions.
//!
//! # Usage
//!
//! ```text
//! revwatch init [--owner <o>] [--repo <r>] [--branch <b>] [--interval <secs>] [--force]
//! revwatch reconcile [--json]
//! revwatch latest [--json]
//! revwatch history [--limit <n>] [--json]
//! revwatch daemon start|stop|status|reconcile
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    daemon::DaemonCommand, history::HistoryArgs, init::InitArgs, latest::LatestArgs,
    reconcile::ReconcileArgs,
};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "revwatch",
    version,
    about = "Record the latest commit of an upstream branch as numbered revisions",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write ~/.revwatch/config.yaml.
    Init(InitArgs),

    /// Fetch the upstream head once and record it if it changed.
    Reconcile(ReconcileArgs),

    /// Show the latest stored revision.
    Latest(LatestArgs),

    /// List stored revisions, newest first.
    History(HistoryArgs),

    /// Manage the background scheduler / HTTP trigger.
    Daemon {
        #[command(subcommand)]
        command: DaemonCommand,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Init(args) => args.run(),
        Commands::Reconcile(args) => args.run(),
        Commands::Latest(args) => args.run(),
        Commands::History(args) => args.run(),
        Commands::Daemon { command } => commands::daemon::run(command),
    }
}
