//! Sprintsync: sprint tracking sheet → relational store sync.
//!
//! # Usage
//!
//! ```text
//! sprintsync sync [--full | --incremental] [--dry-run] [--log-json]
//! sprintsync preview [--url <csv-url>] [--top <n>] [--sample <n>] [--json]
//! sprintsync daemon [--log-json]
//! ```
//!
//! Settings come from the environment; `.env` files in the working directory
//! and its parent are loaded first without overriding variables already set.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{daemon::DaemonArgs, preview::PreviewArgs, sync::SyncArgs};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "sprintsync",
    version,
    about = "Sync sprint tracking data from a spreadsheet (and optionally the issue tracker) into the store",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run one sync and print the report as JSON.
    Sync(SyncArgs),

    /// Fetch and map the sheet without touching the store.
    Preview(PreviewArgs),

    /// Full sync now, then incremental syncs on the configured interval.
    Daemon(DaemonArgs),
}

fn main() -> Result<()> {
    commands::load_dotenv();
    let cli = Cli::parse();
    match cli.command {
        Commands::Sync(args) => args.run(),
        Commands::Preview(args) => args.run(),
        Commands::Daemon(args) => args.run(),
    }
}
