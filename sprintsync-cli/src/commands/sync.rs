//! `sprintsync sync`: a single run.

use anyhow::{Context, Result};
use clap::Args;

use sprintsync_core::{Config, SyncMode};
use sprintsync_daemon::{init_tracing, Clients};
use sprintsync_sync::pipeline;

/// Arguments for `sprintsync sync`.
#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Force a full sync (both sync-state stamps).
    #[arg(long, conflicts_with = "incremental")]
    pub full: bool,

    /// Force an incremental sync.
    #[arg(long)]
    pub incremental: bool,

    /// Run against an in-memory store; tracker sync is disabled.
    #[arg(long)]
    pub dry_run: bool,

    /// Emit logs as JSON lines.
    #[arg(long)]
    pub log_json: bool,
}

impl SyncArgs {
    fn mode(&self, config: &Config) -> SyncMode {
        if self.full {
            SyncMode::Full
        } else if self.incremental {
            SyncMode::Incremental
        } else {
            config.mode
        }
    }

    pub fn run(self) -> Result<()> {
        init_tracing(self.log_json);
        let config = Config::from_env().context("failed to load configuration")?;
        let mode = self.mode(&config);

        let clients = if self.dry_run {
            eprintln!("[dry-run] using an in-memory store; nothing is written");
            Clients::in_memory(&config)
        } else {
            Clients::from_config(&config)
        }
        .context("failed to build clients")?;

        let report = super::runtime()?
            .block_on(pipeline::run(clients.context(&config), mode))
            .with_context(|| format!("{mode} sync failed"))?;

        println!("{}", serde_json::to_string_pretty(&report)?);
        Ok(())
    }
}
