//! `sprintsync daemon`: foreground scheduler.

use anyhow::{Context, Result};
use clap::Args;

use sprintsync_core::Config;
use sprintsync_daemon::start_blocking;

#[derive(Args, Debug)]
pub struct DaemonArgs {
    /// Emit logs as JSON lines.
    #[arg(long)]
    pub log_json: bool,
}

impl DaemonArgs {
    pub fn run(self) -> Result<()> {
        let config = Config::from_env().context("failed to load configuration")?;
        start_blocking(config, self.log_json).context("daemon exited with error")
    }
}
