use thiserror::Error;

use sprintsync_clients::{SourceError, StoreError, TrackerError};
use sprintsync_sync::SyncError;

/// Error surface for client construction and the scheduler runtime.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("failed to start runtime: {0}")]
    Runtime(#[source] std::io::Error),

    #[error("store client error: {0}")]
    Store(#[from] StoreError),

    #[error("tracker client error: {0}")]
    Tracker(#[from] TrackerError),

    #[error("sheet client error: {0}")]
    Source(#[from] SourceError),

    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    #[error("signal handler failed: {0}")]
    Signal(String),

    #[error("task {task} failed to join: {reason}")]
    Join { task: &'static str, reason: String },
}
