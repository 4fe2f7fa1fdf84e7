//! Error types for sprintsync-sync.

use thiserror::Error;

use sprintsync_clients::{SourceError, StoreError, TrackerError};
use sprintsync_sheet::SheetError;

/// All errors that can abort a sync run.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("tracker error: {0}")]
    Tracker(#[from] TrackerError),

    #[error("sheet download error: {0}")]
    Source(#[from] SourceError),

    #[error("sheet error: {0}")]
    Sheet(#[from] SheetError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A required argument such as a table name was empty.
    #[error("{0} is required")]
    MissingArgument(&'static str),
}

/// Reject an empty table name before any I/O.
pub(crate) fn require_table(table: &str, what: &'static str) -> Result<(), SyncError> {
    if table.trim().is_empty() {
        return Err(SyncError::MissingArgument(what));
    }
    Ok(())
}
