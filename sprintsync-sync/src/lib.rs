//! # sprintsync-sync
//!
//! Sheet → store sync stages and the orchestrator that chains them.
//!
//! Call [`pipeline::run`] (or [`full_sync`] / [`incremental_sync`]) with a
//! [`SyncContext`] to load the sheet, write issues, sprints, associations,
//! scope changes and metrics, optionally pull from the tracker, and stamp
//! the sync state.

pub mod error;
pub mod issue_sprints;
pub mod issues;
pub mod metrics;
mod outcome;
pub mod pipeline;
pub mod scope_changes;
pub mod sprint_names;
pub mod sprints;
pub mod tracker;

pub use error::SyncError;
pub use outcome::StageOutcome;
pub use pipeline::{
    dedupe_rows_by_key, full_sync, incremental_sync, SyncContext, SyncReport, SyncStateSummary,
};
pub use sprint_names::{parse_sprint_names, parse_sprint_text};
