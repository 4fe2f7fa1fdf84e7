//! Sprintsync core library: domain types, configuration, errors.
//!
//! - [`types`]: newtypes, canonical rows and store records
//! - [`config`]: environment-driven [`Config`]
//! - [`error`]: [`ConfigError`]

pub mod config;
pub mod error;
pub mod types;

pub use config::{Config, StoreConfig, TableNames, TrackerConfig};
pub use error::ConfigError;
pub use types::{
    parse_number, CanonicalRow, ChangeType, IssueKey, IssueSprintAssociation, NormalizedIssue,
    RawIssue, ScopeChangeEvent, SprintMetrics, SprintMetricsSnapshot, SprintName, SprintRecord,
    SprintSource, StatusTransition, StoredAssociation, SyncMode, SyncState,
};
