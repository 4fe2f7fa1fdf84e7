//! # sprintsync-clients
//!
//! Remote collaborators of the sync pipeline and the retry machinery they
//! share:
//!
//! - [`retry`]: exponential backoff with jitter for any async operation
//! - [`tracker`]: issue-tracker REST client honouring `Retry-After`
//! - [`sheet`]: CSV export download
//! - [`store`]: the [`Store`] seam plus REST and in-memory adapters
//! - [`upsert`]: chunked, retried bulk upsert

pub mod retry;
pub mod sheet;
pub mod store;
pub mod tracker;
pub mod upsert;

pub use retry::{Retry, RetryAttempt, RetryPolicy};
pub use sheet::{HttpSheetSource, SheetSource, SourceError};
pub use store::{Filter, MemoryStore, RestStore, Select, Store, StoreError};
pub use tracker::{TrackerApi, TrackerClient, TrackerError, TrackerRequest};
pub use upsert::{upsert_with_retry, UpsertOutcome, UpsertRequest};
