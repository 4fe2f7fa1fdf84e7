//! Chunked bulk upsert with per-chunk retry.
//!
//! Chunks are sent one after another in input order. A chunk is retried on
//! transient store errors only; once its retries run out the whole call
//! fails and the chunks already written stay written.

use serde_json::Value;
use tracing::warn;

use crate::retry::{Retry, RetryPolicy};
use crate::store::{Store, StoreError};

pub const DEFAULT_CHUNK_SIZE: usize = 500;
pub const DEFAULT_MAX_RETRIES: u32 = 3;

#[derive(Debug, Clone)]
pub struct UpsertRequest<'a> {
    pub table: &'a str,
    pub rows: &'a [Value],
    pub on_conflict: &'a str,
    pub chunk_size: usize,
    pub max_retries: u32,
}

impl<'a> UpsertRequest<'a> {
    pub fn new(table: &'a str, rows: &'a [Value], on_conflict: &'a str) -> Self {
        Self {
            table,
            rows,
            on_conflict,
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UpsertOutcome {
    pub count: usize,
}

pub async fn upsert_with_retry(
    store: &dyn Store,
    request: UpsertRequest<'_>,
) -> Result<UpsertOutcome, StoreError> {
    if request.table.trim().is_empty() {
        return Err(StoreError::InvalidArgument("upsert needs a table name".into()));
    }
    if request.on_conflict.trim().is_empty() {
        return Err(StoreError::InvalidArgument(format!(
            "upsert on {} needs a conflict key",
            request.table
        )));
    }
    if request.chunk_size == 0 {
        return Err(StoreError::InvalidArgument("chunk size must be positive".into()));
    }

    let table = request.table;
    let mut count = 0;
    for (index, chunk) in request.rows.chunks(request.chunk_size).enumerate() {
        let retry = Retry::new(RetryPolicy::with_max_retries(request.max_retries))
            .should_retry(|err: &StoreError, _| err.is_transient())
            .on_retry(move |a| {
                warn!(
                    table,
                    chunk = index,
                    attempt = a.attempt,
                    delay_ms = a.delay.as_millis() as u64,
                    error = %a.error,
                    "retrying upsert chunk"
                );
            });
        count += retry
            .run(|_| store.upsert(table, chunk, request.on_conflict))
            .await?;
    }

    Ok(UpsertOutcome { count })
}
