//! The relational store seam.
//!
//! The pipeline only needs four verbs against named tables: upsert on a
//! conflict key, plain insert, filtered select and filtered update. Rows
//! travel as JSON objects.

mod memory;
mod rest;

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

pub use memory::MemoryStore;
pub use rest::RestStore;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum StoreError {
    /// The table does not exist in the store schema.
    #[error("missing table {table}")]
    MissingTable { table: String },

    #[error("store request on {table} failed with status {status}: {body}")]
    Http {
        table: String,
        status: u16,
        body: String,
    },

    #[error("store request on {table} failed: {source}")]
    Transport {
        table: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("store response from {table} was malformed: {source}")]
    Decode {
        table: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid store argument: {0}")]
    InvalidArgument(String),

    #[error("invalid store configuration: {0}")]
    Configuration(String),
}

impl StoreError {
    /// Failures that may succeed on a later attempt: connection trouble,
    /// timeouts, rate limiting and gateway errors.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Transport { source, .. } => !source.is_builder() && !source.is_decode(),
            StoreError::Http { status, .. } => matches!(status, 429 | 502 | 503 | 504),
            _ => false,
        }
    }

    pub fn is_missing_table(&self) -> bool {
        matches!(self, StoreError::MissingTable { .. })
    }
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// Row predicate on a single column.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(String, Value),
    In(String, Vec<Value>),
}

impl Filter {
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Eq(column.into(), value.into())
    }

    pub fn in_list<V: Into<Value>>(
        column: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Filter::In(column.into(), values.into_iter().map(Into::into).collect())
    }

    pub fn column(&self) -> &str {
        match self {
            Filter::Eq(column, _) | Filter::In(column, _) => column,
        }
    }

    pub fn matches(&self, row: &Map<String, Value>) -> bool {
        let cell = |column: &str| row.get(column).unwrap_or(&Value::Null);
        match self {
            Filter::Eq(column, value) => loosely_equal(cell(column), value),
            Filter::In(column, values) => values.iter().any(|v| loosely_equal(cell(column), v)),
        }
    }
}

/// Equality that treats `3` and `3.0` as the same number.
fn loosely_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

/// Column projection plus conjunctive filters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Select {
    /// Empty means every column.
    pub columns: Vec<String>,
    pub filters: Vec<Filter>,
}

impl Select {
    pub fn columns(columns: &[&str]) -> Self {
        Self {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            filters: Vec::new(),
        }
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

#[async_trait]
pub trait Store: Send + Sync {
    /// Insert or merge `rows` keyed by the comma-separated `on_conflict`
    /// columns. Returns the number of rows sent.
    async fn upsert(&self, table: &str, rows: &[Value], on_conflict: &str)
        -> Result<usize, StoreError>;

    /// Append `rows`. Returns the number of rows sent.
    async fn insert(&self, table: &str, rows: &[Value]) -> Result<usize, StoreError>;

    async fn select(&self, table: &str, query: &Select) -> Result<Vec<Value>, StoreError>;

    /// Merge `patch` into every row matching `filter`. Returns rows touched.
    async fn update(&self, table: &str, filter: &Filter, patch: &Value)
        -> Result<usize, StoreError>;
}
