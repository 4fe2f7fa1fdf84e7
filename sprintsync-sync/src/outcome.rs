//! Stage results that may be soft-skipped.

use serde::Serialize;
use serde_json::Value;

use sprintsync_clients::StoreError;

use crate::SyncError;

/// Result of a stage that is allowed to not run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StageOutcome<T> {
    Completed(T),
    Skipped { reason: String },
}

impl<T> StageOutcome<T> {
    pub fn skipped(reason: impl Into<String>) -> Self {
        StageOutcome::Skipped {
            reason: reason.into(),
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, StageOutcome::Skipped { .. })
    }

    pub fn completed(&self) -> Option<&T> {
        match self {
            StageOutcome::Completed(value) => Some(value),
            StageOutcome::Skipped { .. } => None,
        }
    }
}

/// Downgrade a missing-table store error to a skip; other errors propagate.
pub(crate) fn skip_missing_table<T>(
    result: Result<T, StoreError>,
) -> Result<StageOutcome<T>, SyncError> {
    match result {
        Ok(value) => Ok(StageOutcome::Completed(value)),
        Err(StoreError::MissingTable { table }) => Ok(missing_table(&table)),
        Err(err) => Err(err.into()),
    }
}

pub(crate) fn missing_table<T>(table: &str) -> StageOutcome<T> {
    tracing::warn!(table, "table missing, skipping stage");
    StageOutcome::skipped(format!("missing table {table}"))
}

/// Serialize domain records into store rows.
pub(crate) fn to_rows<T: Serialize>(items: &[T]) -> Result<Vec<Value>, SyncError> {
    items
        .iter()
        .map(|item| serde_json::to_value(item).map_err(SyncError::from))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Serialize, PartialEq)]
    struct Count {
        upserted: usize,
    }

    #[test]
    fn completed_flattens_payload_next_to_status() {
        let outcome = StageOutcome::Completed(Count { upserted: 3 });
        assert_eq!(
            serde_json::to_value(&outcome).expect("json"),
            json!({"status": "completed", "upserted": 3})
        );
    }

    #[test]
    fn missing_table_becomes_skip() {
        let result: Result<Count, StoreError> = Err(StoreError::MissingTable {
            table: "sprints".into(),
        });
        let outcome = skip_missing_table(result).expect("downgraded");
        assert_eq!(outcome, StageOutcome::skipped("missing table sprints"));
    }

    #[test]
    fn other_errors_propagate() {
        let result: Result<Count, StoreError> = Err(StoreError::InvalidArgument("x".into()));
        assert!(skip_missing_table(result).is_err());
    }
}
