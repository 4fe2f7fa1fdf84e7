//! Raw and normalized issue upserts.

use serde::Serialize;
use tracing::{debug, warn};

use sprintsync_clients::{upsert_with_retry, Store, UpsertRequest};
use sprintsync_core::{CanonicalRow, NormalizedIssue, RawIssue};

use crate::error::require_table;
use crate::outcome::to_rows;
use crate::SyncError;

/// Counts reported by an issue upsert stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IssueUpsertSummary {
    pub upserted: usize,
    /// Rows dropped because their conflict key would be null.
    pub without_key: usize,
}

pub fn raw_issue(row: &CanonicalRow) -> Option<RawIssue> {
    Some(RawIssue {
        key: row.key.clone()?,
        issue_id: row.issue_id.clone(),
        payload: row.to_payload(),
    })
}

pub fn normalize_issue(row: &CanonicalRow) -> Option<NormalizedIssue> {
    Some(NormalizedIssue {
        key: row.key.clone()?,
        issue_id: row.issue_id.clone(),
        summary: row.summary.clone(),
        project: row.project.clone(),
        assignee: row.assignee.clone(),
        priority: row.priority.clone(),
        status: row.status.clone(),
        sprint: row.sprint.clone(),
        story_points: row.story_point_estimate.clone(),
        story_points_qa: row.story_point_estimate_qa.clone(),
        story_points_dev: row.story_point_estimate_dev.clone(),
        resolved: row.resolved.clone(),
        resolution: row.resolution.clone(),
        created_at: row.created.clone(),
        parent_key: row.parent.clone(),
        payload: row.to_payload(),
    })
}

/// Upsert every keyed row verbatim into the raw-issues table on `key`.
pub async fn upsert_raw_issues(
    store: &dyn Store,
    table: &str,
    rows: &[CanonicalRow],
) -> Result<IssueUpsertSummary, SyncError> {
    require_table(table, "raw issues table")?;
    let records: Vec<RawIssue> = rows.iter().filter_map(raw_issue).collect();
    upsert_keyed(store, table, rows.len(), &records).await
}

/// Map keyed rows to the normalized schema and upsert them on `key`.
pub async fn upsert_normalized_issues(
    store: &dyn Store,
    table: &str,
    rows: &[CanonicalRow],
) -> Result<IssueUpsertSummary, SyncError> {
    require_table(table, "normalized issues table")?;
    let records: Vec<NormalizedIssue> = rows.iter().filter_map(normalize_issue).collect();
    upsert_keyed(store, table, rows.len(), &records).await
}

async fn upsert_keyed<T: Serialize>(
    store: &dyn Store,
    table: &str,
    total: usize,
    records: &[T],
) -> Result<IssueUpsertSummary, SyncError> {
    let without_key = total - records.len();
    if without_key > 0 {
        warn!(table, without_key, "skipping rows without an issue key");
    }
    let payload = to_rows(records)?;
    let outcome = upsert_with_retry(store, UpsertRequest::new(table, &payload, "key")).await?;
    debug!(table, upserted = outcome.count, "issues upserted");
    Ok(IssueUpsertSummary {
        upserted: outcome.count,
        without_key,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use sprintsync_clients::MemoryStore;

    fn row(pairs: &[(&str, &str)]) -> CanonicalRow {
        let mut row = CanonicalRow::default();
        for (field, value) in pairs {
            row.set(field, *value);
        }
        row
    }

    #[test]
    fn normalized_schema_renames_fields() {
        let issue = normalize_issue(&row(&[
            ("key", "A-1"),
            ("story_point_estimate", "5"),
            ("story_point_estimate_qa", "2"),
            ("created", "2024-01-02"),
            ("parent", "A-0"),
        ]))
        .expect("keyed");
        assert_eq!(issue.story_points.as_deref(), Some("5"));
        assert_eq!(issue.story_points_qa.as_deref(), Some("2"));
        assert_eq!(issue.created_at.as_deref(), Some("2024-01-02"));
        assert_eq!(issue.parent_key.as_deref(), Some("A-0"));
        assert_eq!(issue.payload["key"], "A-1");
    }

    #[test]
    fn keyless_rows_do_not_normalize() {
        assert!(normalize_issue(&row(&[("issue_id", "100")])).is_none());
    }

    #[tokio::test]
    async fn keyless_rows_are_counted_not_written() {
        let store = MemoryStore::new();
        let rows = vec![row(&[("key", "A-1")]), row(&[("issue_id", "9")])];
        let summary = upsert_raw_issues(&store, "raw", &rows).await.expect("upsert");
        assert_eq!(
            summary,
            IssueUpsertSummary {
                upserted: 1,
                without_key: 1
            }
        );
        assert_eq!(store.rows("raw").await.len(), 1);
    }

    #[tokio::test]
    async fn missing_raw_table_is_fatal() {
        let store = MemoryStore::with_tables(["other"]);
        let rows = vec![row(&[("key", "A-1")])];
        let err = upsert_normalized_issues(&store, "issues_normalized", &rows)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Store(ref e) if e.is_missing_table()));
    }
}
