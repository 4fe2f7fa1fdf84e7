//! Issue ↔ sprint association sync.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use sprintsync_clients::{upsert_with_retry, Filter, Select, Store, UpsertRequest};
use sprintsync_core::{CanonicalRow, IssueKey, IssueSprintAssociation, SprintName, StoredAssociation};

use crate::error::require_table;
use crate::outcome::to_rows;
use crate::sprint_names::row_sprints;
use crate::SyncError;

pub(crate) type Pair = (IssueKey, SprintName);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IssueSprintSummary {
    pub upserted: usize,
    pub marked_removed: usize,
}

/// Current associations, one per (issue, sprint) pair. A later row for the
/// same pair replaces the earlier one in place.
pub fn build_associations(
    rows: &[CanonicalRow],
    now: DateTime<Utc>,
) -> Vec<IssueSprintAssociation> {
    let mut out: Vec<IssueSprintAssociation> = Vec::new();
    let mut index: HashMap<Pair, usize> = HashMap::new();

    for row in rows {
        let Some(key) = row.key.as_deref() else {
            continue;
        };
        for sprint in row_sprints(row) {
            let association = IssueSprintAssociation {
                issue_key: IssueKey::from(key),
                sprint_name: sprint,
                status_at_sync: row.status.clone(),
                story_points_at_sync: row.story_points(),
                is_removed: false,
                removed_at: None,
                updated_at: now,
            };
            let pair = (association.issue_key.clone(), association.sprint_name.clone());
            match index.get(&pair) {
                Some(&at) => out[at] = association,
                None => {
                    index.insert(pair, out.len());
                    out.push(association);
                }
            }
        }
    }
    out
}

/// Distinct issue keys of `rows`, in order.
pub(crate) fn issue_keys(rows: &[CanonicalRow]) -> Vec<String> {
    let mut seen = HashSet::new();
    rows.iter()
        .filter_map(|row| row.key.clone())
        .filter(|key| seen.insert(key.clone()))
        .collect()
}

/// Stored associations for `keys`, decoded.
pub(crate) async fn fetch_associations(
    store: &dyn Store,
    table: &str,
    columns: &[&str],
    keys: &[String],
) -> Result<Vec<StoredAssociation>, SyncError> {
    if keys.is_empty() {
        return Ok(Vec::new());
    }
    let query = Select::columns(columns).filter(Filter::in_list("issue_key", keys.iter().cloned()));
    let rows = store.select(table, &query).await?;
    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        out.push(serde_json::from_value::<StoredAssociation>(row)?);
    }
    Ok(out)
}

/// Upsert this run's associations and flag stored ones that disappeared.
///
/// Only associations whose issue appears in `rows` are considered; an issue
/// that vanished from the sheet keeps its associations as they were.
pub async fn sync_issue_sprints(
    store: &dyn Store,
    table: &str,
    rows: &[CanonicalRow],
    now: DateTime<Utc>,
) -> Result<IssueSprintSummary, SyncError> {
    require_table(table, "issue sprints table")?;
    let keys = issue_keys(rows);
    if keys.is_empty() {
        return Ok(IssueSprintSummary::default());
    }

    let existing = fetch_associations(
        store,
        table,
        &["id", "issue_key", "sprint_name", "is_removed"],
        &keys,
    )
    .await?;

    let current = build_associations(rows, now);
    let payload = to_rows(&current)?;
    let upserted = upsert_with_retry(
        store,
        UpsertRequest::new(table, &payload, "issue_key,sprint_name"),
    )
    .await?
    .count;

    let live: HashSet<Pair> = current
        .iter()
        .map(|a| (a.issue_key.clone(), a.sprint_name.clone()))
        .collect();
    let mut ids: Vec<Value> = Vec::new();
    for stale in existing
        .iter()
        .filter(|a| !a.is_removed)
        .filter(|a| !live.contains(&(a.issue_key.clone(), a.sprint_name.clone())))
    {
        match &stale.id {
            Some(id) if !id.is_null() => ids.push(id.clone()),
            _ => warn!(
                issue_key = %stale.issue_key,
                sprint_name = %stale.sprint_name,
                "stored association has no id; cannot mark removed"
            ),
        }
    }

    let marked_removed = if ids.is_empty() {
        0
    } else {
        let patch = json!({"is_removed": true, "removed_at": now, "updated_at": now});
        store.update(table, &Filter::In("id".to_owned(), ids), &patch).await?
    };

    debug!(table, upserted, marked_removed, "issue sprints synced");
    Ok(IssueSprintSummary {
        upserted,
        marked_removed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use sprintsync_clients::MemoryStore;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn row(pairs: &[(&str, &str)]) -> CanonicalRow {
        let mut row = CanonicalRow::default();
        for (field, value) in pairs {
            row.set(field, *value);
        }
        row
    }

    #[test]
    fn associations_fan_out_over_sprints() {
        let rows = vec![row(&[
            ("key", "A-1"),
            ("sprint", "S1; S2; S1"),
            ("status", "In Progress"),
            ("story_points", "x"),
            ("story_point_estimate_dev", "3"),
        ])];
        let associations = build_associations(&rows, now());
        assert_eq!(associations.len(), 2);
        assert_eq!(associations[1].sprint_name, SprintName::from("S2"));
        assert_eq!(associations[0].story_points_at_sync, Some(3.0));
        assert_eq!(associations[0].status_at_sync.as_deref(), Some("In Progress"));
    }

    #[tokio::test]
    async fn unmatched_association_is_marked_removed() {
        let store = MemoryStore::new();
        store
            .seed(
                "issue_sprints",
                vec![json!({"issue_key": "ISSUE-1", "sprint_name": "S3", "is_removed": false})],
            )
            .await
            .expect("seed");
        let rows = vec![
            row(&[("key", "ISSUE-1"), ("sprint", "S1"), ("status", "To Do")]),
            row(&[("key", "ISSUE-2"), ("sprint", "S2"), ("status", "Done")]),
        ];

        let summary = sync_issue_sprints(&store, "issue_sprints", &rows, now())
            .await
            .expect("sync");

        assert_eq!(
            summary,
            IssueSprintSummary {
                upserted: 2,
                marked_removed: 1
            }
        );
        let stored = store.rows("issue_sprints").await;
        let s3 = stored
            .iter()
            .find(|r| r["sprint_name"] == "S3")
            .expect("S3 kept");
        assert_eq!(s3["is_removed"], true);
        assert!(!s3["removed_at"].is_null());
    }

    #[tokio::test]
    async fn readded_association_is_revived() {
        let store = MemoryStore::new();
        store
            .seed(
                "issue_sprints",
                vec![json!({
                    "issue_key": "A-1",
                    "sprint_name": "S1",
                    "is_removed": true,
                    "removed_at": "2024-01-01T00:00:00Z"
                })],
            )
            .await
            .expect("seed");
        let rows = vec![row(&[("key", "A-1"), ("sprint", "S1")])];

        let summary = sync_issue_sprints(&store, "issue_sprints", &rows, now())
            .await
            .expect("sync");

        assert_eq!(summary.marked_removed, 0);
        let stored = store.rows("issue_sprints").await;
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0]["is_removed"], false);
        assert!(stored[0]["removed_at"].is_null());
    }

    #[tokio::test]
    async fn already_removed_rows_are_not_marked_again() {
        let store = MemoryStore::new();
        store
            .seed(
                "issue_sprints",
                vec![json!({"issue_key": "A-1", "sprint_name": "S0", "is_removed": true})],
            )
            .await
            .expect("seed");
        let rows = vec![row(&[("key", "A-1"), ("sprint", "S1")])];
        let summary = sync_issue_sprints(&store, "issue_sprints", &rows, now())
            .await
            .expect("sync");
        assert_eq!(summary.marked_removed, 0);
    }
}
