//! Per-sprint rollups, recomputed from scratch on every run.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use sprintsync_clients::{upsert_with_retry, Filter, Select, Store, StoreError, UpsertRequest};
use sprintsync_core::{parse_number, CanonicalRow, SprintMetrics, SprintMetricsSnapshot, SprintName};

use crate::error::require_table;
use crate::outcome::{missing_table, skip_missing_table, to_rows, StageOutcome};
use crate::sprint_names::row_sprints;
use crate::SyncError;

const DONE_STATUSES: &[&str] = &["done", "resolved", "closed"];
const UNKNOWN_STATUS: &str = "Unknown";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSummary {
    pub upserted: usize,
}

/// A row is done once resolved or when its status says so.
pub fn is_done(row: &CanonicalRow) -> bool {
    if row.resolved.is_some() {
        return true;
    }
    row.status
        .as_deref()
        .map(|s| DONE_STATUSES.iter().any(|d| s.trim().eq_ignore_ascii_case(d)))
        .unwrap_or(false)
}

/// Fold current rows and removed associations into per-sprint metrics.
pub fn aggregate_metrics(
    rows: &[CanonicalRow],
    removed: &[Value],
) -> BTreeMap<SprintName, SprintMetrics> {
    let mut by_sprint: BTreeMap<SprintName, SprintMetrics> = BTreeMap::new();

    for row in rows {
        let points = row.story_points().unwrap_or(0.0);
        let done = is_done(row);
        let status = row.status.clone().unwrap_or_else(|| UNKNOWN_STATUS.to_owned());
        for sprint in row_sprints(row) {
            let metrics = by_sprint.entry(sprint).or_default();
            metrics.issues_total += 1;
            metrics.sp_total += points;
            if done {
                metrics.issues_done += 1;
                metrics.sp_done += points;
            }
            *metrics.status_counts.entry(status.clone()).or_default() += 1;
        }
    }

    for association in removed {
        let Some(sprint) = association.get("sprint_name").and_then(Value::as_str) else {
            continue;
        };
        let points = match association.get("story_points_at_sync") {
            Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
            Some(Value::String(s)) => parse_number(s).unwrap_or(0.0),
            _ => 0.0,
        };
        let metrics = by_sprint.entry(SprintName::from(sprint)).or_default();
        metrics.removed_count += 1;
        metrics.removed_sp += points;
    }

    by_sprint
}

/// Recompute every sprint's metrics and replace the stored snapshots.
pub async fn compute_sprint_metrics(
    store: &dyn Store,
    associations_table: &str,
    metrics_table: &str,
    rows: &[CanonicalRow],
    now: DateTime<Utc>,
) -> Result<StageOutcome<MetricsSummary>, SyncError> {
    require_table(associations_table, "issue sprints table")?;
    require_table(metrics_table, "sprint metrics table")?;

    let query = Select::columns(&["sprint_name", "story_points_at_sync"])
        .filter(Filter::eq("is_removed", true));
    let removed = match store.select(associations_table, &query).await {
        Ok(removed) => removed,
        Err(StoreError::MissingTable { table }) => return Ok(missing_table(&table)),
        Err(err) => return Err(err.into()),
    };

    let snapshots: Vec<SprintMetricsSnapshot> = aggregate_metrics(rows, &removed)
        .into_iter()
        .map(|(sprint_name, metrics)| SprintMetricsSnapshot {
            sprint_name,
            metrics,
            updated_at: now,
        })
        .collect();
    if snapshots.is_empty() {
        return Ok(StageOutcome::Completed(MetricsSummary::default()));
    }

    let payload = to_rows(&snapshots)?;
    let outcome = upsert_with_retry(store, UpsertRequest::new(metrics_table, &payload, "sprint_name"))
        .await
        .map(|o| MetricsSummary { upserted: o.count });
    skip_missing_table(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;
    use serde_json::json;
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

    #[rstest]
    #[case(&[("status", "Done")], true)]
    #[case(&[("status", " CLOSED ")], true)]
    #[case(&[("status", "resolved")], true)]
    #[case(&[("status", "In Review"), ("resolved", "2024-01-01")], true)]
    #[case(&[("status", "Done-ish")], false)]
    #[case(&[], false)]
    fn done_detection(#[case] pairs: &[(&str, &str)], #[case] expected: bool) {
        assert_eq!(is_done(&row(pairs)), expected);
    }

    #[test]
    fn rows_and_removed_associations_are_folded() {
        let rows = vec![
            row(&[("key", "A-1"), ("sprint", "S1"), ("status", "Done"), ("story_point_estimate", "3")]),
            row(&[("key", "A-2"), ("sprint", "S1, S2, S1"), ("story_points", "n/a"), ("story_point_estimate_qa", "2")]),
            row(&[("key", "A-3"), ("sprint", "S2"), ("status", "To Do")]),
        ];
        let removed = vec![
            json!({"sprint_name": "S1", "story_points_at_sync": 5}),
            json!({"sprint_name": "S9", "story_points_at_sync": "1.5"}),
            json!({"sprint_name": "S9", "story_points_at_sync": null}),
        ];

        let metrics = aggregate_metrics(&rows, &removed);

        let s1 = &metrics[&SprintName::from("S1")];
        assert_eq!((s1.issues_total, s1.issues_done), (2, 1));
        assert_eq!((s1.sp_total, s1.sp_done), (5.0, 3.0));
        assert_eq!(s1.status_counts["Unknown"], 1);
        assert_eq!((s1.removed_count, s1.removed_sp), (1, 5.0));

        let s2 = &metrics[&SprintName::from("S2")];
        assert_eq!(s2.issues_total, 2);
        assert_eq!(s2.status_counts["To Do"], 1);

        let s9 = &metrics[&SprintName::from("S9")];
        assert_eq!(s9.issues_total, 0);
        assert_eq!((s9.removed_count, s9.removed_sp), (2, 1.5));
    }

    #[tokio::test]
    async fn snapshots_replace_previous_values() {
        let store = MemoryStore::new();
        store
            .seed("issue_sprints", vec![json!({"sprint_name": "S1", "story_points_at_sync": 2, "is_removed": true})])
            .await
            .expect("seed");
        let rows = vec![row(&[("key", "A-1"), ("sprint", "S1"), ("story_point_estimate", "3")])];

        for _ in 0..2 {
            let outcome = compute_sprint_metrics(&store, "issue_sprints", "sprint_metrics", &rows, now())
                .await
                .expect("metrics");
            assert_eq!(outcome, StageOutcome::Completed(MetricsSummary { upserted: 1 }));
        }

        let stored = store.rows("sprint_metrics").await;
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0]["metrics"]["issues_total"], 1);
        assert_eq!(stored[0]["metrics"]["removed_sp"], 2.0);
    }

    #[tokio::test]
    async fn missing_metrics_table_is_skipped() {
        let store = MemoryStore::with_tables(["issue_sprints"]);
        let rows = vec![row(&[("key", "A-1"), ("sprint", "S1")])];
        let outcome = compute_sprint_metrics(&store, "issue_sprints", "sprint_metrics", &rows, now())
            .await
            .expect("soft skip");
        assert!(outcome.is_skipped());
    }
}
