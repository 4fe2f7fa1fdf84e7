//! Shared sync pipeline entrypoint used by the CLI and the daemon.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use sprintsync_clients::{upsert_with_retry, SheetSource, Store, TrackerApi, UpsertRequest};
use sprintsync_core::{CanonicalRow, Config, SyncMode, SyncState, TrackerConfig};

use crate::issue_sprints::{sync_issue_sprints, IssueSprintSummary};
use crate::issues::{upsert_normalized_issues, upsert_raw_issues, IssueUpsertSummary};
use crate::metrics::{compute_sprint_metrics, MetricsSummary};
use crate::outcome::{skip_missing_table, to_rows, StageOutcome};
use crate::scope_changes::{detect_scope_changes, ScopeChangeSummary};
use crate::sprints::{upsert_sheet_sprints, SprintUpsertSummary};
use crate::tracker::{
    sync_tracker_issues, sync_tracker_sprints, TrackerIssueSummary, TrackerSprintSummary,
};
use crate::SyncError;

const TRACKER_DISABLED: &str = "JIRA_SYNC_ENABLED=false";
const NO_TRACKER_CLIENT: &str = "tracker client not available";

/// Collaborators for one run. Built once by the caller and borrowed.
#[derive(Clone, Copy)]
pub struct SyncContext<'a> {
    pub config: &'a Config,
    pub store: &'a dyn Store,
    pub sheet: &'a dyn SheetSource,
    pub tracker: Option<&'a dyn TrackerApi>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncStateSummary {
    pub updated: bool,
}

/// Structured result of every stage of a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncReport {
    pub mode: SyncMode,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Data rows read from the sheet.
    pub sheet_rows: usize,
    /// Rows left after deduplication by key.
    pub unique_rows: usize,
    pub raw_issues: IssueUpsertSummary,
    pub normalized_issues: IssueUpsertSummary,
    pub sprints: StageOutcome<SprintUpsertSummary>,
    pub scope_changes: StageOutcome<ScopeChangeSummary>,
    pub issue_sprints: IssueSprintSummary,
    pub sprint_metrics: StageOutcome<MetricsSummary>,
    pub tracker_sprints: StageOutcome<TrackerSprintSummary>,
    pub tracker_issues: StageOutcome<TrackerIssueSummary>,
    pub sync_state: StageOutcome<SyncStateSummary>,
}

/// Keep one row per identity (`key`, else `issue_id`).
///
/// A later duplicate replaces the earlier row but keeps its position. Rows
/// with neither identifier are dropped.
pub fn dedupe_rows_by_key(rows: Vec<CanonicalRow>) -> Vec<CanonicalRow> {
    let mut out: Vec<CanonicalRow> = Vec::with_capacity(rows.len());
    let mut index: HashMap<String, usize> = HashMap::new();
    for row in rows {
        let Some(identity) = row.identity().map(str::to_owned) else {
            continue;
        };
        match index.get(&identity) {
            Some(&at) => out[at] = row,
            None => {
                index.insert(identity, out.len());
                out.push(row);
            }
        }
    }
    out
}

/// Run a full sync: both sync-state stamps are written.
pub async fn full_sync(ctx: SyncContext<'_>) -> Result<SyncReport, SyncError> {
    run(ctx, SyncMode::Full).await
}

/// Run an incremental sync: only `last_incremental_at` is written.
pub async fn incremental_sync(ctx: SyncContext<'_>) -> Result<SyncReport, SyncError> {
    run(ctx, SyncMode::Incremental).await
}

/// Run every stage in order and return the report.
///
/// Stages run one after another; the first hard failure aborts the run.
/// Stages that tolerate a missing table report a skip instead.
pub async fn run(ctx: SyncContext<'_>, mode: SyncMode) -> Result<SyncReport, SyncError> {
    let started_at = Utc::now();
    let tables = &ctx.config.tables;
    info!(%mode, "sync started");

    let csv = ctx.sheet.fetch_csv().await?;
    let loaded = sprintsync_sheet::load_rows(&csv)?;
    let sheet_rows = loaded.len();
    let rows = dedupe_rows_by_key(loaded);
    debug!(sheet_rows, unique_rows = rows.len(), "sheet rows loaded");

    let raw_issues = upsert_raw_issues(ctx.store, &tables.raw_issues, &rows).await?;
    let normalized_issues =
        upsert_normalized_issues(ctx.store, &tables.normalized_issues, &rows).await?;
    let sprints = upsert_sheet_sprints(ctx.store, &tables.sprints, &rows, started_at).await?;
    let scope_changes = detect_scope_changes(
        ctx.store,
        &tables.issue_sprints,
        &tables.scope_changes,
        &rows,
        started_at,
    )
    .await?;
    let issue_sprints =
        sync_issue_sprints(ctx.store, &tables.issue_sprints, &rows, started_at).await?;
    let sprint_metrics = compute_sprint_metrics(
        ctx.store,
        &tables.issue_sprints,
        &tables.sprint_metrics,
        &rows,
        started_at,
    )
    .await?;

    let tracker_sprints = tracker_sprints_stage(ctx, started_at).await?;
    let tracker_issues = tracker_issues_stage(ctx).await?;

    let finished_at = Utc::now();
    let sync_state = update_sync_state(ctx.store, &tables.sync_state, mode, finished_at).await?;

    let report = SyncReport {
        mode,
        started_at,
        finished_at,
        sheet_rows,
        unique_rows: rows.len(),
        raw_issues,
        normalized_issues,
        sprints,
        scope_changes,
        issue_sprints,
        sprint_metrics,
        tracker_sprints,
        tracker_issues,
        sync_state,
    };
    log_report(&report);
    Ok(report)
}

fn log_report(report: &SyncReport) {
    info!(
        mode = %report.mode,
        sheet_rows = report.sheet_rows,
        unique_rows = report.unique_rows,
        raw_upserted = report.raw_issues.upserted,
        normalized_upserted = report.normalized_issues.upserted,
        associations_upserted = report.issue_sprints.upserted,
        associations_removed = report.issue_sprints.marked_removed,
        sprints_skipped = report.sprints.is_skipped(),
        scope_changes_skipped = report.scope_changes.is_skipped(),
        metrics_skipped = report.sprint_metrics.is_skipped(),
        tracker_sprints_skipped = report.tracker_sprints.is_skipped(),
        tracker_issues_skipped = report.tracker_issues.is_skipped(),
        elapsed_ms = (report.finished_at - report.started_at).num_milliseconds(),
        "sync complete"
    );
    if let Ok(summary) = serde_json::to_string(report) {
        debug!(%summary, "sync report");
    }
}

/// Reason the tracker stage cannot run, if any.
pub fn tracker_skip_reason(tracker: &TrackerConfig, missing: &[&str]) -> Option<String> {
    if !tracker.enabled {
        return Some(TRACKER_DISABLED.to_owned());
    }
    if !missing.is_empty() {
        return Some(format!("missing {}", missing.join(", ")));
    }
    None
}

async fn tracker_sprints_stage(
    ctx: SyncContext<'_>,
    now: DateTime<Utc>,
) -> Result<StageOutcome<TrackerSprintSummary>, SyncError> {
    let tracker = &ctx.config.tracker;
    if let Some(reason) = tracker_skip_reason(tracker, &tracker.missing_for_sprints()) {
        info!(%reason, "tracker sprint sync skipped");
        return Ok(StageOutcome::skipped(reason));
    }
    let (Some(api), Some(board_id)) = (ctx.tracker, tracker.board_id.as_deref()) else {
        return Ok(StageOutcome::skipped(NO_TRACKER_CLIENT));
    };
    sync_tracker_sprints(api, ctx.store, &ctx.config.tables.sprints, board_id, now).await
}

async fn tracker_issues_stage(
    ctx: SyncContext<'_>,
) -> Result<StageOutcome<TrackerIssueSummary>, SyncError> {
    let tracker = &ctx.config.tracker;
    if let Some(reason) = tracker_skip_reason(tracker, &tracker.missing_for_issues()) {
        info!(%reason, "tracker issue sync skipped");
        return Ok(StageOutcome::skipped(reason));
    }
    let (Some(api), Some(jql)) = (ctx.tracker, tracker.jql.as_deref()) else {
        return Ok(StageOutcome::skipped(NO_TRACKER_CLIENT));
    };
    sync_tracker_issues(api, ctx.store, &ctx.config.tables.normalized_issues, jql).await
}

/// Stamp the singleton sync-state row for a run that finished at `at`.
pub async fn update_sync_state(
    store: &dyn Store,
    table: &str,
    mode: SyncMode,
    at: DateTime<Utc>,
) -> Result<StageOutcome<SyncStateSummary>, SyncError> {
    crate::error::require_table(table, "sync state table")?;
    let payload = to_rows(&[SyncState::for_run(mode, at)])?;
    let outcome = upsert_with_retry(store, UpsertRequest::new(table, &payload, "id"))
        .await
        .map(|_| SyncStateSummary { updated: true });
    skip_missing_table(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(key: Option<&str>, id: Option<&str>, status: &str) -> CanonicalRow {
        let mut row = CanonicalRow::default();
        if let Some(key) = key {
            row.set("key", key);
        }
        if let Some(id) = id {
            row.set("issue_id", id);
        }
        row.set("status", status);
        row
    }

    #[test]
    fn dedupe_keeps_last_row_at_first_position() {
        let rows = vec![
            row(Some("A-1"), None, "To Do"),
            row(Some("A-2"), None, "To Do"),
            row(None, Some("900"), "To Do"),
            row(None, None, "orphan"),
            row(Some("A-1"), None, "Done"),
        ];
        let deduped = dedupe_rows_by_key(rows);
        let keys: Vec<_> = deduped.iter().map(|r| r.identity().unwrap_or("-")).collect();
        assert_eq!(keys, ["A-1", "A-2", "900"]);
        assert_eq!(deduped[0].status.as_deref(), Some("Done"));
    }

    #[test]
    fn tracker_skip_reasons() {
        let mut tracker = TrackerConfig::default();
        assert_eq!(
            tracker_skip_reason(&tracker, &tracker.missing_for_sprints()).as_deref(),
            Some("JIRA_SYNC_ENABLED=false")
        );
        tracker.enabled = true;
        tracker.base_url = Some("https://tracker.example".into());
        assert_eq!(
            tracker_skip_reason(&tracker, &tracker.missing_for_sprints()).as_deref(),
            Some("missing JIRA_API_TOKEN, JIRA_BOARD_ID")
        );
        tracker.api_token = Some("t".into());
        tracker.board_id = Some("7".into());
        assert_eq!(tracker_skip_reason(&tracker, &tracker.missing_for_sprints()), None);
    }
}
