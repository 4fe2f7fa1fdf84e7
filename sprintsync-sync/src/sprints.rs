//! Sprint identity rows derived from sheet rows.
//!
//! Duplicate sprint names merge by filling only fields that are still unset,
//! so the first row to mention a date or state wins.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use sprintsync_clients::{upsert_with_retry, Store, StoreError, UpsertRequest};
use sprintsync_core::{CanonicalRow, SprintName, SprintRecord, SprintSource};

use crate::error::require_table;
use crate::outcome::{skip_missing_table, to_rows, StageOutcome};
use crate::sprint_names::row_sprint_identities;
use crate::SyncError;

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d/%b/%y"];
const DATE_TIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
    "%d/%b/%y %I:%M %p",
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SprintUpsertSummary {
    pub upserted: usize,
}

/// Parse a loosely formatted date or timestamp down to its calendar day.
/// Anything unparseable is treated as unset.
pub fn normalize_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Some(at.with_timezone(&Utc).date_naive());
    }
    if let Ok(at) = DateTime::parse_from_rfc2822(raw) {
        return Some(at.with_timezone(&Utc).date_naive());
    }
    // Tracker timestamps look like 2024-03-01T10:00:00.000+0000.
    if let Ok(at) = DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f%z") {
        return Some(at.with_timezone(&Utc).date_naive());
    }
    DATE_TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|at| at.date())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
        })
}

fn date_of(value: Option<&str>) -> Option<NaiveDate> {
    value.and_then(normalize_date)
}

/// One record per distinct sprint name, in first-seen order.
pub fn build_sprint_rows(rows: &[CanonicalRow], now: DateTime<Utc>) -> Vec<SprintRecord> {
    let mut order: Vec<SprintName> = Vec::new();
    let mut by_name: BTreeMap<SprintName, SprintRecord> = BTreeMap::new();

    for row in rows {
        let names = row_sprint_identities(row);
        if names.is_empty() {
            continue;
        }
        let start = date_of(row.sprint_start_date.as_deref());
        let end = date_of(row.sprint_end_date.as_deref().or(row.end_date.as_deref()));
        let complete = date_of(row.sprint_complete_date.as_deref());
        let state = row.sprint_state.as_deref().or(row.get("state"));

        for name in names {
            let record = by_name.entry(name.clone()).or_insert_with(|| {
                order.push(name.clone());
                SprintRecord::new(name, SprintSource::Sheet, now)
            });
            record.start_date = record.start_date.or(start);
            record.end_date = record.end_date.or(end);
            record.complete_date = record.complete_date.or(complete);
            if record.state.is_none() {
                record.state = state.map(str::to_owned);
            }
        }
    }

    order
        .into_iter()
        .filter_map(|name| by_name.remove(&name))
        .collect()
}

/// Upsert sprint records on `name`, soft-skipping a missing table.
///
/// Records are sent in groups sharing the same set of present columns, so a
/// bulk request never nulls out a column another record omitted.
pub async fn upsert_sprint_records(
    store: &dyn Store,
    table: &str,
    records: &[SprintRecord],
) -> Result<StageOutcome<SprintUpsertSummary>, SyncError> {
    require_table(table, "sprints table")?;
    let rows = to_rows(records)?;
    skip_missing_table(upsert_grouped(store, table, rows).await)
}

async fn upsert_grouped(
    store: &dyn Store,
    table: &str,
    rows: Vec<Value>,
) -> Result<SprintUpsertSummary, StoreError> {
    let mut groups: Vec<(Vec<String>, Vec<Value>)> = Vec::new();
    for row in rows {
        let columns: Vec<String> = row
            .as_object()
            .map(|o| o.keys().cloned().collect())
            .unwrap_or_default();
        match groups.iter_mut().find(|(c, _)| *c == columns) {
            Some((_, group)) => group.push(row),
            None => groups.push((columns, vec![row])),
        }
    }

    let mut upserted = 0;
    for (_, group) in &groups {
        upserted += upsert_with_retry(store, UpsertRequest::new(table, group, "name"))
            .await?
            .count;
    }
    Ok(SprintUpsertSummary { upserted })
}

/// Derive sprint records from sheet rows and upsert them.
pub async fn upsert_sheet_sprints(
    store: &dyn Store,
    table: &str,
    rows: &[CanonicalRow],
    now: DateTime<Utc>,
) -> Result<StageOutcome<SprintUpsertSummary>, SyncError> {
    let records = build_sprint_rows(rows, now);
    if records.is_empty() {
        require_table(table, "sprints table")?;
        return Ok(StageOutcome::Completed(SprintUpsertSummary::default()));
    }
    upsert_sprint_records(store, table, &records).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;
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

    fn ymd(y: i32, m: u32, d: u32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(y, m, d)
    }

    #[rstest]
    #[case("2024-01-05", ymd(2024, 1, 5))]
    #[case("2024-01-05T23:30:00Z", ymd(2024, 1, 5))]
    #[case("2024-01-05T10:00:00.000+0000", ymd(2024, 1, 5))]
    #[case("01/05/2024", ymd(2024, 1, 5))]
    #[case("05/Jan/24 9:15 AM", ymd(2024, 1, 5))]
    #[case("not a date", None)]
    #[case("  ", None)]
    fn dates_are_normalized(#[case] input: &str, #[case] expected: Option<NaiveDate>) {
        assert_eq!(normalize_date(input), expected);
    }

    #[test]
    fn duplicate_names_fill_unset_fields_only() {
        let rows = vec![
            row(&[("sprint", "S1"), ("sprint_start_date", "2024-01-01")]),
            row(&[
                ("sprint", "S1"),
                ("sprint_start_date", "2024-02-01"),
                ("sprint_end_date", "2024-01-14"),
            ]),
        ];
        let records = build_sprint_rows(&rows, now());
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].start_date, ymd(2024, 1, 1));
        assert_eq!(records[0].end_date, ymd(2024, 1, 14));
        assert_eq!(records[0].source, SprintSource::Sheet);
    }

    #[test]
    fn end_date_falls_back_and_multi_sprint_rows_fan_out() {
        let rows = vec![row(&[("sprint", "[S1, S2]"), ("end_date", "2024-02-02")])];
        let records = build_sprint_rows(&rows, now());
        let names: Vec<_> = records.iter().map(|r| r.name.0.as_str()).collect();
        assert_eq!(names, ["S1", "S2"]);
        assert!(records.iter().all(|r| r.end_date == ymd(2024, 2, 2)));
    }

    #[tokio::test]
    async fn later_sync_without_dates_keeps_stored_dates() {
        let store = MemoryStore::new();
        let first = vec![row(&[("sprint", "S1"), ("sprint_start_date", "2024-01-01")])];
        upsert_sheet_sprints(&store, "sprints", &first, now()).await.expect("first");
        let second = vec![row(&[("sprint", "S1")]), row(&[("sprint", "S2"), ("sprint_state", "active")])];
        let outcome = upsert_sheet_sprints(&store, "sprints", &second, now())
            .await
            .expect("second");

        assert_eq!(outcome, StageOutcome::Completed(SprintUpsertSummary { upserted: 2 }));
        let stored = store.rows("sprints").await;
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0]["start_date"], "2024-01-01");
        assert_eq!(stored[1]["state"], "active");
    }

    #[tokio::test]
    async fn missing_table_is_skipped() {
        let store = MemoryStore::with_tables(["other"]);
        let rows = vec![row(&[("sprint", "S1")])];
        let outcome = upsert_sheet_sprints(&store, "sprints", &rows, now())
            .await
            .expect("soft skip");
        assert_eq!(outcome, StageOutcome::skipped("missing table sprints"));
    }
}
