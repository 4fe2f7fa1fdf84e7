//! Header → canonical field mapping.
//!
//! Two tables drive the mapping:
//!
//! - [`DIRECT_COLUMNS`]: one exact column name per canonical field. The first
//!   column carrying that name wins.
//! - [`VARIANT_GROUPS`]: a canonical field fed by several spellings (and
//!   sometimes repeated columns). Candidates are tried in declared order,
//!   and every column with a matching name is tried in sheet order; the
//!   first non-empty value wins.
//!
//! Columns not named in either table are dropped.

use std::collections::HashMap;

use sprintsync_core::CanonicalRow;

/// Placeholder the export writes for fields absent from an issue.
pub const NO_FIELD_SENTINEL: &str = "[no field found]";

/// Exact column name → canonical field.
pub const DIRECT_COLUMNS: &[(&str, &str)] = &[
    ("Issue Type", "issue_type"),
    ("Key", "key"),
    ("Summary", "summary"),
    ("Epic Name", "epic_name"),
    ("Project", "project"),
    ("Project.name", "project_name"),
    ("Assignee", "assignee"),
    ("Priority", "priority"),
    ("Status", "status"),
    ("Story point estimate", "story_point_estimate"),
    ("Sprint", "sprint"),
    ("Sprint.name", "sprint_name"),
    ("Sprint.startDate", "sprint_start_date"),
    ("Sprint.endDate", "sprint_end_date"),
    ("Sprint.completeDate", "sprint_complete_date"),
    ("Sprint.state", "sprint_state"),
    ("PO Approved", "po_approved"),
    ("Actual end", "actual_end"),
    ("Resolved", "resolved"),
    ("Product Approved ", "product_approved"),
    ("Product Approver", "product_approver"),
    ("Comments", "comments"),
    ("Components", "components"),
    ("Contributors.accountId", "contributors_account_id"),
    ("Contributors.accountType", "contributors_account_type"),
    ("Contributors.displayName", "contributors_display_name"),
    ("Created", "created"),
    ("Creator.accountId", "creator_account_id"),
    ("Creator.displayName", "creator_display_name"),
    ("Description", "description"),
    ("Environment", "environment"),
    ("End Date", "end_date"),
    ("Issue ID", "issue_id"),
    ("parent", "parent"),
    ("Parent Link", "parent_link"),
    ("PR for QA", "pr_for_qa"),
    ("PR for Staging", "pr_for_staging"),
    ("Project ID", "project_id"),
    ("QA Approved", "qa_approved"),
    ("Release Notes Description", "release_notes_description"),
    ("Resolution", "resolution"),
    ("Story Points", "story_points"),
];

/// Canonical field → candidate column names in priority order.
pub const VARIANT_GROUPS: &[(&str, &[&str])] = &[
    (
        "story_point_estimate_qa",
        &[
            "Story Point estimate (QA)",
            "Story Point estimate  (QA)",
            "Story point estimate (QA)",
        ],
    ),
    (
        "story_point_estimate_dev",
        &["Story point estimate (DEV)", "Story point estimate  (DEV)"],
    ),
    ("start_date", &["Start date", "Start Date "]),
];

/// `true` for values that must never reach a canonical row.
pub fn is_empty_value(value: &str) -> bool {
    let text = value.trim();
    text.is_empty() || text == NO_FIELD_SENTINEL
}

/// Column positions by exact header name, in sheet order.
struct HeaderIndex<'a> {
    positions: HashMap<&'a str, Vec<usize>>,
}

impl<'a> HeaderIndex<'a> {
    fn new(header: &'a [String]) -> Self {
        let mut positions: HashMap<&str, Vec<usize>> = HashMap::new();
        for (idx, name) in header.iter().enumerate() {
            positions.entry(name.as_str()).or_default().push(idx);
        }
        Self { positions }
    }

    fn first(&self, name: &str) -> Option<usize> {
        self.positions.get(name).and_then(|p| p.first().copied())
    }

    fn all(&self, name: &str) -> &[usize] {
        self.positions.get(name).map(Vec::as_slice).unwrap_or(&[])
    }
}

fn cell(row: &[String], idx: usize) -> Option<&str> {
    row.get(idx)
        .map(String::as_str)
        .filter(|v| !is_empty_value(v))
        .map(str::trim)
}

/// Map data rows to canonical rows using `header` for column lookup.
pub fn map_rows(header: &[String], rows: &[Vec<String>]) -> Vec<CanonicalRow> {
    let index = HeaderIndex::new(header);
    rows.iter().map(|row| map_row(&index, row)).collect()
}

fn map_row(index: &HeaderIndex<'_>, row: &[String]) -> CanonicalRow {
    let mut mapped = CanonicalRow::default();

    for (column, field) in DIRECT_COLUMNS {
        if let Some(value) = index.first(column).and_then(|idx| cell(row, idx)) {
            mapped.set(field, value);
        }
    }

    for (field, candidates) in VARIANT_GROUPS {
        let value = candidates
            .iter()
            .flat_map(|name| index.all(name))
            .find_map(|idx| cell(row, *idx));
        if let Some(value) = value {
            mapped.set(field, value);
        }
    }

    mapped
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn header(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn row(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[rstest]
    #[case("")]
    #[case("   ")]
    #[case("[no field found]")]
    #[case("  [no field found] ")]
    fn empty_values_are_omitted(#[case] value: &str) {
        let mapped = map_rows(&header(&["Key", "Status"]), &[row(&["ABC-1", value])]);
        assert_eq!(mapped[0].status, None);
        assert_eq!(mapped[0].len(), 1);
    }

    #[test]
    fn direct_columns_map_to_canonical_fields() {
        let mapped = map_rows(
            &header(&["Key", "Sprint.name", "Product Approved ", "Unrelated"]),
            &[row(&["ABC-1", "Sprint 4", "yes", "dropped"])],
        );
        let r = &mapped[0];
        assert_eq!(r.key.as_deref(), Some("ABC-1"));
        assert_eq!(r.sprint_name.as_deref(), Some("Sprint 4"));
        assert_eq!(r.get("product_approved"), Some("yes"));
        assert_eq!(r.get("Unrelated"), None);
        assert_eq!(r.len(), 3);
    }

    #[test]
    fn first_column_wins_for_repeated_direct_names() {
        let mapped = map_rows(
            &header(&["Key", "Status", "Status"]),
            &[row(&["ABC-1", "Done", "To Do"])],
        );
        assert_eq!(mapped[0].status.as_deref(), Some("Done"));
    }

    #[test]
    fn variant_group_uses_first_non_empty_candidate() {
        let mapped = map_rows(
            &header(&[
                "Story Point estimate (QA)",
                "Story Point estimate (QA)",
                "Story point estimate (QA)",
            ]),
            &[row(&["[no field found]", "", "3"]), row(&["", "2", "5"])],
        );
        assert_eq!(mapped[0].story_point_estimate_qa.as_deref(), Some("3"));
        assert_eq!(mapped[1].story_point_estimate_qa.as_deref(), Some("2"));
    }

    #[test]
    fn variant_group_respects_candidate_order() {
        let mapped = map_rows(
            &header(&["Start Date ", "Start date"]),
            &[row(&["2024-02-01", "2024-01-01"])],
        );
        assert_eq!(mapped[0].start_date.as_deref(), Some("2024-01-01"));
    }

    #[test]
    fn short_rows_yield_absent_values() {
        let mapped = map_rows(&header(&["Key", "Status", "Sprint"]), &[row(&["ABC-1"])]);
        assert_eq!(mapped[0].key.as_deref(), Some("ABC-1"));
        assert_eq!(mapped[0].sprint, None);
    }
}
