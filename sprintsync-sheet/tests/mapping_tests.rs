//! End-to-end CSV → canonical row tests for `sprintsync-sheet`.

use rstest::rstest;
use sprintsync_sheet::{load_rows, map_rows, parse_csv, SheetError};

const EXPORT: &str = "\
Issue Type,Key,Summary,Status,Sprint,Sprint.startDate,Story point estimate,Story point estimate (DEV),Start date,Issue ID,Created
Story,ABC-1,Checkout flow,Done,\"[Sprint 1, Sprint 2]\",2024-01-01,3,[no field found],2024-01-02,10001,2024-01-01T09:00:00Z
Bug,ABC-2,Fix login,In Progress,Sprint 2,,,5,,10002,
";

#[test]
fn export_maps_every_row() {
    let rows = load_rows(EXPORT).expect("load");
    assert_eq!(rows.len(), 2);

    let first = &rows[0];
    assert_eq!(first.key.as_deref(), Some("ABC-1"));
    assert_eq!(first.issue_type.as_deref(), Some("Story"));
    assert_eq!(first.sprint.as_deref(), Some("[Sprint 1, Sprint 2]"));
    assert_eq!(first.sprint_start_date.as_deref(), Some("2024-01-01"));
    assert_eq!(first.story_point_estimate_dev, None);
    assert_eq!(first.start_date.as_deref(), Some("2024-01-02"));
    assert_eq!(first.story_points(), Some(3.0));

    let second = &rows[1];
    assert_eq!(second.story_point_estimate, None);
    assert_eq!(second.story_point_estimate_dev.as_deref(), Some("5"));
    assert_eq!(second.story_points(), Some(5.0));
    assert_eq!(second.created, None);
}

#[rstest]
#[case("")]
#[case("\n\n")]
#[case("Key,Status\n")]
fn exports_without_data_rows_fail(#[case] text: &str) {
    assert!(matches!(load_rows(text), Err(SheetError::NoRows)));
}

#[test]
fn no_mapped_value_is_blank_or_sentinel() {
    let table = parse_csv(EXPORT).expect("parse");
    for row in map_rows(&table.header, &table.rows) {
        let payload = row.to_payload();
        for (field, value) in payload.as_object().expect("object") {
            let text = value.as_str().expect("string value");
            assert!(!text.trim().is_empty(), "{field} is blank");
            assert_ne!(text, "[no field found]", "{field} kept the sentinel");
        }
    }
}
