//! Field fill statistics for eyeballing a sheet export.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use sprintsync_core::CanonicalRow;

use crate::SheetTable;

/// How many mapped rows populate one canonical field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldFill {
    pub field: String,
    pub filled: usize,
}

/// Summary of a parsed and mapped sheet.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SheetPreview {
    pub header_columns: usize,
    pub rows: usize,
    pub top_fields: Vec<FieldFill>,
    pub samples: Vec<Value>,
}

/// Count non-empty values per field, most-populated first, ties by name.
pub fn field_fill(rows: &[CanonicalRow]) -> Vec<FieldFill> {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for row in rows {
        if let Value::Object(fields) = row.to_payload() {
            for field in fields.keys() {
                *counts.entry(field.clone()).or_default() += 1;
            }
        }
    }
    let mut fills: Vec<FieldFill> = counts
        .into_iter()
        .map(|(field, filled)| FieldFill { field, filled })
        .collect();
    fills.sort_by(|a, b| b.filled.cmp(&a.filled).then_with(|| a.field.cmp(&b.field)));
    fills
}

/// Build a preview keeping the `top` best-filled fields and `sample` rows.
pub fn preview(table: &SheetTable, mapped: &[CanonicalRow], top: usize, sample: usize) -> SheetPreview {
    let mut top_fields = field_fill(mapped);
    top_fields.truncate(top);
    SheetPreview {
        header_columns: table.header.len(),
        rows: table.rows.len(),
        top_fields,
        samples: mapped.iter().take(sample).map(CanonicalRow::to_payload).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{map_rows, parse_csv};

    #[test]
    fn fills_are_sorted_by_count_then_name() {
        let table = parse_csv("Key,Status,Assignee\nA-1,Done,\nA-2,,kim\nA-3,Open,lee\n")
            .expect("parse");
        let mapped = map_rows(&table.header, &table.rows);
        let fills = field_fill(&mapped);
        assert_eq!(
            fills,
            vec![
                FieldFill { field: "key".into(), filled: 3 },
                FieldFill { field: "assignee".into(), filled: 2 },
                FieldFill { field: "status".into(), filled: 2 },
            ]
        );
    }

    #[test]
    fn preview_truncates_fields_and_samples() {
        let table = parse_csv("Key,Status\nA-1,Done\nA-2,Open\nA-3,Open\n").expect("parse");
        let mapped = map_rows(&table.header, &table.rows);
        let summary = preview(&table, &mapped, 1, 2);
        assert_eq!(summary.header_columns, 2);
        assert_eq!(summary.rows, 3);
        assert_eq!(summary.top_fields.len(), 1);
        assert_eq!(summary.samples.len(), 2);
        assert_eq!(summary.samples[0]["key"], "A-1");
    }
}
