//! Sprint name extraction from free text and JSON values.

use serde_json::Value;

use sprintsync_core::{CanonicalRow, SprintName};

/// Split sprint text such as `"[Sprint A, Sprint B]"` or `"Sprint A; Sprint B"`.
///
/// Bracket characters are dropped, tokens are split on runs of `,` and `;`,
/// trimmed, and empties removed. Input order is kept and duplicates survive.
pub fn parse_sprint_text(text: &str) -> Vec<String> {
    text.chars()
        .filter(|c| !matches!(c, '[' | ']'))
        .collect::<String>()
        .split([',', ';'])
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Sprint names from an arbitrary JSON value.
///
/// Arrays keep each element's string form; strings go through
/// [`parse_sprint_text`]; `null` and `false` yield nothing.
pub fn parse_sprint_names(value: &Value) -> Vec<String> {
    match value {
        Value::Null | Value::Bool(false) => Vec::new(),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => s.trim().to_owned(),
                Value::Null => String::new(),
                other => other.to_string(),
            })
            .filter(|name| !name.is_empty())
            .collect(),
        Value::String(text) => parse_sprint_text(text),
        other => parse_sprint_text(&other.to_string()),
    }
}

/// Distinct sprint names of a row's `sprint` column, first occurrence first.
pub fn row_sprints(row: &CanonicalRow) -> Vec<SprintName> {
    distinct(row.sprint.as_deref())
}

/// Distinct names from `sprint_name`, falling back to `sprint`.
pub(crate) fn row_sprint_identities(row: &CanonicalRow) -> Vec<SprintName> {
    distinct(row.sprint_name.as_deref().or(row.sprint.as_deref()))
}

fn distinct(text: Option<&str>) -> Vec<SprintName> {
    let mut names: Vec<SprintName> = Vec::new();
    for name in text.map(parse_sprint_text).unwrap_or_default() {
        let name = SprintName::from(name);
        if !names.contains(&name) {
            names.push(name);
        }
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case("[Sprint A, Sprint B]", &["Sprint A", "Sprint B"])]
    #[case("Sprint A; Sprint B", &["Sprint A", "Sprint B"])]
    #[case("Sprint A,,; ;Sprint B", &["Sprint A", "Sprint B"])]
    #[case("  Sprint 12  ", &["Sprint 12"])]
    #[case("[]", &[])]
    #[case("", &[])]
    fn text_is_split_and_trimmed(#[case] input: &str, #[case] expected: &[&str]) {
        assert_eq!(parse_sprint_text(input), expected);
    }

    #[test]
    fn arrays_keep_element_order_and_duplicates() {
        assert_eq!(
            parse_sprint_names(&json!(["S2", "S1", "", 7, "S2"])),
            vec!["S2", "S1", "7", "S2"]
        );
    }

    #[test]
    fn null_yields_nothing() {
        assert!(parse_sprint_names(&Value::Null).is_empty());
        assert_eq!(parse_sprint_names(&json!("[S1]")), vec!["S1"]);
    }

    #[test]
    fn row_sprints_are_distinct() {
        let mut row = CanonicalRow::default();
        row.set("sprint", "S1, S2, S1");
        assert_eq!(row_sprints(&row), vec![SprintName::from("S1"), SprintName::from("S2")]);
    }

    #[test]
    fn sprint_identity_prefers_sprint_name() {
        let mut row = CanonicalRow::default();
        row.set("sprint", "S1");
        assert_eq!(row_sprint_identities(&row), vec![SprintName::from("S1")]);
        row.set("sprint_name", "Named");
        assert_eq!(row_sprint_identities(&row), vec![SprintName::from("Named")]);
    }
}
