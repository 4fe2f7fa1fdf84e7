//! Config loading from an in-memory lookup table.

use std::collections::HashMap;

use sprintsync_core::config::DEFAULT_SHEET_CSV_URL;
use sprintsync_core::{Config, ConfigError, SyncMode};

fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key| map.get(key).cloned()
}

fn required() -> Vec<(&'static str, &'static str)> {
    vec![
        ("SUPABASE_URL", "https://example.supabase.co"),
        ("SUPABASE_SERVICE_ROLE_KEY", "service-key"),
    ]
}

#[test]
fn defaults_apply_when_only_required_settings_exist() {
    let config = Config::from_lookup(lookup(&required())).expect("config");

    assert_eq!(config.store.url, "https://example.supabase.co");
    assert_eq!(config.sync_interval_minutes, 30);
    assert_eq!(config.sheet_csv_url, DEFAULT_SHEET_CSV_URL);
    assert_eq!(config.mode, SyncMode::Incremental);
    assert!(!config.tracker.enabled);
    assert_eq!(config.tables.raw_issues, "sheet_issues_raw");
    assert_eq!(config.tables.normalized_issues, "issues_normalized");
    assert_eq!(config.tables.issue_sprints, "issue_sprints");
    assert_eq!(config.tables.sprint_metrics, "sprint_metrics");
    assert_eq!(config.tables.scope_changes, "sprint_scope_changes");
    assert_eq!(config.tables.sync_state, "sync_state");
    assert_eq!(config.tables.sprints, "sprints");
}

#[test]
fn missing_store_url_is_reported_by_name() {
    let err = Config::from_lookup(lookup(&[("SUPABASE_SERVICE_ROLE_KEY", "k")])).unwrap_err();
    assert_eq!(
        err,
        ConfigError::MissingRequired {
            key: "SUPABASE_URL"
        }
    );
    assert!(err.to_string().contains("missing required"));
}

#[test]
fn empty_service_key_counts_as_missing() {
    let err = Config::from_lookup(lookup(&[
        ("SUPABASE_URL", "https://example.supabase.co"),
        ("SUPABASE_SERVICE_ROLE_KEY", "   "),
    ]))
    .unwrap_err();
    assert!(err.to_string().contains("SUPABASE_SERVICE_ROLE_KEY"));
}

#[test]
fn overrides_are_honoured() {
    let mut pairs = required();
    pairs.extend([
        ("SYNC_INTERVAL_MINUTES", "5"),
        ("SYNC_MODE", "FULL"),
        ("JIRA_SYNC_ENABLED", "yes"),
        ("JIRA_BASE_URL", "https://jira.example.com"),
        ("SUPABASE_SPRINTS_TABLE", "board_sprints"),
        ("SHEET_CSV_URL", "https://sheets.example.com/export.csv"),
    ]);
    let config = Config::from_lookup(lookup(&pairs)).expect("config");

    assert_eq!(config.sync_interval_minutes, 5);
    assert_eq!(config.mode, SyncMode::Full);
    assert!(config.tracker.enabled);
    assert_eq!(
        config.tracker.base_url.as_deref(),
        Some("https://jira.example.com")
    );
    assert_eq!(config.tables.sprints, "board_sprints");
    assert_eq!(config.sheet_csv_url, "https://sheets.example.com/export.csv");
}

#[test]
fn unknown_sync_mode_falls_back_to_incremental() {
    let mut pairs = required();
    pairs.push(("SYNC_MODE", "weekly"));
    let config = Config::from_lookup(lookup(&pairs)).expect("config");
    assert_eq!(config.mode, SyncMode::Incremental);
}

#[test]
fn invalid_interval_is_rejected() {
    let mut pairs = required();
    pairs.push(("SYNC_INTERVAL_MINUTES", "half-hour"));
    let err = Config::from_lookup(lookup(&pairs)).unwrap_err();
    assert!(matches!(err, ConfigError::Invalid { key: "SYNC_INTERVAL_MINUTES", .. }));
}
