//! Environment-driven configuration.
//!
//! [`Config::from_lookup`] takes any key → value function so tests can feed a
//! map; [`Config::from_env`] is the process-environment convenience wrapper.
//! Empty values are treated as unset everywhere.

use crate::error::ConfigError;
use crate::types::SyncMode;

pub const SUPABASE_URL: &str = "SUPABASE_URL";
pub const SUPABASE_SERVICE_ROLE_KEY: &str = "SUPABASE_SERVICE_ROLE_KEY";
pub const SHEET_CSV_URL: &str = "SHEET_CSV_URL";
pub const SYNC_INTERVAL_MINUTES: &str = "SYNC_INTERVAL_MINUTES";
pub const SYNC_MODE: &str = "SYNC_MODE";
pub const JIRA_SYNC_ENABLED: &str = "JIRA_SYNC_ENABLED";
pub const JIRA_BASE_URL: &str = "JIRA_BASE_URL";
pub const JIRA_API_TOKEN: &str = "JIRA_API_TOKEN";
pub const JIRA_BOARD_ID: &str = "JIRA_BOARD_ID";
pub const JIRA_JQL: &str = "JIRA_JQL";

/// Published export of the team's tracking sheet.
pub const DEFAULT_SHEET_CSV_URL: &str = "https://docs.google.com/spreadsheets/d/e/2PACX-1vTn7C3JqBIEEMzWv5mv-kzgvko3yzBeTdZi2VT7HDV85_kgf6-WuGg7B1O0yG7kWFJBNqRtRK9NKdH1/pub?output=csv";

pub const DEFAULT_SYNC_INTERVAL_MINUTES: u64 = 30;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Connection settings for the relational store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub url: String,
    pub service_key: String,
}

/// Optional issue-tracker settings. Every field but `enabled` may be unset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackerConfig {
    pub enabled: bool,
    pub base_url: Option<String>,
    pub api_token: Option<String>,
    pub board_id: Option<String>,
    pub jql: Option<String>,
}

impl TrackerConfig {
    /// Settings required for board sprint sync that are unset.
    pub fn missing_for_sprints(&self) -> Vec<&'static str> {
        self.missing(&[
            (JIRA_BASE_URL, &self.base_url),
            (JIRA_API_TOKEN, &self.api_token),
            (JIRA_BOARD_ID, &self.board_id),
        ])
    }

    /// Settings required for issue search sync that are unset.
    pub fn missing_for_issues(&self) -> Vec<&'static str> {
        self.missing(&[
            (JIRA_BASE_URL, &self.base_url),
            (JIRA_API_TOKEN, &self.api_token),
            (JIRA_JQL, &self.jql),
        ])
    }

    /// `true` when enabled and the base URL and token needed for any call are set.
    pub fn has_credentials(&self) -> bool {
        self.enabled && self.base_url.is_some() && self.api_token.is_some()
    }

    fn missing(&self, required: &[(&'static str, &Option<String>)]) -> Vec<&'static str> {
        required
            .iter()
            .filter(|(_, value)| value.is_none())
            .map(|(key, _)| *key)
            .collect()
    }
}

/// Store table names. Each is overridable through its own variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableNames {
    pub raw_issues: String,
    pub normalized_issues: String,
    pub issue_sprints: String,
    pub sprint_metrics: String,
    pub scope_changes: String,
    pub sync_state: String,
    pub sprints: String,
}

impl Default for TableNames {
    fn default() -> Self {
        Self {
            raw_issues: "sheet_issues_raw".to_owned(),
            normalized_issues: "issues_normalized".to_owned(),
            issue_sprints: "issue_sprints".to_owned(),
            sprint_metrics: "sprint_metrics".to_owned(),
            scope_changes: "sprint_scope_changes".to_owned(),
            sync_state: "sync_state".to_owned(),
            sprints: "sprints".to_owned(),
        }
    }
}

impl TableNames {
    fn from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let pick = |key: &str, default: String| value(lookup, key).unwrap_or(default);
        Self {
            raw_issues: pick("SUPABASE_ISSUES_TABLE", defaults.raw_issues),
            normalized_issues: pick(
                "SUPABASE_ISSUES_NORMALIZED_TABLE",
                defaults.normalized_issues,
            ),
            issue_sprints: pick("SUPABASE_ISSUE_SPRINTS_TABLE", defaults.issue_sprints),
            sprint_metrics: pick("SUPABASE_SPRINT_METRICS_TABLE", defaults.sprint_metrics),
            scope_changes: pick("SUPABASE_SCOPE_CHANGES_TABLE", defaults.scope_changes),
            sync_state: pick("SUPABASE_SYNC_STATE_TABLE", defaults.sync_state),
            sprints: pick("SUPABASE_SPRINTS_TABLE", defaults.sprints),
        }
    }
}

/// Full runtime configuration for one sync process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub store: StoreConfig,
    pub tracker: TrackerConfig,
    pub sheet_csv_url: String,
    pub sync_interval_minutes: u64,
    pub mode: SyncMode,
    pub tables: TableNames,
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

impl Config {
    /// Build a config from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let store = StoreConfig {
            url: required(&lookup, SUPABASE_URL)?,
            service_key: required(&lookup, SUPABASE_SERVICE_ROLE_KEY)?,
        };

        let tracker = TrackerConfig {
            enabled: value(&lookup, JIRA_SYNC_ENABLED)
                .map(|v| parse_bool(&v))
                .unwrap_or(false),
            base_url: value(&lookup, JIRA_BASE_URL),
            api_token: value(&lookup, JIRA_API_TOKEN),
            board_id: value(&lookup, JIRA_BOARD_ID),
            jql: value(&lookup, JIRA_JQL),
        };

        let sync_interval_minutes = match value(&lookup, SYNC_INTERVAL_MINUTES) {
            None => DEFAULT_SYNC_INTERVAL_MINUTES,
            Some(raw) => parse_interval(&raw)?,
        };

        // Anything other than "full" runs incrementally.
        let mode = match value(&lookup, SYNC_MODE) {
            Some(raw) if raw.trim().eq_ignore_ascii_case("full") => SyncMode::Full,
            _ => SyncMode::Incremental,
        };

        Ok(Self {
            store,
            tracker,
            sheet_csv_url: sheet_csv_url(&lookup),
            sync_interval_minutes,
            mode,
            tables: TableNames::from_lookup(&lookup),
        })
    }
}

/// Sheet URL alone; does not require store settings.
pub fn sheet_csv_url(lookup: &impl Fn(&str) -> Option<String>) -> String {
    value(lookup, SHEET_CSV_URL).unwrap_or_else(|| DEFAULT_SHEET_CSV_URL.to_owned())
}

fn value(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    lookup(key)
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

fn required(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<String, ConfigError> {
    value(lookup, key).ok_or(ConfigError::MissingRequired { key })
}

fn parse_bool(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn parse_interval(raw: &str) -> Result<u64, ConfigError> {
    match raw.parse::<u64>() {
        Ok(0) => Err(ConfigError::Invalid {
            key: SYNC_INTERVAL_MINUTES,
            value: raw.to_owned(),
            reason: "must be at least 1".to_owned(),
        }),
        Ok(minutes) => Ok(minutes),
        Err(err) => Err(ConfigError::Invalid {
            key: SYNC_INTERVAL_MINUTES,
            value: raw.to_owned(),
            reason: err.to_string(),
        }),
    }
}
