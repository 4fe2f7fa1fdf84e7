//! Domain types for the sheet → store sync.
//!
//! Store-facing records serialize with `skip_serializing_if` on optional
//! fields only where an absent column must leave the stored value untouched.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Unique issue identifier (e.g. `ABC-123`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IssueKey(pub String);

impl fmt::Display for IssueKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for IssueKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for IssueKey {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// A sprint's display name, which doubles as its identity in the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SprintName(pub String);

impl fmt::Display for SprintName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for SprintName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SprintName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Which timestamps a run touches in the sync-state row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    Full,
    #[default]
    Incremental,
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncMode::Full => write!(f, "full"),
            SyncMode::Incremental => write!(f, "incremental"),
        }
    }
}

impl FromStr for SyncMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "full" => Ok(SyncMode::Full),
            "incremental" => Ok(SyncMode::Incremental),
            other => Err(format!(
                "unknown sync mode '{other}'; expected: full, incremental"
            )),
        }
    }
}

/// Kind of scope change between two syncs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Added,
    Removed,
    StoryPointsChanged,
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeType::Added => write!(f, "added"),
            ChangeType::Removed => write!(f, "removed"),
            ChangeType::StoryPointsChanged => write!(f, "story_points_changed"),
        }
    }
}

/// Where a sprint row was observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SprintSource {
    Sheet,
    Jira,
}

// ---------------------------------------------------------------------------
// Canonical row
// ---------------------------------------------------------------------------

/// One spreadsheet row after header normalization.
///
/// Fields the pipeline reads are named; every other mapped column lands in
/// `extra`. Empty values are never stored: absent means `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sprint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sprint_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sprint_start_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sprint_end_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sprint_complete_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sprint_state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub story_point_estimate: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub story_points: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub story_point_estimate_dev: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub story_point_estimate_qa: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    /// Mapped columns without a dedicated field.
    #[serde(flatten)]
    pub extra: BTreeMap<String, String>,
}

impl CanonicalRow {
    fn slot_mut(&mut self, field: &str) -> Option<&mut Option<String>> {
        let slot = match field {
            "key" => &mut self.key,
            "issue_id" => &mut self.issue_id,
            "issue_type" => &mut self.issue_type,
            "summary" => &mut self.summary,
            "project" => &mut self.project,
            "assignee" => &mut self.assignee,
            "priority" => &mut self.priority,
            "status" => &mut self.status,
            "sprint" => &mut self.sprint,
            "sprint_name" => &mut self.sprint_name,
            "sprint_start_date" => &mut self.sprint_start_date,
            "sprint_end_date" => &mut self.sprint_end_date,
            "sprint_complete_date" => &mut self.sprint_complete_date,
            "sprint_state" => &mut self.sprint_state,
            "start_date" => &mut self.start_date,
            "end_date" => &mut self.end_date,
            "story_point_estimate" => &mut self.story_point_estimate,
            "story_points" => &mut self.story_points,
            "story_point_estimate_dev" => &mut self.story_point_estimate_dev,
            "story_point_estimate_qa" => &mut self.story_point_estimate_qa,
            "resolved" => &mut self.resolved,
            "resolution" => &mut self.resolution,
            "created" => &mut self.created,
            "parent" => &mut self.parent,
            _ => return None,
        };
        Some(slot)
    }

    /// Store `value` under the canonical `field` name.
    pub fn set(&mut self, field: &str, value: impl Into<String>) {
        let value = value.into();
        match self.slot_mut(field) {
            Some(slot) => *slot = Some(value),
            None => {
                self.extra.insert(field.to_owned(), value);
            }
        }
    }

    /// Look up a canonical field by name, named or extra.
    pub fn get(&self, field: &str) -> Option<&str> {
        match self.named(field) {
            Some(value) => value.as_deref(),
            None => self.extra.get(field).map(String::as_str),
        }
    }

    fn named(&self, field: &str) -> Option<&Option<String>> {
        let value = match field {
            "key" => &self.key,
            "issue_id" => &self.issue_id,
            "issue_type" => &self.issue_type,
            "summary" => &self.summary,
            "project" => &self.project,
            "assignee" => &self.assignee,
            "priority" => &self.priority,
            "status" => &self.status,
            "sprint" => &self.sprint,
            "sprint_name" => &self.sprint_name,
            "sprint_start_date" => &self.sprint_start_date,
            "sprint_end_date" => &self.sprint_end_date,
            "sprint_complete_date" => &self.sprint_complete_date,
            "sprint_state" => &self.sprint_state,
            "start_date" => &self.start_date,
            "end_date" => &self.end_date,
            "story_point_estimate" => &self.story_point_estimate,
            "story_points" => &self.story_points,
            "story_point_estimate_dev" => &self.story_point_estimate_dev,
            "story_point_estimate_qa" => &self.story_point_estimate_qa,
            "resolved" => &self.resolved,
            "resolution" => &self.resolution,
            "created" => &self.created,
            "parent" => &self.parent,
            _ => return None,
        };
        Some(value)
    }

    /// Dedup identity: `key`, falling back to `issue_id`.
    pub fn identity(&self) -> Option<&str> {
        self.key.as_deref().or(self.issue_id.as_deref())
    }

    /// First of the four estimate columns that parses as a number.
    pub fn story_points(&self) -> Option<f64> {
        [
            &self.story_point_estimate,
            &self.story_points,
            &self.story_point_estimate_dev,
            &self.story_point_estimate_qa,
        ]
        .into_iter()
        .filter_map(|v| v.as_deref())
        .find_map(parse_number)
    }

    /// Number of populated fields, named and extra.
    pub fn len(&self) -> usize {
        let value = serde_json::to_value(self).unwrap_or(Value::Null);
        value.as_object().map(|o| o.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flat JSON object of every populated field, used as a traceability payload.
    pub fn to_payload(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Parse a finite number from free text, tolerating surrounding whitespace.
pub fn parse_number(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|n| n.is_finite())
}

// ---------------------------------------------------------------------------
// Store records
// ---------------------------------------------------------------------------

/// Row of the raw-issues table: the canonical row verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawIssue {
    pub key: String,
    pub issue_id: Option<String>,
    pub payload: Value,
}

/// Row of the normalized-issues table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedIssue {
    pub key: String,
    pub issue_id: Option<String>,
    pub summary: Option<String>,
    pub project: Option<String>,
    pub assignee: Option<String>,
    pub priority: Option<String>,
    pub status: Option<String>,
    pub sprint: Option<String>,
    pub story_points: Option<String>,
    pub story_points_qa: Option<String>,
    pub story_points_dev: Option<String>,
    pub resolved: Option<String>,
    pub resolution: Option<String>,
    pub created_at: Option<String>,
    pub parent_key: Option<String>,
    pub payload: Value,
}

/// One status transition pulled from a tracker changelog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusTransition {
    pub from: Option<String>,
    pub to: Option<String>,
    pub changed_at: Option<String>,
    pub author: Option<String>,
}

/// Current issue↔sprint pairing as written on each sync.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueSprintAssociation {
    pub issue_key: IssueKey,
    pub sprint_name: SprintName,
    pub status_at_sync: Option<String>,
    pub story_points_at_sync: Option<f64>,
    pub is_removed: bool,
    pub removed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// An association row as read back from the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredAssociation {
    #[serde(default)]
    pub id: Option<Value>,
    pub issue_key: IssueKey,
    pub sprint_name: SprintName,
    #[serde(default)]
    pub status_at_sync: Option<String>,
    #[serde(default)]
    pub story_points_at_sync: Option<Value>,
    #[serde(default)]
    pub is_removed: bool,
}

impl StoredAssociation {
    /// Persisted story points, accepting numbers or numeric strings.
    pub fn story_points(&self) -> Option<f64> {
        match self.story_points_at_sync.as_ref()? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => parse_number(s),
            _ => None,
        }
    }
}

/// Append-only record of a sprint scope change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScopeChangeEvent {
    pub issue_key: IssueKey,
    pub sprint_name: SprintName,
    pub change_type: ChangeType,
    pub from_sp: Option<f64>,
    pub to_sp: Option<f64>,
    pub status_at_change: Option<String>,
    pub changed_at: DateTime<Utc>,
}

/// Per-sprint rollup. Story points are summed as `f64`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SprintMetrics {
    pub issues_total: u64,
    pub issues_done: u64,
    pub sp_total: f64,
    pub sp_done: f64,
    pub removed_count: u64,
    pub removed_sp: f64,
    pub status_counts: BTreeMap<String, u64>,
}

/// Metrics row; replaces the previous snapshot for `sprint_name`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SprintMetricsSnapshot {
    pub sprint_name: SprintName,
    pub metrics: SprintMetrics,
    pub updated_at: DateTime<Utc>,
}

/// Sprint identity row. Unset fields are omitted so an upsert never clears
/// a value the store already holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SprintRecord {
    pub name: SprintName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub complete_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    pub source: SprintSource,
    pub last_seen_at: DateTime<Utc>,
}

impl SprintRecord {
    pub fn new(name: SprintName, source: SprintSource, last_seen_at: DateTime<Utc>) -> Self {
        Self {
            name,
            start_date: None,
            end_date: None,
            complete_date: None,
            state: None,
            source,
            last_seen_at,
        }
    }
}

/// The single sync-state row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncState {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_full_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_incremental_at: Option<DateTime<Utc>>,
}

impl SyncState {
    pub const SINGLETON_ID: &'static str = "singleton";

    /// State patch for a run finishing at `at`. Full runs touch both stamps.
    pub fn for_run(mode: SyncMode, at: DateTime<Utc>) -> Self {
        Self {
            id: Self::SINGLETON_ID.to_owned(),
            last_full_at: (mode == SyncMode::Full).then_some(at),
            last_incremental_at: Some(at),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
