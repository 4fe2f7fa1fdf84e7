//! Tracker-sourced sprints and issues.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use sprintsync_clients::{upsert_with_retry, Store, TrackerApi, TrackerRequest, UpsertRequest};
use sprintsync_core::{NormalizedIssue, SprintName, SprintRecord, SprintSource, StatusTransition};

use crate::error::require_table;
use crate::outcome::{skip_missing_table, to_rows, StageOutcome};
use crate::sprint_names::parse_sprint_text;
use crate::sprints::{normalize_date, upsert_sprint_records};
use crate::SyncError;

pub const PAGE_SIZE: usize = 50;
const SPRINT_STATES: &str = "active,future,closed";
const SPRINT_FIELD: &str = "customfield_10020";
/// Custom fields that commonly carry story points, tried in order.
const STORY_POINT_FIELDS: &[&str] = &[
    "customfield_10016",
    "customfield_10026",
    "customfield_10002",
    "customfield_10004",
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TrackerSprintSummary {
    pub fetched: usize,
    pub upserted: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TrackerIssueSummary {
    pub fetched: usize,
    pub upserted: usize,
}

fn text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_owned()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn array(value: &Value) -> &[Value] {
    value.as_array().map(Vec::as_slice).unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Sprints
// ---------------------------------------------------------------------------

/// Every sprint on a board, following `startAt` until the last page.
pub async fn fetch_board_sprints(
    api: &dyn TrackerApi,
    board_id: &str,
) -> Result<Vec<Value>, SyncError> {
    if board_id.trim().is_empty() {
        return Err(SyncError::MissingArgument("board id"));
    }
    let path = format!("/rest/agile/1.0/board/{}/sprint", board_id.trim());
    let mut sprints = Vec::new();
    let mut start_at = 0;
    loop {
        let page = api
            .request(
                TrackerRequest::get(&path)
                    .query("startAt", start_at)
                    .query("maxResults", PAGE_SIZE)
                    .query("state", SPRINT_STATES),
            )
            .await?;
        let values = array(&page["values"]);
        let count = values.len();
        sprints.extend(values.iter().cloned());
        debug!(board_id, start_at, count, "fetched sprint page");
        if page["isLast"].as_bool().unwrap_or(false) || count == 0 {
            break;
        }
        start_at += count;
    }
    Ok(sprints)
}

/// One record per distinct sprint name; the first sprint with a name wins.
pub fn build_tracker_sprint_rows(sprints: &[Value], now: DateTime<Utc>) -> Vec<SprintRecord> {
    let mut seen = HashSet::new();
    let mut records = Vec::new();
    for sprint in sprints {
        let name = text(&sprint["name"]).unwrap_or_else(|| match text(&sprint["id"]) {
            Some(id) => format!("sprint-{id}"),
            None => format!("sprint-{}", records.len() + 1),
        });
        if !seen.insert(name.clone()) {
            continue;
        }
        let date = |field: &str| text(&sprint[field]).and_then(|raw| normalize_date(&raw));
        let mut record = SprintRecord::new(SprintName::from(name), SprintSource::Jira, now);
        record.start_date = date("startDate");
        record.end_date = date("endDate").or_else(|| date("completeDate"));
        record.complete_date = date("completeDate");
        record.state = text(&sprint["state"]);
        records.push(record);
    }
    records
}

/// Fetch board sprints and upsert them into the sprints table.
pub async fn sync_tracker_sprints(
    api: &dyn TrackerApi,
    store: &dyn Store,
    table: &str,
    board_id: &str,
    now: DateTime<Utc>,
) -> Result<StageOutcome<TrackerSprintSummary>, SyncError> {
    require_table(table, "sprints table")?;
    let sprints = fetch_board_sprints(api, board_id).await?;
    let records = build_tracker_sprint_rows(&sprints, now);
    let fetched = sprints.len();
    info!(board_id, fetched, distinct = records.len(), "tracker sprints fetched");

    Ok(match upsert_sprint_records(store, table, &records).await? {
        StageOutcome::Completed(summary) => StageOutcome::Completed(TrackerSprintSummary {
            fetched,
            upserted: summary.upserted,
        }),
        StageOutcome::Skipped { reason } => StageOutcome::Skipped { reason },
    })
}

// ---------------------------------------------------------------------------
// Issues
// ---------------------------------------------------------------------------

/// Every issue matching `jql`, with changelogs expanded.
pub async fn search_issues(api: &dyn TrackerApi, jql: &str) -> Result<Vec<Value>, SyncError> {
    if jql.trim().is_empty() {
        return Err(SyncError::MissingArgument("JQL"));
    }
    let mut issues = Vec::new();
    loop {
        let page = api
            .request(
                TrackerRequest::get("/rest/api/2/search")
                    .query("jql", jql)
                    .query("startAt", issues.len())
                    .query("maxResults", PAGE_SIZE)
                    .query("expand", "changelog"),
            )
            .await?;
        let batch = array(&page["issues"]);
        if batch.is_empty() {
            break;
        }
        issues.extend(batch.iter().cloned());
        let total = page["total"].as_u64().map(|t| t as usize);
        debug!(fetched = issues.len(), total, "fetched issue page");
        if total.is_some_and(|total| issues.len() >= total) {
            break;
        }
    }
    Ok(issues)
}

/// Sprint names from the sprint custom field, whatever shape it arrives in.
pub fn sprint_field_names(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().flat_map(sprint_field_names).collect(),
        Value::Object(_) => text(&value["name"]).into_iter().collect(),
        Value::String(raw) => match raw.split_once("name=") {
            // Legacy serialized form: "...Sprint@1f[id=1,state=ACTIVE,name=Sprint 1,startDate=...]"
            Some((_, rest)) => {
                let name = rest.split([',', ']']).next().unwrap_or_default().trim();
                if name.is_empty() {
                    Vec::new()
                } else {
                    vec![name.to_owned()]
                }
            }
            None => parse_sprint_text(raw),
        },
        _ => Vec::new(),
    }
}

fn story_points(fields: &Value) -> Option<String> {
    STORY_POINT_FIELDS.iter().find_map(|field| match &fields[*field] {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => sprintsync_core::parse_number(s).map(|_| s.trim().to_owned()),
        _ => None,
    })
}

/// Status transitions from `changelog.histories`, oldest entry first as given.
pub fn status_history(issue: &Value) -> Vec<StatusTransition> {
    let mut transitions = Vec::new();
    for history in array(&issue["changelog"]["histories"]) {
        for item in array(&history["items"]) {
            if item["field"].as_str() != Some("status") {
                continue;
            }
            let from = text(&item["fromString"]);
            let to = text(&item["toString"]);
            if from.is_none() && to.is_none() {
                continue;
            }
            transitions.push(StatusTransition {
                from,
                to,
                changed_at: text(&history["created"]),
                author: text(&history["author"]["displayName"]),
            });
        }
    }
    transitions
}

/// Map a search hit to the normalized issue schema. Issues without a key
/// are dropped.
pub fn map_tracker_issue(issue: &Value) -> Option<NormalizedIssue> {
    let key = text(&issue["key"])?;
    let fields = &issue["fields"];
    let sprints = sprint_field_names(&fields[SPRINT_FIELD]);
    let history = status_history(issue);

    Some(NormalizedIssue {
        issue_id: text(&issue["id"]),
        summary: text(&fields["summary"]),
        project: text(&fields["project"]["key"]).or_else(|| text(&fields["project"]["name"])),
        assignee: text(&fields["assignee"]["displayName"]),
        priority: text(&fields["priority"]["name"]),
        status: text(&fields["status"]["name"]),
        sprint: (!sprints.is_empty()).then(|| sprints.join(", ")),
        story_points: story_points(fields),
        story_points_qa: None,
        story_points_dev: None,
        resolved: text(&fields["resolutiondate"]),
        resolution: text(&fields["resolution"]["name"]),
        created_at: text(&fields["created"]),
        parent_key: text(&fields["parent"]["key"]),
        payload: json!({
            "source": "jira",
            "key": key,
            "fields": fields,
            "status_history": history,
        }),
        key,
    })
}

/// Search issues and upsert them into the normalized-issues table on `key`.
pub async fn sync_tracker_issues(
    api: &dyn TrackerApi,
    store: &dyn Store,
    table: &str,
    jql: &str,
) -> Result<StageOutcome<TrackerIssueSummary>, SyncError> {
    require_table(table, "normalized issues table")?;
    let issues = search_issues(api, jql).await?;
    let fetched = issues.len();
    let mapped: Vec<NormalizedIssue> = issues.iter().filter_map(map_tracker_issue).collect();
    info!(fetched, mapped = mapped.len(), "tracker issues fetched");

    let payload = to_rows(&mapped)?;
    let outcome = upsert_with_retry(store, UpsertRequest::new(table, &payload, "key"))
        .await
        .map(|o| TrackerIssueSummary {
            fetched,
            upserted: o.count,
        });
    skip_missing_table(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sprint_field_accepts_every_shape() {
        assert_eq!(
            sprint_field_names(&json!([{"id": 1, "name": "S1"}, {"id": 2, "name": "S2"}])),
            ["S1", "S2"]
        );
        assert_eq!(sprint_field_names(&json!({"name": "S3"})), ["S3"]);
        assert_eq!(sprint_field_names(&json!("S4; S5")), ["S4", "S5"]);
        assert_eq!(
            sprint_field_names(&json!([
                "com.atlassian.greenhopper.service.sprint.Sprint@1f[id=7,rapidViewId=3,state=CLOSED,name=Sprint 7,startDate=2024-01-01]"
            ])),
            ["Sprint 7"]
        );
        assert!(sprint_field_names(&Value::Null).is_empty());
    }

    #[test]
    fn story_points_use_the_first_numeric_field() {
        let fields = json!({"customfield_10016": null, "customfield_10026": "abc", "customfield_10002": 8});
        assert_eq!(story_points(&fields).as_deref(), Some("8"));
        let fields = json!({"customfield_10004": " 2.5 "});
        assert_eq!(story_points(&fields).as_deref(), Some("2.5"));
        assert_eq!(story_points(&json!({})), None);
    }

    #[test]
    fn status_history_keeps_status_items_only() {
        let issue = json!({
            "changelog": {"histories": [
                {
                    "created": "2024-01-02T10:00:00.000+0000",
                    "author": {"displayName": "Ada"},
                    "items": [
                        {"field": "status", "fromString": "To Do", "toString": "In Progress"},
                        {"field": "assignee", "fromString": null, "toString": "Ada"}
                    ]
                },
                {"created": "2024-01-03", "items": [{"field": "status", "fromString": null, "toString": null}]}
            ]}
        });
        let history = status_history(&issue);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].to.as_deref(), Some("In Progress"));
        assert_eq!(history[0].author.as_deref(), Some("Ada"));
    }

    #[test]
    fn issue_maps_nested_fields() {
        let issue = json!({
            "id": "10001",
            "key": "A-1",
            "fields": {
                "summary": "Do it",
                "project": {"key": "A"},
                "status": {"name": "Done"},
                "customfield_10020": [{"name": "S1"}, {"name": "S2"}],
                "customfield_10016": 3,
                "resolutiondate": "2024-01-05T00:00:00.000+0000",
                "parent": {"key": "A-0"}
            }
        });
        let mapped = map_tracker_issue(&issue).expect("keyed");
        assert_eq!(mapped.key, "A-1");
        assert_eq!(mapped.sprint.as_deref(), Some("S1, S2"));
        assert_eq!(mapped.story_points.as_deref(), Some("3"));
        assert_eq!(mapped.parent_key.as_deref(), Some("A-0"));
        assert_eq!(mapped.payload["source"], "jira");
        assert!(map_tracker_issue(&json!({"fields": {}})).is_none());
    }

    #[test]
    fn sprint_rows_dedupe_and_fall_back() {
        let now = Utc::now();
        let records = build_tracker_sprint_rows(
            &[
                json!({"id": 1, "name": "S1", "state": "closed", "endDate": null, "completeDate": "2024-01-14T09:00:00.000Z"}),
                json!({"id": 2, "name": "S1"}),
                json!({"id": 3}),
            ],
            now,
        );
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].end_date.map(|d| d.to_string()).as_deref(), Some("2024-01-14"));
        assert_eq!(records[1].name, SprintName::from("sprint-3"));
        assert_eq!(records[1].source, SprintSource::Jira);
    }
}
