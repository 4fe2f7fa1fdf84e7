//! Sprint scope-change detection.
//!
//! Compares the associations implied by this run's rows with those last
//! persisted and appends one event per difference to the scope-change log.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::Serialize;

use sprintsync_clients::{Store, StoreError};
use sprintsync_core::{
    CanonicalRow, ChangeType, IssueSprintAssociation, ScopeChangeEvent, StoredAssociation,
};

use crate::error::require_table;
use crate::issue_sprints::{build_associations, fetch_associations, issue_keys, Pair};
use crate::outcome::{missing_table, skip_missing_table, to_rows, StageOutcome};
use crate::SyncError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScopeChangeSummary {
    pub inserted: usize,
}

fn pair_of(issue: &IssueSprintAssociation) -> Pair {
    (issue.issue_key.clone(), issue.sprint_name.clone())
}

/// Pure diff between the current and the persisted snapshot.
///
/// Every stored row is compared against the current snapshot, including rows
/// flagged removed: an issue that returns to a sprint with its previous
/// estimate emits nothing and one with a new estimate emits
/// `story_points_changed`. Only rows not yet flagged removed can emit
/// `removed`. Every event carries `changed_at`.
pub fn diff_scope(
    current: &[IssueSprintAssociation],
    existing: &[StoredAssociation],
    changed_at: DateTime<Utc>,
) -> Vec<ScopeChangeEvent> {
    let mut previous: HashMap<Pair, &StoredAssociation> = HashMap::new();
    for stored in existing {
        previous.insert((stored.issue_key.clone(), stored.sprint_name.clone()), stored);
    }

    let mut events = Vec::new();
    let mut live: HashSet<Pair> = HashSet::new();

    for association in current {
        let pair = pair_of(association);
        let to_sp = association.story_points_at_sync;
        match previous.get(&pair) {
            None => events.push(ScopeChangeEvent {
                issue_key: pair.0.clone(),
                sprint_name: pair.1.clone(),
                change_type: ChangeType::Added,
                from_sp: None,
                to_sp,
                status_at_change: association.status_at_sync.clone(),
                changed_at,
            }),
            Some(stored) if stored.story_points() != to_sp => events.push(ScopeChangeEvent {
                issue_key: pair.0.clone(),
                sprint_name: pair.1.clone(),
                change_type: ChangeType::StoryPointsChanged,
                from_sp: stored.story_points(),
                to_sp,
                status_at_change: association.status_at_sync.clone(),
                changed_at,
            }),
            Some(_) => {}
        }
        live.insert(pair);
    }

    let mut reported: HashSet<Pair> = HashSet::new();
    for stored in existing.iter().filter(|a| !a.is_removed) {
        let pair = (stored.issue_key.clone(), stored.sprint_name.clone());
        if live.contains(&pair) || !reported.insert(pair.clone()) {
            continue;
        }
        events.push(ScopeChangeEvent {
            issue_key: pair.0,
            sprint_name: pair.1,
            change_type: ChangeType::Removed,
            from_sp: stored.story_points(),
            to_sp: None,
            status_at_change: stored.status_at_sync.clone(),
            changed_at,
        });
    }

    events
}

/// Diff this run's rows against stored associations and append the events.
///
/// Must run before the association sync rewrites the stored snapshot.
pub async fn detect_scope_changes(
    store: &dyn Store,
    associations_table: &str,
    changes_table: &str,
    rows: &[CanonicalRow],
    now: DateTime<Utc>,
) -> Result<StageOutcome<ScopeChangeSummary>, SyncError> {
    require_table(associations_table, "issue sprints table")?;
    require_table(changes_table, "scope changes table")?;

    let keys = issue_keys(rows);
    let columns = [
        "issue_key",
        "sprint_name",
        "story_points_at_sync",
        "status_at_sync",
        "is_removed",
    ];
    let existing = match fetch_associations(store, associations_table, &columns, &keys).await {
        Err(SyncError::Store(StoreError::MissingTable { table })) => {
            return Ok(missing_table(&table));
        }
        other => other?,
    };

    let current = build_associations(rows, now);
    let events = diff_scope(&current, &existing, now);
    if events.is_empty() {
        return Ok(StageOutcome::Completed(ScopeChangeSummary::default()));
    }

    let payload = to_rows(&events)?;
    let inserted = skip_missing_table(store.insert(changes_table, &payload).await)?;
    Ok(match inserted {
        StageOutcome::Completed(inserted) => {
            tracing::info!(table = changes_table, inserted, "scope changes recorded");
            StageOutcome::Completed(ScopeChangeSummary { inserted })
        }
        StageOutcome::Skipped { reason } => StageOutcome::Skipped { reason },
    })
}
