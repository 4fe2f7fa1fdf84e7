use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::Mutex;

use super::{Filter, Select, Store, StoreError};

/// In-process store with upsert-on-conflict semantics.
///
/// Rows get an integer `id` when they arrive without one. Upserts merge the
/// provided columns into the matching row and leave the others untouched.
/// A store built with [`MemoryStore::with_tables`] rejects unknown tables with
/// [`StoreError::MissingTable`]; the default store creates tables on demand.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

#[derive(Debug, Default)]
struct State {
    tables: BTreeMap<String, Vec<Map<String, Value>>>,
    known: Option<BTreeSet<String>>,
    next_id: u64,
    failures: HashMap<String, VecDeque<StoreError>>,
}

impl State {
    fn table(&mut self, table: &str) -> Result<&mut Vec<Map<String, Value>>, StoreError> {
        if let Some(err) = self.failures.get_mut(table).and_then(VecDeque::pop_front) {
            return Err(err);
        }
        if let Some(known) = &self.known {
            if !known.contains(table) {
                return Err(StoreError::MissingTable {
                    table: table.to_owned(),
                });
            }
        }
        Ok(self.tables.entry(table.to_owned()).or_default())
    }

    fn assign_id(&mut self, row: &mut Map<String, Value>) {
        if !row.contains_key("id") {
            self.next_id += 1;
            row.insert("id".to_owned(), Value::from(self.next_id));
        }
    }
}

fn as_object(table: &str, row: &Value) -> Result<Map<String, Value>, StoreError> {
    row.as_object()
        .cloned()
        .ok_or_else(|| StoreError::InvalidArgument(format!("rows for {table} must be JSON objects")))
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that only knows the given tables.
    pub fn with_tables<I, S>(tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let state = State {
            known: Some(tables.into_iter().map(Into::into).collect()),
            ..State::default()
        };
        Self {
            state: Mutex::new(state),
        }
    }

    /// Queue `error` to be returned by the next call touching `table`.
    pub async fn fail_next(&self, table: &str, error: StoreError) {
        let mut state = self.state.lock().await;
        state
            .failures
            .entry(table.to_owned())
            .or_default()
            .push_back(error);
    }

    /// Snapshot of a table's rows in insertion order.
    pub async fn rows(&self, table: &str) -> Vec<Value> {
        let state = self.state.lock().await;
        state
            .tables
            .get(table)
            .map(|rows| rows.iter().cloned().map(Value::Object).collect())
            .unwrap_or_default()
    }

    /// Insert rows directly, bypassing failure injection.
    pub async fn seed(&self, table: &str, rows: Vec<Value>) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let mut prepared = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut row = as_object(table, row)?;
            state.assign_id(&mut row);
            prepared.push(row);
        }
        state.tables.entry(table.to_owned()).or_default().extend(prepared);
        Ok(())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn upsert(
        &self,
        table: &str,
        rows: &[Value],
        on_conflict: &str,
    ) -> Result<usize, StoreError> {
        let keys: Vec<&str> = on_conflict
            .split(',')
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .collect();
        if keys.is_empty() {
            return Err(StoreError::InvalidArgument(format!(
                "upsert on {table} needs a conflict key"
            )));
        }

        let mut state = self.state.lock().await;
        state.table(table)?;
        for row in rows {
            let mut incoming = as_object(table, row)?;
            let existing = state.tables.get_mut(table).and_then(|stored| {
                stored
                    .iter_mut()
                    .find(|r| keys.iter().all(|k| r.get(*k) == incoming.get(*k)))
            });
            match existing {
                Some(current) => current.extend(incoming),
                None => {
                    state.assign_id(&mut incoming);
                    state.tables.entry(table.to_owned()).or_default().push(incoming);
                }
            }
        }
        Ok(rows.len())
    }

    async fn insert(&self, table: &str, rows: &[Value]) -> Result<usize, StoreError> {
        let mut state = self.state.lock().await;
        state.table(table)?;
        for row in rows {
            let mut incoming = as_object(table, row)?;
            state.assign_id(&mut incoming);
            state.tables.entry(table.to_owned()).or_default().push(incoming);
        }
        Ok(rows.len())
    }

    async fn select(&self, table: &str, query: &Select) -> Result<Vec<Value>, StoreError> {
        let mut state = self.state.lock().await;
        let rows = state.table(table)?;
        let project = |row: &Map<String, Value>| -> Value {
            if query.columns.is_empty() || query.columns.iter().any(|c| c == "*") {
                return Value::Object(row.clone());
            }
            let picked = query
                .columns
                .iter()
                .filter_map(|c| row.get(c).map(|v| (c.clone(), v.clone())))
                .collect();
            Value::Object(picked)
        };
        Ok(rows
            .iter()
            .filter(|row| query.filters.iter().all(|f| f.matches(row)))
            .map(project)
            .collect())
    }

    async fn update(
        &self,
        table: &str,
        filter: &Filter,
        patch: &Value,
    ) -> Result<usize, StoreError> {
        let patch = as_object(table, patch)?;
        let mut state = self.state.lock().await;
        let rows = state.table(table)?;
        let mut touched = 0;
        for row in rows.iter_mut().filter(|row| filter.matches(row)) {
            row.extend(patch.clone());
            touched += 1;
        }
        Ok(touched)
    }
}
