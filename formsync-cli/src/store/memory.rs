//! In-memory store
//!
//! Backs dry runs and tests. Ids are assigned from a per-table sequence,
//! every call is recorded, and individual operations can be made to fail.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use log::debug;
use serde_json::{Value, json};
use tokio::sync::Mutex;

use super::{Driver, StoreResponse, TableActions};
use crate::record::{ID_FIELD, Record, id_key};
use crate::schema::TableDescriptor;

/// A call received by the memory store
#[derive(Debug, Clone, PartialEq)]
pub enum StoreCall {
    Insert { table: String, rows: Vec<Record> },
    Update { table: String, id: Value, row: Record },
    Delete { table: String, ids: Vec<Value> },
}

impl StoreCall {
    pub fn table(&self) -> &str {
        match self {
            Self::Insert { table, .. } => table,
            Self::Update { table, .. } => table,
            Self::Delete { table, .. } => table,
        }
    }
}

/// Operation that can be made to fail for a table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailOn {
    Insert,
    Update,
    Delete,
}

#[derive(Debug, Default)]
struct MemoryState {
    tables: BTreeMap<String, Vec<Record>>,
    next_ids: BTreeMap<String, i64>,
    failing: HashSet<(String, FailOn)>,
    calls: Vec<StoreCall>,
}

impl MemoryState {
    fn allocate_id(&mut self, table: &str) -> i64 {
        let next = self.next_ids.entry(table.to_string()).or_insert(1);
        let id = *next;
        *next += 1;
        id
    }

    fn fails(&self, table: &str, op: FailOn) -> bool {
        self.failing.contains(&(table.to_string(), op))
    }
}

/// Shared in-memory tables
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load existing rows into a table
    pub async fn seed(&self, table: &str, rows: Vec<Record>) {
        let mut state = self.state.lock().await;
        let max_id = rows
            .iter()
            .filter_map(|row| row.get(ID_FIELD).and_then(Value::as_i64))
            .max()
            .unwrap_or(0);
        let next = state.next_ids.entry(table.to_string()).or_insert(1);
        *next = (*next).max(max_id + 1);
        state.tables.entry(table.to_string()).or_default().extend(rows);
    }

    /// Current rows of a table
    pub async fn rows(&self, table: &str) -> Vec<Record> {
        let state = self.state.lock().await;
        state.tables.get(table).cloned().unwrap_or_default()
    }

    /// Every call received so far, in order
    pub async fn calls(&self) -> Vec<StoreCall> {
        self.state.lock().await.calls.clone()
    }

    /// Make `op` fail for `table` from now on
    pub async fn fail(&self, table: &str, op: FailOn) {
        self.state
            .lock()
            .await
            .failing
            .insert((table.to_string(), op));
    }

    /// Capability functions for one table
    pub fn table(&self, table: &str) -> MemoryTable {
        MemoryTable {
            store: self.clone(),
            table: table.to_string(),
        }
    }
}

impl Driver for MemoryStore {
    fn actions_for(&self, table: &TableDescriptor) -> Arc<dyn TableActions> {
        Arc::new(self.table(&table.name))
    }
}

/// One table of a [`MemoryStore`]
#[derive(Debug, Clone)]
pub struct MemoryTable {
    store: MemoryStore,
    table: String,
}

#[async_trait]
impl TableActions for MemoryTable {
    async fn insert(&self, rows: Vec<Record>) -> anyhow::Result<StoreResponse> {
        let mut state = self.store.state.lock().await;
        state.calls.push(StoreCall::Insert {
            table: self.table.clone(),
            rows: rows.clone(),
        });
        if state.fails(&self.table, FailOn::Insert) {
            return Ok(StoreResponse::error(
                format!("insert into {} rejected", self.table),
                None,
            ));
        }

        let mut persisted = Vec::with_capacity(rows.len());
        for mut row in rows {
            let id = state.allocate_id(&self.table);
            row.insert(ID_FIELD.to_string(), json!(id));
            debug!("memory store: inserted {}#{}", self.table, id);
            state
                .tables
                .entry(self.table.clone())
                .or_default()
                .push(row.clone());
            persisted.push(row);
        }
        Ok(StoreResponse::success(persisted))
    }

    async fn update(&self, row: Record, id: &Value) -> anyhow::Result<StoreResponse> {
        let mut state = self.store.state.lock().await;
        state.calls.push(StoreCall::Update {
            table: self.table.clone(),
            id: id.clone(),
            row: row.clone(),
        });
        if state.fails(&self.table, FailOn::Update) {
            return Ok(StoreResponse::error(
                format!("update of {}#{} rejected", self.table, id_key(id)),
                None,
            ));
        }

        let existing = state
            .tables
            .get_mut(&self.table)
            .and_then(|rows| rows.iter_mut().find(|r| r.get(ID_FIELD) == Some(id)));
        match existing {
            Some(existing) => {
                existing.extend(row);
                debug!("memory store: updated {}#{}", self.table, id_key(id));
                Ok(StoreResponse::success(vec![existing.clone()]))
            }
            None => Ok(StoreResponse::error(
                format!("no row {} in {}", id_key(id), self.table),
                None,
            )),
        }
    }

    async fn delete(&self, ids: Vec<Value>) -> anyhow::Result<bool> {
        let mut state = self.store.state.lock().await;
        state.calls.push(StoreCall::Delete {
            table: self.table.clone(),
            ids: ids.clone(),
        });
        if state.fails(&self.table, FailOn::Delete) {
            return Ok(false);
        }

        if let Some(rows) = state.tables.get_mut(&self.table) {
            rows.retain(|row| row.get(ID_FIELD).is_none_or(|id| !ids.contains(id)));
        }
        debug!("memory store: deleted {} rows from {}", ids.len(), self.table);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_insert_assigns_sequential_ids_after_seed() {
        let store = MemoryStore::new();
        store.seed("users", vec![record(json!({"id": 4, "name": "A"}))]).await;

        let users = store.table("users");
        let response = users.insert(vec![record(json!({"name": "B"}))]).await.unwrap();
        assert!(response.is_success());
        assert_eq!(response.first().unwrap().get("id"), Some(&json!(5)));
        assert_eq!(store.rows("users").await.len(), 2);
    }

    #[tokio::test]
    async fn test_update_merges_fields() {
        let store = MemoryStore::new();
        store.seed("users", vec![record(json!({"id": 1, "name": "A", "age": 3}))]).await;

        let response = store
            .table("users")
            .update(record(json!({"name": "B"})), &json!(1))
            .await
            .unwrap();
        assert_eq!(
            response.first(),
            Some(&record(json!({"id": 1, "name": "B", "age": 3})))
        );
    }

    #[tokio::test]
    async fn test_update_missing_row_fails() {
        let store = MemoryStore::new();
        let response = store
            .table("users")
            .update(record(json!({"name": "B"})), &json!(9))
            .await
            .unwrap();
        assert!(!response.is_success());
    }

    #[tokio::test]
    async fn test_delete_and_failures() {
        let store = MemoryStore::new();
        store
            .seed("users", vec![record(json!({"id": 1})), record(json!({"id": 2}))])
            .await;
        let users = store.table("users");

        assert!(users.delete(vec![json!(1)]).await.unwrap());
        assert_eq!(store.rows("users").await, vec![record(json!({"id": 2}))]);

        store.fail("users", FailOn::Delete).await;
        assert!(!users.delete(vec![json!(2)]).await.unwrap());
        assert_eq!(store.rows("users").await.len(), 1);

        store.fail("users", FailOn::Insert).await;
        let response = users.insert(vec![record(json!({"name": "C"}))]).await.unwrap();
        assert!(!response.is_success());

        let calls = store.calls().await;
        assert_eq!(calls.len(), 3);
        assert!(calls.iter().all(|c| c.table() == "users"));
    }
}
