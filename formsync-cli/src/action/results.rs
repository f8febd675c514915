//! Outcome of running a node's persistence action

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::record::{Record, id_key};
use crate::store::StoreResponse;

/// Persisted rows keyed by the row key they were submitted under
///
/// Keeps insertion order: relation resolution falls back to the first
/// inserted row when a foreign-key column is empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistedRows {
    entries: Vec<(String, Record)>,
}

impl PersistedRows {
    pub fn get(&self, key: &str) -> Option<&Record> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, record)| record)
    }

    /// The first row stored
    pub fn first(&self) -> Option<(&str, &Record)> {
        self.entries
            .first()
            .map(|(key, record)| (key.as_str(), record))
    }

    /// Store `record` under `key`, replacing an earlier entry in place
    pub fn insert(&mut self, key: impl Into<String>, record: Record) {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = record,
            None => self.entries.push((key, record)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Record)> {
        self.entries.iter().map(|(key, record)| (key.as_str(), record))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A failure attributed to one node during a submit cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeError {
    /// The store returned no rows for an insert
    Insert { key: String, response: StoreResponse },
    /// The store returned no rows for an update
    Update { key: String, response: StoreResponse },
    /// The store refused the delete batch
    Delete { ids: Vec<Value> },
    /// A relation column still pointed at an unsaved row when the row was due
    UnresolvedRelation {
        key: String,
        column: String,
        value: Value,
    },
    /// The capability call itself failed (network, decoding, ...)
    Transport {
        operation: String,
        key: String,
        message: String,
    },
}

impl fmt::Display for NodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeError::Insert { key, response } => write!(
                f,
                "insert of row {} failed: {}",
                key,
                response.error.as_deref().unwrap_or("store returned no rows")
            ),
            NodeError::Update { key, response } => write!(
                f,
                "update of row {} failed: {}",
                key,
                response.error.as_deref().unwrap_or("store returned no rows")
            ),
            NodeError::Delete { ids } => {
                let ids: Vec<String> = ids.iter().map(id_key).collect();
                write!(f, "could not delete ids: {}", ids.join(", "))
            }
            NodeError::UnresolvedRelation { key, column, value } => write!(
                f,
                "row {}: column {} still references unsaved row {}",
                key,
                column,
                id_key(value)
            ),
            NodeError::Transport {
                operation,
                key,
                message,
            } => write!(f, "{} of row {} failed: {}", operation, key, message),
        }
    }
}

impl std::error::Error for NodeError {}

/// Results of the last persistence action of a node
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeResults {
    /// Placeholder row key -> persisted record
    pub inserts: PersistedRows,
    /// Row id key -> persisted record
    pub updates: PersistedRows,
    /// Ids removed by the delete batch
    pub deleted_ids: Vec<Value>,
    pub errors: Vec<NodeError>,
}

impl NodeResults {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Every persisted record, updates first; an insert wins over an update
    /// stored under the same key
    pub fn persisted(&self) -> PersistedRows {
        let mut rows = self.updates.clone();
        for (key, record) in self.inserts.iter() {
            rows.insert(key, record.clone());
        }
        rows
    }
}
