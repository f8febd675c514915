//! Placeholder ids for rows that have not been persisted yet

use std::collections::HashSet;

use rand::Rng;
use serde_json::Value;

use crate::record::{ID_FIELD, Record, Snapshot, is_truthy};

/// Reserved prefix of every placeholder id
pub const NEW_ROW_PREFIX: &str = "new_";

/// True when `value` is a placeholder id: a string starting with [`NEW_ROW_PREFIX`]
pub fn is_placeholder(value: &Value) -> bool {
    value.as_str().is_some_and(|s| s.starts_with(NEW_ROW_PREFIX))
}

/// Issues placeholder ids, never the same one twice
#[derive(Debug, Default)]
pub struct PlaceholderIds {
    issued: HashSet<String>,
}

impl PlaceholderIds {
    pub fn new() -> Self {
        Self::default()
    }

    /// A fresh placeholder id
    pub fn reserve(&mut self) -> String {
        let mut rng = rand::rng();
        loop {
            let token: u64 = rng.random();
            let id = format!("{}{:016x}", NEW_ROW_PREFIX, token);
            if self.issued.insert(id.clone()) {
                return id;
            }
        }
    }

    /// Give `record` a placeholder id if it has content but no id.
    ///
    /// Returns true when an id was assigned.
    pub fn assign_record(&mut self, record: &mut Record) -> bool {
        if record.is_empty() || record.get(ID_FIELD).is_some_and(is_truthy) {
            return false;
        }
        let id = self.reserve();
        record.insert(ID_FIELD.to_string(), Value::String(id));
        true
    }

    /// Assign ids to every record of a snapshot; returns how many were assigned
    pub fn assign_snapshot(&mut self, snapshot: &mut Snapshot) -> usize {
        snapshot
            .records_mut()
            .map(|record| self.assign_record(record))
            .filter(|assigned| *assigned)
            .count()
    }

    /// Assign ids inside a nested JSON value: an object or an array of objects
    pub fn assign_value(&mut self, value: &mut Value) -> usize {
        match value {
            Value::Object(record) => usize::from(self.assign_record(record)),
            Value::Array(items) => items
                .iter_mut()
                .filter_map(Value::as_object_mut)
                .map(|record| self.assign_record(record))
                .filter(|assigned| *assigned)
                .count(),
            _ => 0,
        }
    }

    /// Number of ids issued so far
    pub fn issued(&self) -> usize {
        self.issued.len()
    }
}
