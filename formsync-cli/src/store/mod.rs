//! Persistence capabilities
//!
//! The graph never talks to a database directly. Each table gets a
//! [`TableActions`] implementation from a [`Driver`], offering exactly three
//! calls: insert rows, update one row by id, delete a batch of ids.

pub mod memory;
pub mod postgrest;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::record::Record;
use crate::schema::TableDescriptor;

pub use memory::{MemoryStore, StoreCall};
pub use postgrest::PostgrestStore;

/// What the store answered to an insert or update
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreResponse {
    /// Rows the store returned; empty means the call failed
    #[serde(default)]
    pub data: Vec<Record>,
    /// Error message reported by the store, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Status code, for stores that speak HTTP
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
}

impl StoreResponse {
    /// A successful response carrying the persisted rows
    pub fn success(data: Vec<Record>) -> Self {
        Self {
            data,
            error: None,
            status_code: None,
        }
    }

    /// A failed response
    pub fn error(message: impl Into<String>, status_code: Option<u16>) -> Self {
        Self {
            data: Vec::new(),
            error: Some(message.into()),
            status_code,
        }
    }

    /// A response only counts as success when it carries rows
    pub fn is_success(&self) -> bool {
        !self.data.is_empty()
    }

    /// The first persisted row
    pub fn first(&self) -> Option<&Record> {
        self.data.first()
    }
}

/// Insert, update and delete for one table
#[async_trait]
pub trait TableActions: Send + Sync {
    /// Insert rows; ids are assigned by the store
    async fn insert(&self, rows: Vec<Record>) -> anyhow::Result<StoreResponse>;

    /// Apply `row` as a partial update to the row with `id`
    async fn update(&self, row: Record, id: &Value) -> anyhow::Result<StoreResponse>;

    /// Delete all rows with the given ids; `false` means the store refused
    async fn delete(&self, ids: Vec<Value>) -> anyhow::Result<bool>;
}

/// Produces the capability functions for a table
pub trait Driver {
    fn actions_for(&self, table: &TableDescriptor) -> Arc<dyn TableActions>;
}

/// The store selected by configuration
#[derive(Debug, Clone)]
pub enum Backend {
    Memory(MemoryStore),
    Postgrest(PostgrestStore),
}

impl Backend {
    pub fn label(&self) -> &'static str {
        match self {
            Backend::Memory(_) => "memory",
            Backend::Postgrest(_) => "postgrest",
        }
    }
}

impl Driver for Backend {
    fn actions_for(&self, table: &TableDescriptor) -> Arc<dyn TableActions> {
        match self {
            Backend::Memory(store) => store.actions_for(table),
            Backend::Postgrest(store) => store.actions_for(table),
        }
    }
}
