//! Static table configuration
//!
//! Table descriptors are supplied once at graph-assembly time, usually from
//! the `[[tables]]` section of the config file.

use std::collections::{BTreeMap, BTreeSet};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::graph::GraphError;
use crate::naming::pluralize;

/// Whether a table holds business data or only links other tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableKind {
    /// Regular table with its own columns
    #[default]
    #[serde(alias = "ENTITY")]
    Entity,
    /// N:N join table, every column a foreign key into a peer table
    #[serde(alias = "JOIN")]
    Join,
}

impl TableKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Entity => "Entity",
            Self::Join => "Join",
        }
    }
}

/// Per-table configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDescriptor {
    /// Table name in the store (e.g., "users")
    pub name: String,
    #[serde(default)]
    pub kind: TableKind,
    /// Foreign-key column -> related table name
    #[serde(default)]
    pub many_to_one: BTreeMap<String, String>,
    /// Join column -> related table name (join tables only)
    #[serde(default)]
    pub many_to_many: BTreeMap<String, String>,
    /// Delete rows that disappear from the new snapshot
    #[serde(default)]
    pub destructive: bool,
}

impl TableDescriptor {
    /// Create an entity table without relations
    pub fn entity(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: TableKind::Entity,
            many_to_one: BTreeMap::new(),
            many_to_many: BTreeMap::new(),
            destructive: false,
        }
    }

    /// Create a join table without relations
    pub fn join(name: impl Into<String>) -> Self {
        Self {
            kind: TableKind::Join,
            ..Self::entity(name)
        }
    }

    pub fn with_many_to_one(mut self, column: impl Into<String>, table: impl Into<String>) -> Self {
        self.many_to_one.insert(column.into(), table.into());
        self
    }

    pub fn with_many_to_many(mut self, column: impl Into<String>, table: impl Into<String>) -> Self {
        self.many_to_many.insert(column.into(), table.into());
        self
    }

    pub fn destructive(mut self, destructive: bool) -> Self {
        self.destructive = destructive;
        self
    }

    pub fn is_join(&self) -> bool {
        self.kind == TableKind::Join
    }

    /// Relation columns this table resolves ids for.
    ///
    /// Join tables resolve their many-to-many columns, everything else its
    /// many-to-one columns.
    pub fn relation_columns(&self) -> &BTreeMap<String, String> {
        match self.kind {
            TableKind::Join => &self.many_to_many,
            TableKind::Entity => &self.many_to_one,
        }
    }

    /// Every table this table holds foreign keys into
    pub fn related_tables(&self) -> BTreeSet<&str> {
        self.many_to_one
            .values()
            .chain(self.many_to_many.values())
            .map(String::as_str)
            .collect()
    }
}

/// All known tables, keyed by name
#[derive(Debug, Clone, Default)]
pub struct Schema {
    tables: BTreeMap<String, TableDescriptor>,
}

impl Schema {
    /// Build a schema, rejecting duplicate table names.
    ///
    /// Relation targets may name a table in the singular (`org_id = "org"`);
    /// they are rewritten to the plural table name when only that exists.
    pub fn new(tables: impl IntoIterator<Item = TableDescriptor>) -> Result<Self, GraphError> {
        let mut schema = Schema::default();
        for table in tables {
            if schema.tables.contains_key(&table.name) {
                return Err(GraphError::DuplicateTable(table.name));
            }
            schema.tables.insert(table.name.clone(), table);
        }

        let names: BTreeSet<String> = schema.tables.keys().cloned().collect();
        for table in schema.tables.values_mut() {
            for target in table
                .many_to_one
                .values_mut()
                .chain(table.many_to_many.values_mut())
            {
                if names.contains(target.as_str()) {
                    continue;
                }
                let plural = pluralize(target);
                if names.contains(&plural) {
                    debug!("{}: relation target '{}' resolved to '{}'", table.name, target, plural);
                    *target = plural;
                }
            }
        }
        Ok(schema)
    }

    pub fn get(&self, name: &str) -> Option<&TableDescriptor> {
        self.tables.get(name)
    }

    pub fn require(&self, name: &str) -> Result<&TableDescriptor, GraphError> {
        self.get(name)
            .ok_or_else(|| GraphError::UnknownTable(name.to_string()))
    }

    pub fn tables(&self) -> impl Iterator<Item = &TableDescriptor> {
        self.tables.values()
    }

    /// Entity tables holding a many-to-one column into `target`, with that column
    pub fn referencing_entities<'a>(
        &'a self,
        target: &'a str,
    ) -> impl Iterator<Item = (&'a TableDescriptor, &'a str)> + 'a {
        self.tables
            .values()
            .filter(|t| t.kind == TableKind::Entity)
            .flat_map(move |t| {
                t.many_to_one
                    .iter()
                    .filter(move |(_, related)| related.as_str() == target)
                    .map(move |(column, _)| (t, column.as_str()))
            })
    }

    /// Join tables with a many-to-many column into `target`, with that column
    pub fn referencing_joins<'a>(
        &'a self,
        target: &'a str,
    ) -> impl Iterator<Item = (&'a TableDescriptor, &'a str)> + 'a {
        self.tables
            .values()
            .filter(|t| t.kind == TableKind::Join)
            .flat_map(move |t| {
                t.many_to_many
                    .iter()
                    .filter(move |(_, related)| related.as_str() == target)
                    .map(move |(column, _)| (t, column.as_str()))
            })
    }
}
