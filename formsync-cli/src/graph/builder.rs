//! Schema-driven graph assembly
//!
//! Starting from a root table, nodes are created for every table the form
//! can reach through the schema:
//! - many-to-one targets are nested single records (`org_id` -> `org`)
//! - entity tables referencing the current table are nested row lists
//!   under their table name
//! - join tables referencing the current table are nested row lists too
//!
//! A table referencing the current one through several columns gets one
//! row list, linked through the conventional `<singular>_id` column when it
//! has one.
//!
//! Row-list nodes are leaves: their relation columns are expected to hold
//! ids, apart from the column pointing back at the parent.

use log::debug;

use super::{Graph, GraphError, NodeId};
use crate::naming::{data_key_for_column, id_column_for_table};
use crate::schema::{Schema, TableDescriptor, TableKind};
use crate::store::Driver;

/// Builds a [`Graph`] from table descriptors
pub struct GraphBuilder<'a> {
    schema: &'a Schema,
    driver: &'a dyn Driver,
    graph: Graph,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(schema: &'a Schema, driver: &'a dyn Driver) -> Self {
        Self {
            schema,
            driver,
            graph: Graph::new(),
        }
    }

    /// Build the graph for a single root table
    pub fn from_schema(schema: &'a Schema, root: &str, driver: &'a dyn Driver) -> Result<Graph, GraphError> {
        let mut builder = Self::new(schema, driver);
        builder.add_root(root)?;
        Ok(builder.build())
    }

    /// Add `table` as a root and expand everything reachable from it
    pub fn add_root(&mut self, table: &str) -> Result<NodeId, GraphError> {
        let schema = self.schema;
        let descriptor = schema.require(table)?;
        let id = self
            .graph
            .add_root(descriptor.clone(), self.driver.actions_for(descriptor));
        let mut path = Vec::new();
        self.expand(id, descriptor, &mut path)?;
        debug!("Built graph for {} with {} nodes", table, self.graph.len());
        Ok(id)
    }

    pub fn build(self) -> Graph {
        self.graph
    }

    fn add_node(&mut self, table: &TableDescriptor) -> NodeId {
        self.graph
            .add_node(table.clone(), self.driver.actions_for(table))
    }

    fn expand(&mut self, id: NodeId, table: &'a TableDescriptor, path: &mut Vec<&'a str>) -> Result<(), GraphError> {
        let schema = self.schema;
        path.push(&table.name);

        match table.kind {
            TableKind::Entity => {
                for (column, target) in &table.many_to_one {
                    if path.contains(&target.as_str()) {
                        continue;
                    }
                    let target_table = schema.require(target)?;
                    let child = self.add_node(target_table);
                    self.graph
                        .attach_child(id, child, &data_key_for_column(column, target), Some(column))?;
                    self.expand(child, target_table, path)?;
                }

                let referencing: Vec<(&'a TableDescriptor, &'a str)> = schema
                    .referencing_entities(&table.name)
                    .chain(schema.referencing_joins(&table.name))
                    .filter(|(other, _)| !path.contains(&other.name.as_str()))
                    .collect();
                // One row list per table, even when it references us twice;
                // the conventional `<singular>_id` column wins
                let conventional = id_column_for_table(&table.name);
                let mut back_references: Vec<(&'a TableDescriptor, &'a str)> = Vec::new();
                for (other, column) in referencing {
                    match back_references.iter_mut().find(|(t, _)| t.name == other.name) {
                        Some(entry) if column == conventional => entry.1 = column,
                        Some(_) => {}
                        None => back_references.push((other, column)),
                    }
                }
                for (other, column) in back_references {
                    if self.has_nested(id, &other.name) {
                        continue;
                    }
                    let child = self.add_node(other);
                    self.graph.attach_child(id, child, &other.name, None)?;
                    self.graph.attach_sibling(child, id, column)?;
                }
            }
            TableKind::Join => {
                for (column, target) in &table.many_to_many {
                    if path.contains(&target.as_str()) {
                        continue;
                    }
                    let target_table = schema.require(target)?;
                    let child = self.add_node(target_table);
                    self.graph
                        .attach_child(id, child, &data_key_for_column(column, target), None)?;
                    self.graph.attach_sibling(id, child, column)?;
                    self.expand(child, target_table, path)?;
                }
            }
        }

        path.pop();
        Ok(())
    }

    fn has_nested(&self, id: NodeId, data_key: &str) -> bool {
        self.graph
            .node(id)
            .is_ok_and(|node| node.excluded_fields().contains(data_key))
    }
}
