//! Submit cycle
//!
//! One cycle: reset results, schedule, then per node plan -> execute ->
//! merge, and finally clear every node's new data. A failing node keeps its
//! original data untouched and never stops the remaining nodes.

use std::sync::Arc;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use super::schedule::ScheduleOrder;
use super::{Graph, GraphError, NodeId};
use crate::action::{ChangeType, MutationPlan, NodeError, execute_plan};
use crate::action::execute::format_ids;
use crate::path::remove_path;
use crate::record::{ID_FIELD, Snapshot, id_key};

/// Settings for a submit cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitOptions {
    /// Run delete batches for every table, not only tables marked destructive
    #[serde(default)]
    pub destructive: bool,
    #[serde(default)]
    pub order: ScheduleOrder,
}

/// What happened to one node during a cycle
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeReport {
    pub node: NodeId,
    pub table: String,
    pub change_type: ChangeType,
    pub inserted: usize,
    pub updated: usize,
    pub deleted: usize,
    pub errors: Vec<NodeError>,
    /// Whether persisted rows were folded back into the original data
    pub merged: bool,
}

impl NodeReport {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Outcome of a whole submit cycle
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SubmitReport {
    pub order: ScheduleOrder,
    /// Per node, in execution order
    pub nodes: Vec<NodeReport>,
}

impl SubmitReport {
    pub fn has_errors(&self) -> bool {
        self.nodes.iter().any(|n| !n.is_ok())
    }

    pub fn error_count(&self) -> usize {
        self.nodes.iter().map(|n| n.errors.len()).sum()
    }

    pub fn total_inserted(&self) -> usize {
        self.nodes.iter().map(|n| n.inserted).sum()
    }

    pub fn total_updated(&self) -> usize {
        self.nodes.iter().map(|n| n.updated).sum()
    }

    pub fn total_deleted(&self) -> usize {
        self.nodes.iter().map(|n| n.deleted).sum()
    }

    pub fn node(&self, table: &str) -> Option<&NodeReport> {
        self.nodes.iter().find(|n| n.table == table)
    }
}

/// Planned mutations of one node, for dry runs
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodePlan {
    pub node: NodeId,
    pub table: String,
    pub change_type: ChangeType,
    /// Whether the delete batch would actually run
    pub destructive: bool,
    pub plan: MutationPlan,
}

impl Graph {
    /// Plans for every node in schedule order, without touching the store
    pub fn preview(&self, options: &SubmitOptions) -> Result<Vec<NodePlan>, GraphError> {
        let order = self.schedule(options.order)?;
        order
            .into_iter()
            .map(|id| {
                let node = self.node(id)?;
                Ok(NodePlan {
                    node: id,
                    table: node.table.name.clone(),
                    change_type: self.change_type(id)?,
                    destructive: options.destructive || node.table.destructive,
                    plan: self.plan(id)?,
                })
            })
            .collect()
    }

    /// Run one submit cycle.
    ///
    /// Fails only when no schedule can be built; everything that goes wrong
    /// while persisting is reported per node.
    pub async fn submit(&mut self, options: &SubmitOptions) -> Result<SubmitReport, GraphError> {
        let nodes = self.flatten();
        for id in &nodes {
            self.node_mut(*id)?.results = Default::default();
        }
        let order = self.schedule(options.order)?;

        let mut report = SubmitReport {
            order: options.order,
            nodes: Vec::with_capacity(order.len()),
        };

        for id in order {
            let change_type = self.change_type(id)?;
            let plan = self.plan(id)?;
            let node = self.node(id)?;
            let table = node.table.name.clone();
            let columns = node.table.relation_columns().clone();
            let destructive = options.destructive || node.table.destructive;
            let actions = Arc::clone(&node.actions);

            debug!(
                "Submitting {} ({}): {} inserts, {} updates, {} deletes",
                table,
                change_type.label(),
                plan.inserts.len(),
                plan.updates.len(),
                plan.deletes.len()
            );
            let results = execute_plan(&plan, actions.as_ref(), &columns, destructive).await;
            for err in &results.errors {
                warn!("{}: {}", table, err);
            }
            if !results.deleted_ids.is_empty() {
                debug!("{}: deleted {}", table, format_ids(&results.deleted_ids));
            }
            self.node_mut(id)?.results = results;

            let merged = self.post_submit(id)?;
            let results = &self.node(id)?.results;
            report.nodes.push(NodeReport {
                node: id,
                table,
                change_type,
                inserted: results.inserts.len(),
                updated: results.updates.len(),
                deleted: results.deleted_ids.len(),
                errors: results.errors.clone(),
                merged,
            });
        }

        for id in &nodes {
            self.node_mut(*id)?.raw_new = None;
        }

        info!(
            "Submit finished: {} inserted, {} updated, {} deleted, {} errors",
            report.total_inserted(),
            report.total_updated(),
            report.total_deleted(),
            report.error_count()
        );
        Ok(report)
    }

    /// Fold the node's persisted rows back into its original data.
    ///
    /// Skipped when the node recorded errors. Nested children that still
    /// read their original from this node get it captured first, since
    /// the fold drops the slices they were reading. Rows nodes also drop
    /// the rows they deleted. Returns whether anything was merged.
    pub fn post_submit(&mut self, id: NodeId) -> Result<bool, GraphError> {
        let node = self.node(id)?;
        if node.results.has_errors() {
            debug!("{}: not merging, node has errors", node.table.name);
            return Ok(false);
        }
        let persisted = node.results.persisted();
        let deleted = node.results.deleted_ids.clone();
        if persisted.is_empty() && deleted.is_empty() {
            return Ok(false);
        }

        let nested: Vec<NodeId> = node
            .children
            .iter()
            .copied()
            .filter(|child| {
                self.nodes[child.0]
                    .parent_edge
                    .as_ref()
                    .is_some_and(|edge| edge.parent == id)
            })
            .collect();
        let mut nested_paths = Vec::with_capacity(nested.len());
        for child in nested {
            let child_node = self.node(child)?;
            if let Some(edge) = &child_node.parent_edge {
                nested_paths.push(edge.path.clone());
            }
            if child_node.raw_original.is_none() {
                let captured = self.derived_original(child)?;
                self.node_mut(child)?.raw_original = Some(captured);
            }
        }

        let merged = if self.is_rows(id)? {
            let mut rows = self.derived_original(id)?.into_rows();
            rows.retain(|row| row.get(ID_FIELD).is_none_or(|row_id| !deleted.contains(row_id)));
            for (key, record) in persisted.iter() {
                let persisted_id = record.get(ID_FIELD);
                rows.retain(|row| {
                    let row_id = row.get(ID_FIELD);
                    !(row_id.is_some_and(|r| id_key(r) == key)
                        || (persisted_id.is_some() && row_id == persisted_id))
                });
                rows.push(record.clone());
            }
            Snapshot::Rows(rows)
        } else {
            let mut base = match self.node(id)?.raw_original.clone() {
                Some(Snapshot::Record(record)) => record,
                _ => Default::default(),
            };
            for (_, record) in persisted.iter() {
                base.extend(record.clone());
            }
            // Children now hold their own original; a stale nested id would
            // otherwise win over the persisted FK column
            for path in &nested_paths {
                remove_path(&mut base, path);
            }
            Snapshot::Record(base)
        };

        let node = self.node_mut(id)?;
        debug!(
            "{}: merged {} persisted rows, dropped {} deleted",
            node.table.name,
            persisted.len(),
            deleted.len()
        );
        node.raw_original = Some(merged);
        Ok(true)
    }
}
