//! Entity graph
//!
//! An arena of [`EntityNode`]s addressed by [`NodeId`]. Nodes are wired
//! together by three kinds of edges:
//! - a parent edge: the node's data is nested at a dot path inside its
//!   parent's raw record
//! - child edges: a nested node supplies one of this node's FK columns
//! - sibling edges: a peer node whose id fills one of this node's relation
//!   columns
//!
//! Submitting walks the nodes in dependency order, persists each one and
//! folds the results back so later nodes see real ids.

pub mod builder;
pub mod derive;
pub mod node;
pub mod placeholder;
pub mod relations;
pub mod schedule;
pub mod submit;

use std::fmt;
use std::sync::Arc;

use log::debug;
use serde::Serialize;
use serde_json::Value;

use crate::path::{DotPath, get_path_mut};
use crate::record::{Record, Snapshot};
use crate::schema::TableDescriptor;
use crate::store::TableActions;

pub use builder::GraphBuilder;
pub use node::{EntityNode, ParentEdge, Side};
pub use placeholder::{NEW_ROW_PREFIX, PlaceholderIds, is_placeholder};
pub use relations::{RESOLUTION_ORDER, RelationStrategy};
pub use schedule::{CycleError, ScheduleOrder};
pub use submit::{NodePlan, NodeReport, SubmitOptions, SubmitReport};

/// Handle of a node inside a [`Graph`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Errors raised while assembling or scheduling a graph
#[derive(Debug, Clone, PartialEq)]
pub enum GraphError {
    UnknownNode(NodeId),
    UnknownTable(String),
    DuplicateTable(String),
    /// The node already has a parent
    AlreadyAttached { child: NodeId },
    /// Attaching would make a node its own ancestor
    ParentCycle { parent: NodeId, child: NodeId },
    InvalidPath(String),
    Cycle(CycleError),
}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphError::UnknownNode(id) => write!(f, "Unknown node {}", id),
            GraphError::UnknownTable(name) => write!(f, "Unknown table '{}'", name),
            GraphError::DuplicateTable(name) => write!(f, "Table '{}' is defined twice", name),
            GraphError::AlreadyAttached { child } => {
                write!(f, "Node {} is already attached to a parent", child)
            }
            GraphError::ParentCycle { parent, child } => write!(
                f,
                "Attaching node {} under {} would create a parent cycle",
                child, parent
            ),
            GraphError::InvalidPath(msg) => write!(f, "Invalid data key: {}", msg),
            GraphError::Cycle(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for GraphError {}

impl From<CycleError> for GraphError {
    fn from(err: CycleError) -> Self {
        GraphError::Cycle(err)
    }
}

/// The node arena plus the named roots
#[derive(Debug, Default)]
pub struct Graph {
    nodes: Vec<EntityNode>,
    roots: Vec<(String, NodeId)>,
    placeholders: PlaceholderIds,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a detached node
    pub fn add_node(&mut self, table: TableDescriptor, actions: Arc<dyn TableActions>) -> NodeId {
        let id = NodeId(self.nodes.len());
        debug!("Adding node {} for table {}", id, table.name);
        self.nodes.push(EntityNode::new(table, actions));
        id
    }

    /// Add a node and register it as a root under its table name
    pub fn add_root(&mut self, table: TableDescriptor, actions: Arc<dyn TableActions>) -> NodeId {
        let id = self.add_node(table, actions);
        let name = self.nodes[id.0].table.name.clone();
        self.roots.retain(|(root, _)| *root != name);
        self.roots.push((name, id));
        id
    }

    /// Root node registered for `table`
    pub fn root(&self, table: &str) -> Option<NodeId> {
        self.roots
            .iter()
            .find(|(name, _)| name == table)
            .map(|(_, id)| *id)
    }

    pub fn roots(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.roots.iter().map(|(_, id)| *id)
    }

    pub fn node(&self, id: NodeId) -> Result<&EntityNode, GraphError> {
        self.nodes.get(id.0).ok_or(GraphError::UnknownNode(id))
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> Result<&mut EntityNode, GraphError> {
        self.nodes.get_mut(id.0).ok_or(GraphError::UnknownNode(id))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// First node (in flatten order) owning `table`
    pub fn find_table(&self, table: &str) -> Option<NodeId> {
        self.flatten()
            .into_iter()
            .find(|id| self.nodes[id.0].table.name == table)
    }

    /// Nest `child`'s data under `data_key` in `parent`'s records.
    ///
    /// The root key of `data_key` is stripped from the parent's outgoing
    /// records. With `fk_column`, the child also supplies that column of
    /// the parent (one-to-many edge).
    pub fn attach_child(
        &mut self,
        parent: NodeId,
        child: NodeId,
        data_key: &str,
        fk_column: Option<&str>,
    ) -> Result<(), GraphError> {
        self.node(parent)?;
        if self.node(child)?.parent_edge.is_some() {
            return Err(GraphError::AlreadyAttached { child });
        }
        if parent == child || self.ancestors(parent).contains(&child) {
            return Err(GraphError::ParentCycle { parent, child });
        }
        let path = DotPath::parse(data_key).map_err(GraphError::InvalidPath)?;

        let parent_node = self.node_mut(parent)?;
        parent_node.excluded_fields.insert(path.root().to_string());
        if !parent_node.children.contains(&child) {
            parent_node.children.push(child);
        }
        if let Some(column) = fk_column {
            parent_node.child_edges.insert(column.to_string(), child);
        }
        self.node_mut(child)?.parent_edge = Some(ParentEdge { parent, path });
        Ok(())
    }

    /// Let `related` fill `column` of `node` (many-to-one / many-to-many peer)
    pub fn attach_sibling(&mut self, node: NodeId, related: NodeId, column: &str) -> Result<(), GraphError> {
        self.node(related)?;
        let entry = self.node_mut(node)?;
        entry.sibling_edges.insert(column.to_string(), related);
        if !entry.children.contains(&related) {
            entry.children.push(related);
        }
        Ok(())
    }

    fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut ancestors = Vec::new();
        let mut current = self.nodes.get(id.0).and_then(|n| n.parent_edge.as_ref());
        while let Some(edge) = current {
            if ancestors.contains(&edge.parent) {
                break;
            }
            ancestors.push(edge.parent);
            current = self.nodes.get(edge.parent.0).and_then(|n| n.parent_edge.as_ref());
        }
        ancestors
    }

    /// Store the last known persisted data of a node
    pub fn set_original(&mut self, id: NodeId, snapshot: Snapshot) -> Result<(), GraphError> {
        self.node_mut(id)?.raw_original = Some(snapshot);
        Ok(())
    }

    /// Store the desired data of a node and assign placeholder ids to it
    pub fn set_new(&mut self, id: NodeId, snapshot: Snapshot) -> Result<(), GraphError> {
        self.node_mut(id)?.raw_new = Some(snapshot);
        self.assign_placeholder_ids(id)?;
        Ok(())
    }

    /// Drop the desired data of a node
    pub fn clear_new(&mut self, id: NodeId) -> Result<(), GraphError> {
        self.node_mut(id)?.raw_new = None;
        Ok(())
    }

    /// Give every id-less record of the node's raw new data a placeholder
    /// id, including the slices of descendants nested inside it.
    ///
    /// Returns the number of ids assigned. Running it again assigns nothing.
    pub fn assign_placeholder_ids(&mut self, id: NodeId) -> Result<usize, GraphError> {
        let Some(mut snapshot) = self.node_mut(id)?.raw_new.take() else {
            return Ok(0);
        };
        let mut assigned = self.placeholders.assign_snapshot(&mut snapshot);
        if let Snapshot::Record(record) = &mut snapshot {
            let mut visited = vec![id];
            assigned += assign_nested(&self.nodes, &mut self.placeholders, id, record, &mut visited);
        }
        self.nodes[id.0].raw_new = Some(snapshot);
        if assigned > 0 {
            debug!("Assigned {} placeholder ids under {}", assigned, self.nodes[id.0].table.name);
        }
        Ok(assigned)
    }

    /// Every root plus everything reachable through child and sibling
    /// edges, each node once, in first-seen order
    pub fn flatten(&self) -> Vec<NodeId> {
        let mut seen = Vec::new();
        let mut stack: Vec<NodeId> = self.roots().collect();
        stack.reverse();
        while let Some(id) = stack.pop() {
            if seen.contains(&id) {
                continue;
            }
            seen.push(id);
            if let Some(node) = self.nodes.get(id.0) {
                stack.extend(node.children.iter().rev().copied());
            }
        }
        seen
    }
}

/// Assign ids in the slices of `id`'s descendants that live inside `record`
/// and have no raw data of their own
fn assign_nested(
    nodes: &[EntityNode],
    placeholders: &mut PlaceholderIds,
    id: NodeId,
    record: &mut Record,
    visited: &mut Vec<NodeId>,
) -> usize {
    let mut assigned = 0;
    for child in &nodes[id.0].children {
        let child_node = &nodes[child.0];
        let Some(edge) = child_node.parent_edge.as_ref().filter(|e| e.parent == id) else {
            continue;
        };
        if child_node.raw_new.is_some() || visited.contains(child) {
            continue;
        }
        let Some(slot) = get_path_mut(record, &edge.path) else {
            continue;
        };
        assigned += placeholders.assign_value(slot);
        if let Value::Object(nested) = slot {
            visited.push(*child);
            assigned += assign_nested(nodes, placeholders, *child, nested, visited);
            visited.pop();
        }
    }
    assigned
}
