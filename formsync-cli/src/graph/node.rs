//! Entity nodes: one table's data slice inside the graph

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use super::NodeId;
use crate::action::NodeResults;
use crate::path::DotPath;
use crate::record::Snapshot;
use crate::schema::TableDescriptor;
use crate::store::TableActions;

/// Which snapshot of a node is being read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// Last known persisted state
    Original,
    /// Desired state
    New,
}

/// Where a node's data lives inside its parent's raw record
#[derive(Debug, Clone, PartialEq)]
pub struct ParentEdge {
    pub parent: NodeId,
    pub path: DotPath,
}

/// One table's slice of the form.
///
/// Nodes are owned by a [`Graph`](super::Graph) and refer to each other by
/// [`NodeId`]. Raw snapshots are what the caller stored; reads go through
/// the graph's derivation, which falls back to the parent's data and
/// resolves relation columns.
pub struct EntityNode {
    pub(crate) table: TableDescriptor,
    pub(crate) actions: Arc<dyn TableActions>,
    pub(crate) raw_original: Option<Snapshot>,
    pub(crate) raw_new: Option<Snapshot>,
    pub(crate) parent_edge: Option<ParentEdge>,
    /// FK column -> node nested in this node's records that supplies it
    pub(crate) child_edges: BTreeMap<String, NodeId>,
    /// Relation column -> peer node
    pub(crate) sibling_edges: BTreeMap<String, NodeId>,
    /// Root keys of nested slices, stripped from outgoing records
    pub(crate) excluded_fields: BTreeSet<String>,
    /// Every attached node, in attachment order
    pub(crate) children: Vec<NodeId>,
    pub(crate) results: NodeResults,
}

impl EntityNode {
    pub(crate) fn new(table: TableDescriptor, actions: Arc<dyn TableActions>) -> Self {
        Self {
            table,
            actions,
            raw_original: None,
            raw_new: None,
            parent_edge: None,
            child_edges: BTreeMap::new(),
            sibling_edges: BTreeMap::new(),
            excluded_fields: BTreeSet::new(),
            children: Vec::new(),
            results: NodeResults::default(),
        }
    }

    pub fn table(&self) -> &TableDescriptor {
        &self.table
    }

    pub fn name(&self) -> &str {
        &self.table.name
    }

    pub fn raw_original(&self) -> Option<&Snapshot> {
        self.raw_original.as_ref()
    }

    pub fn raw_new(&self) -> Option<&Snapshot> {
        self.raw_new.as_ref()
    }

    pub fn parent_edge(&self) -> Option<&ParentEdge> {
        self.parent_edge.as_ref()
    }

    pub fn child_edges(&self) -> &BTreeMap<String, NodeId> {
        &self.child_edges
    }

    pub fn sibling_edges(&self) -> &BTreeMap<String, NodeId> {
        &self.sibling_edges
    }

    pub fn excluded_fields(&self) -> &BTreeSet<String> {
        &self.excluded_fields
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Results of the last submit cycle
    pub fn results(&self) -> &NodeResults {
        &self.results
    }

    pub fn actions(&self) -> &dyn TableActions {
        self.actions.as_ref()
    }
}

impl fmt::Debug for EntityNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityNode")
            .field("table", &self.table.name)
            .field("raw_original", &self.raw_original)
            .field("raw_new", &self.raw_new)
            .field("parent_edge", &self.parent_edge)
            .field("child_edges", &self.child_edges)
            .field("sibling_edges", &self.sibling_edges)
            .field("excluded_fields", &self.excluded_fields)
            .field("results", &self.results)
            .finish_non_exhaustive()
    }
}
