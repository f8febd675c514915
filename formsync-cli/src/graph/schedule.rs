//! Submit ordering
//!
//! Nodes whose table is referenced by another node's relation columns must
//! be persisted first, so the referencing rows can pick up real ids. The
//! default order is a topological sort of that dependency graph; the
//! single-pass greedy order is kept for graphs built around it.

use std::collections::{BTreeSet, HashMap, VecDeque};

use log::debug;
use serde::{Deserialize, Serialize};

use super::{Graph, NodeId};

/// How nodes are ordered for a submit cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleOrder {
    /// Kahn's algorithm over table references; cycles are an error
    #[default]
    Topological,
    /// One pass in flatten order: to the front when none of the node's
    /// referenced tables has been seen yet, to the back otherwise
    Greedy,
}

impl ScheduleOrder {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Topological => "topological",
            Self::Greedy => "greedy",
        }
    }
}

/// Error when table references form a cycle
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleError {
    pub tables: Vec<String>,
}

impl std::fmt::Display for CycleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Circular dependency detected involving: {}", self.tables.join(", "))
    }
}

impl std::error::Error for CycleError {}

/// Node dependencies derived from table references
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// Nodes in flatten order
    pub nodes: Vec<NodeId>,
    /// node -> nodes it references
    pub dependencies: HashMap<NodeId, BTreeSet<NodeId>>,
    /// node -> nodes referencing it
    pub dependents: HashMap<NodeId, BTreeSet<NodeId>>,
}

impl DependencyGraph {
    /// Build the dependency graph of every reachable node
    pub fn build(graph: &Graph) -> Self {
        let nodes = graph.flatten();
        let mut deps = DependencyGraph {
            nodes: nodes.clone(),
            ..Default::default()
        };

        for &id in &nodes {
            let table = &graph.nodes[id.0].table;
            let related = table.related_tables();
            let references: BTreeSet<NodeId> = nodes
                .iter()
                .copied()
                .filter(|other| {
                    let other_table = &graph.nodes[other.0].table.name;
                    // Self references never block a table
                    *other_table != table.name && related.contains(other_table.as_str())
                })
                .collect();

            for dep in &references {
                deps.dependents.entry(*dep).or_default().insert(id);
            }
            deps.dependencies.insert(id, references);
        }
        for &id in &nodes {
            deps.dependents.entry(id).or_default();
        }
        deps
    }

    /// Kahn's algorithm: referenced nodes first, ties broken by flatten order
    pub fn topological_sort(&self, graph: &Graph) -> Result<Vec<NodeId>, CycleError> {
        let mut remaining: HashMap<NodeId, usize> = self
            .dependencies
            .iter()
            .map(|(id, deps)| (*id, deps.len()))
            .collect();
        let position: HashMap<NodeId, usize> = self
            .nodes
            .iter()
            .enumerate()
            .map(|(i, id)| (*id, i))
            .collect();

        let mut queue: VecDeque<NodeId> = self
            .nodes
            .iter()
            .copied()
            .filter(|id| remaining.get(id) == Some(&0))
            .collect();
        let mut result = Vec::with_capacity(self.nodes.len());

        while let Some(id) = queue.pop_front() {
            result.push(id);

            let mut ready = Vec::new();
            if let Some(dependents) = self.dependents.get(&id) {
                for dependent in dependents {
                    if let Some(count) = remaining.get_mut(dependent) {
                        *count -= 1;
                        if *count == 0 {
                            ready.push(*dependent);
                        }
                    }
                }
            }
            ready.sort_by_key(|id| position.get(id).copied().unwrap_or(usize::MAX));
            queue.extend(ready);
        }

        if result.len() != self.nodes.len() {
            let mut tables: Vec<String> = self
                .nodes
                .iter()
                .filter(|id| !result.contains(id))
                .map(|id| graph.nodes[id.0].table.name.clone())
                .collect();
            tables.dedup();
            return Err(CycleError { tables });
        }

        Ok(result)
    }
}

/// Single-pass front/back placement in flatten order
pub fn greedy_order(graph: &Graph) -> Vec<NodeId> {
    let mut order = VecDeque::new();
    let mut tables_added: Vec<&str> = Vec::new();

    for id in graph.flatten() {
        let table = &graph.nodes[id.0].table;
        let blocked = table
            .related_tables()
            .iter()
            .any(|related| tables_added.contains(related));
        if blocked {
            order.push_back(id);
        } else {
            order.push_front(id);
        }
        tables_added.push(&table.name);
    }

    order.into()
}

impl Graph {
    /// Order in which a submit cycle visits the nodes
    pub fn schedule(&self, order: ScheduleOrder) -> Result<Vec<NodeId>, CycleError> {
        let scheduled = match order {
            ScheduleOrder::Topological => DependencyGraph::build(self).topological_sort(self)?,
            ScheduleOrder::Greedy => greedy_order(self),
        };
        debug!(
            "Scheduled {} nodes ({}): {}",
            scheduled.len(),
            order.label(),
            scheduled
                .iter()
                .map(|id| self.nodes[id.0].table.name.as_str())
                .collect::<Vec<_>>()
                .join(" -> ")
        );
        Ok(scheduled)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::schema::TableDescriptor;
    use crate::store::MemoryStore;

    fn table_names(graph: &Graph, order: &[NodeId]) -> Vec<String> {
        order
            .iter()
            .map(|id| graph.node(*id).unwrap().name().to_string())
            .collect()
    }

    /// users -> orgs (nested), posts -> users (nested rows)
    fn sample_graph() -> Graph {
        let store = MemoryStore::new();
        let mut graph = Graph::new();
        let users = graph.add_root(
            TableDescriptor::entity("users").with_many_to_one("org_id", "orgs"),
            Arc::new(store.table("users")),
        );
        let orgs = graph.add_node(TableDescriptor::entity("orgs"), Arc::new(store.table("orgs")));
        let posts = graph.add_node(
            TableDescriptor::entity("posts")
                .with_many_to_one("user_id", "users")
                .with_many_to_one("parent_id", "posts"),
            Arc::new(store.table("posts")),
        );
        graph.attach_child(users, orgs, "org", Some("org_id")).unwrap();
        graph.attach_child(users, posts, "posts", None).unwrap();
        graph.attach_sibling(posts, users, "user_id").unwrap();
        graph
    }

    #[test]
    fn test_topological_puts_referenced_tables_first() {
        let graph = sample_graph();
        let order = graph.schedule(ScheduleOrder::Topological).unwrap();
        assert_eq!(table_names(&graph, &order), vec!["orgs", "users", "posts"]);
    }

    #[test]
    fn test_greedy_order() {
        let graph = sample_graph();
        // users: nothing seen yet -> front; orgs: references nothing -> front;
        // posts: references users, already seen -> back
        let order = graph.schedule(ScheduleOrder::Greedy).unwrap();
        assert_eq!(table_names(&graph, &order), vec!["orgs", "users", "posts"]);
    }

    #[test]
    fn test_greedy_can_misorder_chains() {
        let store = MemoryStore::new();
        let mut graph = Graph::new();
        // a -> b -> c, visited as c, a, b
        let c = graph.add_root(TableDescriptor::entity("c"), Arc::new(store.table("c")));
        let a = graph.add_root(
            TableDescriptor::entity("a").with_many_to_one("b_id", "b"),
            Arc::new(store.table("a")),
        );
        let b = graph.add_root(
            TableDescriptor::entity("b").with_many_to_one("c_id", "c"),
            Arc::new(store.table("b")),
        );
        graph.attach_sibling(a, b, "b_id").unwrap();
        graph.attach_sibling(b, c, "c_id").unwrap();

        let greedy = graph.schedule(ScheduleOrder::Greedy).unwrap();
        assert_eq!(table_names(&graph, &greedy), vec!["a", "c", "b"]);

        let topo = graph.schedule(ScheduleOrder::Topological).unwrap();
        assert_eq!(table_names(&graph, &topo), vec!["c", "b", "a"]);
    }

    #[test]
    fn test_cycle_is_reported() {
        let store = MemoryStore::new();
        let mut graph = Graph::new();
        let a = graph.add_root(
            TableDescriptor::entity("a").with_many_to_one("b_id", "b"),
            Arc::new(store.table("a")),
        );
        let b = graph.add_root(
            TableDescriptor::entity("b").with_many_to_one("a_id", "a"),
            Arc::new(store.table("b")),
        );
        graph.add_root(TableDescriptor::entity("c"), Arc::new(store.table("c")));
        graph.attach_sibling(a, b, "b_id").unwrap();
        graph.attach_sibling(b, a, "a_id").unwrap();

        let err = graph.schedule(ScheduleOrder::Topological).unwrap_err();
        assert_eq!(err.tables, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(err.to_string(), "Circular dependency detected involving: a, b");

        // Greedy never fails
        assert_eq!(graph.schedule(ScheduleOrder::Greedy).unwrap().len(), 3);
    }

    #[test]
    fn test_self_reference_ignored() {
        let graph = sample_graph();
        let deps = DependencyGraph::build(&graph);
        let posts = graph.find_table("posts").unwrap();
        let users = graph.find_table("users").unwrap();
        assert_eq!(deps.dependencies[&posts], BTreeSet::from([users]));
    }
}
