//! Derived views of a node's snapshots
//!
//! Reading a node never mutates it. The effective raw data is the node's
//! own raw snapshot, or the slice at its registered path inside the
//! parent's effective raw record. Relation columns are then resolved and
//! the nested-slice keys stripped.

use std::collections::BTreeMap;

use super::node::Side;
use super::relations::{RelatedView, resolve_column};
use super::{Graph, GraphError, NodeId};
use crate::action::{ChangeType, MutationPlan, build_plan};
use crate::path::get_path;
use crate::record::Snapshot;

impl Graph {
    /// The raw data a node works from, before relation resolution
    pub fn effective_raw(&self, id: NodeId, side: Side) -> Result<Option<Snapshot>, GraphError> {
        self.node(id)?;
        Ok(self.effective_raw_inner(id, side, &mut Vec::new()))
    }

    fn effective_raw_inner(&self, id: NodeId, side: Side, seen: &mut Vec<NodeId>) -> Option<Snapshot> {
        let node = self.nodes.get(id.0)?;
        let own = match side {
            Side::Original => node.raw_original.as_ref(),
            Side::New => node.raw_new.as_ref(),
        };
        if let Some(snapshot) = own {
            return Some(snapshot.clone());
        }
        let edge = node.parent_edge.as_ref()?;
        if seen.contains(&id) {
            return None;
        }
        seen.push(id);
        let parent = self.effective_raw_inner(edge.parent, side, seen)?;
        match parent {
            Snapshot::Record(record) => get_path(&record, &edge.path).and_then(Snapshot::from_value),
            Snapshot::Rows(_) => None,
        }
    }

    /// Derived view of one side of a node.
    ///
    /// `None` means there is no data at all for that side; the original side
    /// is usually read through [`Graph::derived_original`] which turns that
    /// into an empty record.
    pub fn derive(&self, id: NodeId, side: Side) -> Result<Option<Snapshot>, GraphError> {
        self.node(id)?;
        Ok(self.derive_inner(id, side, &mut Vec::new()))
    }

    /// Derived original data, an empty record when nothing is known
    pub fn derived_original(&self, id: NodeId) -> Result<Snapshot, GraphError> {
        Ok(self.derive(id, Side::Original)?.unwrap_or_default())
    }

    /// Derived new data; `None` when the node has nothing to write
    pub fn derived_new(&self, id: NodeId) -> Result<Option<Snapshot>, GraphError> {
        self.derive(id, Side::New)
    }

    pub fn change_type(&self, id: NodeId) -> Result<ChangeType, GraphError> {
        Ok(ChangeType::of(&self.derived_original(id)?))
    }

    /// A node holds rows when either derived side is a row list
    pub fn is_rows(&self, id: NodeId) -> Result<bool, GraphError> {
        let original = self.derived_original(id)?;
        let new = self.derived_new(id)?;
        Ok(original.is_rows() || new.is_some_and(|s| s.is_rows()))
    }

    /// Mutations the node would send if submitted now
    pub fn plan(&self, id: NodeId) -> Result<MutationPlan, GraphError> {
        let original = self.derived_original(id)?;
        let new = self.derived_new(id)?;
        Ok(build_plan(&original, new.as_ref(), ChangeType::of(&original)))
    }

    fn derive_inner(&self, id: NodeId, side: Side, visiting: &mut Vec<NodeId>) -> Option<Snapshot> {
        let raw = self.effective_raw_inner(id, side, &mut Vec::new());
        let mut snapshot = match (raw, side) {
            (Some(snapshot), _) => snapshot,
            (None, Side::Original) => Snapshot::empty(),
            (None, Side::New) => return None,
        };
        let Some(node) = self.nodes.get(id.0) else {
            return Some(snapshot);
        };
        if visiting.contains(&id) {
            return Some(snapshot);
        }
        visiting.push(id);

        let columns = node.table.relation_columns();
        let mut passes: Vec<(&BTreeMap<String, NodeId>, bool)> = vec![(&node.sibling_edges, !node.table.is_join())];
        if !node.table.is_join() {
            passes.push((&node.child_edges, true));
        }

        for (edges, is_child) in passes {
            for (column, related_id) in edges {
                if !columns.contains_key(column) {
                    continue;
                }
                let Some(related) = self.nodes.get(related_id.0) else {
                    continue;
                };
                let related_original = self
                    .derive_inner(*related_id, Side::Original, visiting)
                    .unwrap_or_default();
                let related_new = self.derive_inner(*related_id, Side::New, visiting);
                let view = RelatedView {
                    results: &related.results,
                    original: &related_original,
                    new: related_new.as_ref(),
                };
                let nested_path = if is_child {
                    related.parent_edge.as_ref().map(|edge| &edge.path)
                } else {
                    None
                };
                for record in snapshot.records_mut() {
                    resolve_column(record, column, nested_path, &view);
                }
            }
        }

        if !node.excluded_fields.is_empty() {
            for record in snapshot.records_mut() {
                record.retain(|key, _| !node.excluded_fields.contains(key));
            }
        }

        visiting.pop();
        Some(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::graph::is_placeholder;
    use crate::record::Record;
    use crate::schema::TableDescriptor;
    use crate::store::MemoryStore;
    use serde_json::{Value, json};

    fn snapshot(value: Value) -> Snapshot {
        serde_json::from_value(value).unwrap()
    }

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    /// users (root) with a nested org supplying org_id and nested posts rows
    fn users_graph() -> (Graph, NodeId, NodeId, NodeId) {
        let store = MemoryStore::new();
        let mut graph = Graph::new();
        let users = graph.add_root(
            TableDescriptor::entity("users").with_many_to_one("org_id", "orgs"),
            Arc::new(store.table("users")),
        );
        let orgs = graph.add_node(TableDescriptor::entity("orgs"), Arc::new(store.table("orgs")));
        let posts = graph.add_node(
            TableDescriptor::entity("posts").with_many_to_one("user_id", "users"),
            Arc::new(store.table("posts")),
        );
        graph.attach_child(users, orgs, "org", Some("org_id")).unwrap();
        graph.attach_child(users, posts, "posts", None).unwrap();
        graph.attach_sibling(posts, users, "user_id").unwrap();
        (graph, users, orgs, posts)
    }

    #[test]
    fn test_child_reads_parent_slice() {
        let (mut graph, users, orgs, posts) = users_graph();
        graph
            .set_original(
                users,
                snapshot(json!({"id": 1, "org": {"id": 4, "name": "Acme"}, "posts": [{"id": 8, "user_id": 1}]})),
            )
            .unwrap();

        assert_eq!(graph.derived_original(orgs).unwrap(), snapshot(json!({"id": 4, "name": "Acme"})));
        assert_eq!(graph.derived_original(posts).unwrap(), snapshot(json!([{"id": 8, "user_id": 1}])));
        assert_eq!(graph.derived_new(orgs).unwrap(), None);
        assert!(graph.is_rows(posts).unwrap());
        assert!(!graph.is_rows(orgs).unwrap());
    }

    #[test]
    fn test_parent_strips_nested_and_takes_child_id() {
        let (mut graph, users, _, _) = users_graph();
        graph
            .set_original(users, snapshot(json!({"id": 1, "name": "Ann", "org": {"id": 4}, "posts": []})))
            .unwrap();
        assert_eq!(
            graph.derived_original(users).unwrap(),
            snapshot(json!({"id": 1, "name": "Ann", "org_id": 4}))
        );
    }

    #[test]
    fn test_derive_new_is_stable() {
        let (mut graph, users, orgs, posts) = users_graph();
        graph
            .set_new(users, snapshot(json!({"name": "Ann", "org": {"name": "Acme"}, "posts": [{"title": "t"}]})))
            .unwrap();

        let first = graph.derived_new(users).unwrap();
        let second = graph.derived_new(users).unwrap();
        assert_eq!(first, second);
        assert_eq!(graph.derived_new(orgs).unwrap(), graph.derived_new(orgs).unwrap());

        let user = first.unwrap();
        let org = graph.derived_new(orgs).unwrap().unwrap();
        // The user's FK points at the org's placeholder until the org is saved
        assert_eq!(user.records().next().unwrap().get("org_id"), org.id());
        assert!(is_placeholder(org.id().unwrap()));

        let post_rows = graph.derived_new(posts).unwrap().unwrap().into_rows();
        assert_eq!(post_rows[0].get("user_id"), user.id());
    }

    #[test]
    fn test_insert_results_resolve_children() {
        let (mut graph, users, orgs, _) = users_graph();
        graph.set_new(users, snapshot(json!({"name": "Ann", "org": {"name": "Acme"}}))).unwrap();
        let org_key = graph.derived_new(orgs).unwrap().unwrap().id().cloned().unwrap();

        graph
            .node_mut(orgs)
            .unwrap()
            .results
            .inserts
            .insert(org_key.as_str().unwrap(), record(json!({"id": 7, "name": "Acme"})));

        let user = graph.derived_new(users).unwrap().unwrap();
        assert_eq!(user.records().next().unwrap()["org_id"], json!(7));
    }

    #[test]
    fn test_absent_parent_slice() {
        let (mut graph, users, orgs, _) = users_graph();
        graph.set_new(users, snapshot(json!({"name": "Ann"}))).unwrap();
        assert_eq!(graph.derived_new(orgs).unwrap(), None);
        assert!(graph.plan(orgs).unwrap().is_empty());
        assert_eq!(graph.change_type(orgs).unwrap(), ChangeType::Insert);
    }

    #[test]
    fn test_own_raw_wins_over_parent() {
        let (mut graph, users, orgs, _) = users_graph();
        graph.set_original(users, snapshot(json!({"id": 1, "org": {"id": 4}}))).unwrap();
        graph.set_original(orgs, snapshot(json!({"id": 9}))).unwrap();
        assert_eq!(graph.derived_original(orgs).unwrap().id(), Some(&json!(9)));
    }

    #[test]
    fn test_join_resolves_many_to_many_only() {
        let store = MemoryStore::new();
        let mut graph = Graph::new();
        let users = graph.add_root(TableDescriptor::entity("users"), Arc::new(store.table("users")));
        let roles = graph.add_node(TableDescriptor::entity("roles"), Arc::new(store.table("roles")));
        let user_roles = graph.add_node(
            TableDescriptor::join("user_roles")
                .with_many_to_many("user_id", "users")
                .with_many_to_many("role_id", "roles")
                .with_many_to_one("granted_by", "users"),
            Arc::new(store.table("user_roles")),
        );
        graph.attach_child(users, user_roles, "user_roles", None).unwrap();
        graph.attach_sibling(user_roles, users, "user_id").unwrap();
        graph.attach_sibling(user_roles, roles, "role_id").unwrap();
        graph.attach_sibling(user_roles, users, "granted_by").unwrap();

        graph.set_original(users, snapshot(json!({"id": 3, "user_roles": []}))).unwrap();
        graph.set_original(roles, snapshot(json!({"id": 5}))).unwrap();
        graph
            .set_new(users, snapshot(json!({"id": 3, "user_roles": [{"granted_by": null}]})))
            .unwrap();

        let rows = graph.derived_new(user_roles).unwrap().unwrap().into_rows();
        assert_eq!(rows[0]["user_id"], json!(3));
        assert_eq!(rows[0]["role_id"], json!(5));
        assert_eq!(rows[0]["granted_by"], Value::Null);
    }

    #[test]
    fn test_mutual_relations_terminate() {
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
        graph.attach_sibling(a, b, "b_id").unwrap();
        graph.attach_sibling(b, a, "a_id").unwrap();
        graph.set_original(a, snapshot(json!({"id": 1}))).unwrap();
        graph.set_original(b, snapshot(json!({"id": 2}))).unwrap();

        assert_eq!(graph.derived_original(a).unwrap(), snapshot(json!({"id": 1, "b_id": 2})));
        assert_eq!(graph.derived_original(b).unwrap(), snapshot(json!({"id": 2, "a_id": 1})));
    }
}
