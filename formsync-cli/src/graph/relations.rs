//! Relation-id resolution
//!
//! A relation column that is empty or still holds a placeholder id is filled
//! from the related node. The strategies are tried in [`RESOLUTION_ORDER`];
//! the first one producing a non-empty id wins.

use log::debug;
use serde_json::Value;

use super::placeholder::is_placeholder;
use crate::action::NodeResults;
use crate::path::{DotPath, get_path, remove_path};
use crate::record::{ID_FIELD, Record, Snapshot, id_key, is_truthy};

/// One way of finding the id a relation column should hold
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationStrategy {
    /// The related node inserted a row under the column's placeholder id
    InsertLookup,
    /// The column is empty and the related node inserted rows: take the first
    SingletonInsert,
    /// The related node's original rows contain the column's value
    OriginalRowSearch,
    /// The related node is a single record: its new id, else its original id
    SingleRecordFallback,
}

/// Order in which strategies are tried
pub const RESOLUTION_ORDER: [RelationStrategy; 4] = [
    RelationStrategy::InsertLookup,
    RelationStrategy::SingletonInsert,
    RelationStrategy::OriginalRowSearch,
    RelationStrategy::SingleRecordFallback,
];

/// What a node can see of a related node while resolving
#[derive(Debug, Clone, Copy)]
pub struct RelatedView<'a> {
    pub results: &'a NodeResults,
    pub original: &'a Snapshot,
    pub new: Option<&'a Snapshot>,
}

impl RelationStrategy {
    /// Try this strategy for a column currently holding `current`
    pub fn resolve(&self, current: Option<&Value>, related: &RelatedView<'_>) -> Option<Value> {
        let current = current.filter(|value| is_truthy(value));
        let found = match self {
            RelationStrategy::InsertLookup => related
                .results
                .inserts
                .get(&id_key(current?))
                .and_then(|row| row.get(ID_FIELD)),
            RelationStrategy::SingletonInsert => {
                if current.is_some() {
                    return None;
                }
                related
                    .results
                    .inserts
                    .first()
                    .and_then(|(_, row)| row.get(ID_FIELD))
            }
            RelationStrategy::OriginalRowSearch => match related.original {
                Snapshot::Rows(rows) => {
                    let current = current?;
                    rows.iter()
                        .find_map(|row| row.get(ID_FIELD).filter(|id| *id == current))
                }
                Snapshot::Record(_) => None,
            },
            RelationStrategy::SingleRecordFallback => related
                .new
                .and_then(Snapshot::id)
                .or_else(|| related.original.id()),
        };
        found.filter(|id| is_truthy(id)).cloned()
    }
}

/// Run the strategies in order; the winning strategy and the id it found
pub fn resolve_relation(
    current: Option<&Value>,
    related: &RelatedView<'_>,
) -> Option<(RelationStrategy, Value)> {
    RESOLUTION_ORDER
        .iter()
        .find_map(|strategy| strategy.resolve(current, related).map(|id| (*strategy, id)))
}

/// Resolve `column` of `record` against a related node.
///
/// With `nested_path`, the related node's data is nested in the record: its
/// id (if any) is copied into the column and the nested value removed.
/// The column is then only touched when empty or a placeholder. Returns
/// true when the column was overwritten by a strategy.
pub fn resolve_column(
    record: &mut Record,
    column: &str,
    nested_path: Option<&DotPath>,
    related: &RelatedView<'_>,
) -> bool {
    if let Some(path) = nested_path {
        let nested_id = get_path(record, path)
            .and_then(|nested| nested.get(ID_FIELD))
            .filter(|id| is_truthy(id))
            .cloned();
        if let Some(id) = nested_id {
            record.insert(column.to_string(), id);
        }
        remove_path(record, path);
    }

    let current = record.get(column);
    let unresolved = current.is_none_or(|value| !is_truthy(value) || is_placeholder(value));
    if !unresolved {
        return false;
    }
    match resolve_relation(current, related) {
        Some((strategy, id)) => {
            debug!("Resolved {} to {} via {:?}", column, id_key(&id), strategy);
            record.insert(column.to_string(), id);
            true
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    fn snapshot(value: Value) -> Snapshot {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_insert_lookup_resolves_placeholder() {
        let mut results = NodeResults::default();
        results.inserts.insert("new_p", record(json!({"id": 7})));
        let original = Snapshot::empty();
        let related = RelatedView {
            results: &results,
            original: &original,
            new: None,
        };

        let mut row = record(json!({"parent_id": "new_p"}));
        assert!(resolve_column(&mut row, "parent_id", None, &related));
        assert_eq!(row["parent_id"], json!(7));
    }

    #[test]
    fn test_singleton_insert_only_for_empty_column() {
        let mut results = NodeResults::default();
        results.inserts.insert("new_a", record(json!({"id": 3})));
        results.inserts.insert("new_b", record(json!({"id": 4})));
        let original = Snapshot::empty();
        let related = RelatedView {
            results: &results,
            original: &original,
            new: None,
        };

        assert_eq!(
            resolve_relation(None, &related),
            Some((RelationStrategy::SingletonInsert, json!(3)))
        );
        assert_eq!(resolve_relation(Some(&json!("new_zzz")), &related), None);
    }

    #[test]
    fn test_original_row_search() {
        let results = NodeResults::default();
        let original = snapshot(json!([{"id": "new_kept"}, {"id": 2}]));
        let related = RelatedView {
            results: &results,
            original: &original,
            new: None,
        };
        assert_eq!(
            resolve_relation(Some(&json!("new_kept")), &related),
            Some((RelationStrategy::OriginalRowSearch, json!("new_kept")))
        );
    }

    #[test]
    fn test_single_record_fallback_prefers_new() {
        let results = NodeResults::default();
        let original = snapshot(json!({"id": 5}));
        let new = snapshot(json!({"id": 6}));
        let related = RelatedView {
            results: &results,
            original: &original,
            new: Some(&new),
        };
        assert_eq!(
            resolve_relation(None, &related),
            Some((RelationStrategy::SingleRecordFallback, json!(6)))
        );

        let related = RelatedView { new: None, ..related };
        assert_eq!(resolve_relation(None, &related).map(|(_, id)| id), Some(json!(5)));
    }

    #[test]
    fn test_durable_value_is_kept() {
        let results = NodeResults::default();
        let original = snapshot(json!({"id": 5}));
        let related = RelatedView {
            results: &results,
            original: &original,
            new: None,
        };
        let mut row = record(json!({"org_id": 11}));
        assert!(!resolve_column(&mut row, "org_id", None, &related));
        assert_eq!(row["org_id"], json!(11));
    }

    #[test]
    fn test_nested_value_is_flattened() {
        let results = NodeResults::default();
        let original = Snapshot::empty();
        let related = RelatedView {
            results: &results,
            original: &original,
            new: None,
        };
        let path = DotPath::parse("org").unwrap();

        let mut row = record(json!({"name": "Ann", "org": {"id": 12, "name": "Acme"}}));
        resolve_column(&mut row, "org_id", Some(&path), &related);
        assert_eq!(row, record(json!({"name": "Ann", "org_id": 12})));
    }

    #[test]
    fn test_unresolvable_column_unchanged() {
        let results = NodeResults::default();
        let original = Snapshot::empty();
        let related = RelatedView {
            results: &results,
            original: &original,
            new: None,
        };
        let mut row = record(json!({"org_id": "new_missing"}));
        assert!(!resolve_column(&mut row, "org_id", None, &related));
        assert_eq!(row["org_id"], json!("new_missing"));
    }
}
