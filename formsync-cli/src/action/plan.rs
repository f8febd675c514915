//! Mutation planning
//!
//! Converts an original/new snapshot pair into the inserts, updates and
//! deletes a node needs. Planning is pure; nothing is sent to the store.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::graph::is_placeholder;
use crate::record::{ID_FIELD, Record, Snapshot, id_key, is_truthy, record_id};

/// Whether a node as a whole represents pre-existing data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Insert,
    Update,
}

impl ChangeType {
    /// `Update` when there is original data, `Insert` otherwise
    pub fn of(original: &Snapshot) -> Self {
        if original.is_empty() {
            ChangeType::Insert
        } else {
            ChangeType::Update
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Insert => "Insert",
            Self::Update => "Update",
        }
    }
}

/// A row to insert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedInsert {
    /// Placeholder id the row was known by; results are stored under it
    pub key: String,
    /// Row without its placeholder id
    pub payload: Record,
}

/// A sparse update of an existing row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedUpdate {
    pub id: Value,
    /// Only the fields that changed
    pub changes: Record,
}

impl PlannedUpdate {
    /// Key the update result is stored under
    pub fn key(&self) -> String {
        id_key(&self.id)
    }
}

/// Everything one node will send to the store
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MutationPlan {
    pub inserts: Vec<PlannedInsert>,
    pub updates: Vec<PlannedUpdate>,
    /// Ids present originally but missing from the new data
    pub deletes: Vec<Value>,
}

impl MutationPlan {
    pub fn total_ops(&self) -> usize {
        self.inserts.len() + self.updates.len() + self.deletes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inserts.is_empty() && self.updates.is_empty() && self.deletes.is_empty()
    }
}

/// Build the mutation plan for one node.
///
/// `new` is `None` when the node has no desired data this cycle, which
/// plans nothing. Deletes are always computed; whether they run is up to
/// the caller's destructive setting.
pub fn build_plan(original: &Snapshot, new: Option<&Snapshot>, change_type: ChangeType) -> MutationPlan {
    let Some(new) = new else {
        return MutationPlan::default();
    };

    let original_rows = original.clone().into_rows();
    let new_rows = new.clone().into_rows();

    let new_ids: Vec<&Value> = new_rows.iter().filter_map(record_id).collect();
    let deletes = original_rows
        .iter()
        .filter_map(record_id)
        .filter(|id| !new_ids.contains(id))
        .cloned()
        .collect();

    let mut updates = Vec::new();
    if change_type == ChangeType::Update {
        for new_row in &new_rows {
            let Some(id) = record_id(new_row) else {
                continue;
            };
            let Some(original_row) = original_rows.iter().find(|r| record_id(r) == Some(id)) else {
                continue;
            };
            let changes = diff_fields(original_row, new_row);
            if !changes.is_empty() {
                updates.push(PlannedUpdate {
                    id: id.clone(),
                    changes,
                });
            }
        }
    }

    let inserts = new_rows
        .into_iter()
        .filter_map(|mut row| {
            let id = row.get(ID_FIELD).filter(|id| is_placeholder(id))?;
            let key = id_key(id);
            row.remove(ID_FIELD);
            Some(PlannedInsert { key, payload: row })
        })
        .collect();

    MutationPlan {
        inserts,
        updates,
        deletes,
    }
}

/// Fields of `original_row` whose new value is set and differs.
///
/// Fields only present in `new_row` are never part of an update.
fn diff_fields(original_row: &Record, new_row: &Record) -> Record {
    original_row
        .iter()
        .filter(|(key, _)| key.as_str() != ID_FIELD)
        .filter_map(|(key, value)| {
            let new_value = new_row.get(key).filter(|v| is_truthy(v) && *v != value)?;
            Some((key.clone(), new_value.clone()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn snapshot(value: Value) -> Snapshot {
        serde_json::from_value(value).unwrap()
    }

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_change_type() {
        assert_eq!(ChangeType::of(&Snapshot::empty()), ChangeType::Insert);
        assert_eq!(ChangeType::of(&snapshot(json!([]))), ChangeType::Insert);
        assert_eq!(ChangeType::of(&snapshot(json!({"id": 1}))), ChangeType::Update);
        assert_eq!(ChangeType::of(&snapshot(json!([{"id": 1}]))), ChangeType::Update);
    }

    #[test]
    fn test_single_record_update() {
        let original = snapshot(json!({"id": 1, "name": "A"}));
        let new = snapshot(json!({"id": 1, "name": "B"}));
        let plan = build_plan(&original, Some(&new), ChangeType::of(&original));

        assert!(plan.inserts.is_empty());
        assert!(plan.deletes.is_empty());
        assert_eq!(
            plan.updates,
            vec![PlannedUpdate {
                id: json!(1),
                changes: record(json!({"name": "B"})),
            }]
        );
    }

    #[test]
    fn test_single_record_insert_strips_placeholder() {
        let original = Snapshot::empty();
        let new = snapshot(json!({"id": "new_abc", "name": "X"}));
        let plan = build_plan(&original, Some(&new), ChangeType::of(&original));

        assert_eq!(
            plan.inserts,
            vec![PlannedInsert {
                key: "new_abc".to_string(),
                payload: record(json!({"name": "X"})),
            }]
        );
        assert!(plan.updates.is_empty());
        assert!(plan.deletes.is_empty());
    }

    #[test]
    fn test_unchanged_rows_are_skipped() {
        let original = snapshot(json!([{"id": 1, "name": "A"}, {"id": 2, "name": "B"}]));
        let new = snapshot(json!([{"id": 1, "name": "A"}, {"id": 2, "name": "C"}]));
        let plan = build_plan(&original, Some(&new), ChangeType::Update);

        assert_eq!(plan.updates.len(), 1);
        assert_eq!(plan.updates[0].id, json!(2));
        assert_eq!(plan.updates[0].key(), "2");
    }

    #[test]
    fn test_falsy_values_are_not_updates() {
        let original = snapshot(json!({"id": 1, "name": "A", "active": true, "count": 4}));
        let new = snapshot(json!({"id": 1, "name": "", "active": false, "count": 0}));
        let plan = build_plan(&original, Some(&new), ChangeType::Update);
        assert!(plan.is_empty());
    }

    #[test]
    fn test_fields_missing_from_original_are_not_updates() {
        let original = snapshot(json!({"id": 1, "name": "A"}));
        let new = snapshot(json!({"id": 1, "name": "A", "email": "a@example.com"}));
        let plan = build_plan(&original, Some(&new), ChangeType::Update);
        assert!(plan.updates.is_empty());

        let new = snapshot(json!({"id": 1, "name": "B", "email": "a@example.com"}));
        let plan = build_plan(&original, Some(&new), ChangeType::Update);
        assert_eq!(plan.updates[0].changes, record(json!({"name": "B"})));
    }

    #[test]
    fn test_deletes_are_originals_missing_from_new() {
        let original = snapshot(json!([{"id": 1}, {"id": 2}, {"id": 3}, {"name": "no id"}]));
        let new = snapshot(json!([{"id": 2}, {"id": "new_x", "name": "fresh"}]));
        let plan = build_plan(&original, Some(&new), ChangeType::Update);

        assert_eq!(plan.deletes, vec![json!(1), json!(3)]);
        assert_eq!(plan.inserts.len(), 1);
        assert_eq!(plan.total_ops(), 3);
    }

    #[test]
    fn test_insert_mode_skips_updates() {
        // Without original data nothing can be an update, even with durable ids
        let new = snapshot(json!([{"id": 5, "name": "linked"}]));
        let plan = build_plan(&Snapshot::empty(), Some(&new), ChangeType::Insert);
        assert!(plan.is_empty());
    }

    #[test]
    fn test_absent_new_plans_nothing() {
        let original = snapshot(json!([{"id": 1}]));
        let plan = build_plan(&original, None, ChangeType::Update);
        assert!(plan.is_empty());
    }

    #[test]
    fn test_numeric_ids_are_never_placeholders() {
        let new = snapshot(json!([{"id": 7, "name": "x"}]));
        let plan = build_plan(&Snapshot::empty(), Some(&new), ChangeType::Insert);
        assert!(plan.inserts.is_empty());
    }
}
