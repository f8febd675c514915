//! Runs a mutation plan against a table's capability functions

use std::collections::BTreeMap;

use log::{debug, warn};
use serde_json::Value;

use super::plan::MutationPlan;
use super::results::{NodeError, NodeResults};
use crate::graph::is_placeholder;
use crate::record::{Record, id_key};
use crate::store::TableActions;

/// Execute `plan` in order: inserts one row per call, updates one row per
/// call, then a single delete batch when `destructive` is set.
///
/// Never fails as a whole. Every problem is recorded in the returned
/// results so the caller can decide whether to merge.
pub async fn execute_plan(
    plan: &MutationPlan,
    actions: &dyn TableActions,
    relation_columns: &BTreeMap<String, String>,
    destructive: bool,
) -> NodeResults {
    let mut results = NodeResults::default();

    for insert in &plan.inserts {
        if let Some(err) = unresolved_relation(&insert.key, &insert.payload, relation_columns) {
            results.errors.push(err);
            continue;
        }
        match actions.insert(vec![insert.payload.clone()]).await {
            Ok(response) => match response.first() {
                Some(row) => {
                    debug!("Inserted row {}", insert.key);
                    results.inserts.insert(insert.key.clone(), row.clone());
                }
                None => results.errors.push(NodeError::Insert {
                    key: insert.key.clone(),
                    response,
                }),
            },
            Err(e) => results.errors.push(NodeError::Transport {
                operation: "insert".to_string(),
                key: insert.key.clone(),
                message: format!("{:#}", e),
            }),
        }
    }

    for update in &plan.updates {
        let key = update.key();
        if let Some(err) = unresolved_relation(&key, &update.changes, relation_columns) {
            results.errors.push(err);
            continue;
        }
        match actions.update(update.changes.clone(), &update.id).await {
            Ok(response) => match response.first() {
                Some(row) => {
                    debug!("Updated row {}", key);
                    results.updates.insert(key, row.clone());
                }
                None => results.errors.push(NodeError::Update { key, response }),
            },
            Err(e) => results.errors.push(NodeError::Transport {
                operation: "update".to_string(),
                key,
                message: format!("{:#}", e),
            }),
        }
    }

    if destructive && !plan.deletes.is_empty() {
        match actions.delete(plan.deletes.clone()).await {
            Ok(true) => results.deleted_ids = plan.deletes.clone(),
            Ok(false) => results.errors.push(NodeError::Delete {
                ids: plan.deletes.clone(),
            }),
            Err(e) => {
                warn!("Delete batch failed: {:#}", e);
                results.errors.push(NodeError::Delete {
                    ids: plan.deletes.clone(),
                });
            }
        }
    } else if !plan.deletes.is_empty() {
        debug!(
            "Skipping delete of {} rows (not destructive)",
            plan.deletes.len()
        );
    }

    results
}

/// The first relation column of `row` still holding a placeholder id
fn unresolved_relation(
    key: &str,
    row: &Record,
    relation_columns: &BTreeMap<String, String>,
) -> Option<NodeError> {
    relation_columns.keys().find_map(|column| {
        let value = row.get(column).filter(|v| is_placeholder(v))?;
        Some(NodeError::UnresolvedRelation {
            key: key.to_string(),
            column: column.clone(),
            value: value.clone(),
        })
    })
}

/// Ids for log output
pub(crate) fn format_ids(ids: &[Value]) -> String {
    ids.iter().map(id_key).collect::<Vec<_>>().join(", ")
}
