//! `formsync submit`: run one submit cycle for a form export

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use colored::*;
use log::debug;
use serde_json::{Value, json};

use super::read_json;
use crate::cli::SubmitArgs;
use formsync::config::Config;
use formsync::form::{GroomOptions, groom};
use formsync::graph::{Graph, GraphBuilder, NodeId, NodePlan, SubmitReport};
use formsync::record::{Record, Snapshot};
use formsync::store::{Backend, MemoryStore};

pub async fn handle_submit_command(args: SubmitArgs, config: &Config) -> Result<()> {
    let schema = config.schema()?;
    let root = config.root_table(args.root.as_deref())?;
    let options = config.submit_options(args.destructive, args.order);
    let store = config.store.connect()?;

    if let Some(seed) = &args.seed {
        let Backend::Memory(memory) = &store else {
            anyhow::bail!("--seed is only supported with the memory store");
        };
        seed_memory_store(memory, &read_json(seed)?).await?;
    }

    let mut graph = GraphBuilder::from_schema(&schema, &root, &store)
        .with_context(|| format!("Failed to build graph for '{}'", root))?;
    let root_id = graph
        .root(&root)
        .with_context(|| format!("Root table '{}' is not registered", root))?;

    let original = match &args.original {
        Some(path) => Some(
            Snapshot::from_value(&read_json(path)?)
                .with_context(|| format!("Original data must be an object or an array: {}", path.display()))?,
        ),
        None => None,
    };
    if let Some(original) = original.clone() {
        graph.set_original(root_id, original)?;
    }

    let form = read_json(&args.form)?;
    let new = form_snapshot(&form, original.as_ref(), &args.drop_fields)
        .with_context(|| format!("Form data must be an object or an array: {}", args.form.display()))?;
    graph.set_new(root_id, new)?;

    debug!(
        "Submitting '{}' via {} store ({} nodes)",
        root,
        store.label(),
        graph.len()
    );

    if args.dry_run {
        let plans = graph.preview(&options)?;
        if args.json {
            println!("{}", serde_json::to_string_pretty(&plans).context("Failed to format JSON output")?);
        } else {
            print_plans(&plans);
        }
        return Ok(());
    }

    let start = Instant::now();
    let timeout_secs = args.timeout_secs.or(config.submit.timeout_secs);
    let report = match timeout_secs {
        Some(secs) => tokio::time::timeout(Duration::from_secs(secs), graph.submit(&options))
            .await
            .with_context(|| format!("Submit did not finish within {}s", secs))??,
        None => graph.submit(&options).await?,
    };
    let elapsed = start.elapsed();

    if args.json {
        let output = json!({
            "report": report,
            "saved": saved_data(&graph, root_id)?,
        });
        println!("{}", serde_json::to_string_pretty(&output).context("Failed to format JSON output")?);
    } else {
        print_report(&report);
        println!(
            "Finished in {:.2}ms",
            elapsed.as_secs_f64() * 1000.0
        );
    }

    if report.has_errors() {
        anyhow::bail!("Submit finished with {} error(s)", report.error_count());
    }
    Ok(())
}

/// Turn the form file into the root's new data.
///
/// An object is groomed with the original record as defaults; an array is
/// taken as the new rows verbatim.
fn form_snapshot(form: &Value, original: Option<&Snapshot>, drop_fields: &[String]) -> Option<Snapshot> {
    match form {
        Value::Object(values) => {
            let defaults = match original {
                Some(Snapshot::Record(record)) => record.clone(),
                _ => Record::new(),
            };
            let options = drop_fields
                .iter()
                .fold(GroomOptions::new().with_defaults(defaults), |options, field| {
                    options.removing(field.as_str())
                });
            Some(Snapshot::Record(groom(values, &options)))
        }
        Value::Array(_) => Snapshot::from_value(form),
        _ => None,
    }
}

async fn seed_memory_store(store: &MemoryStore, seed: &Value) -> Result<()> {
    let tables = seed
        .as_object()
        .context("Seed data must map table names to arrays of rows")?;
    for (table, rows) in tables {
        let rows: Vec<Record> = serde_json::from_value(rows.clone())
            .with_context(|| format!("Seed rows for '{}' must be an array of objects", table))?;
        debug!("Seeding {} rows into '{}'", rows.len(), table);
        store.seed(table, rows).await;
    }
    Ok(())
}

fn saved_data(graph: &Graph, root: NodeId) -> Result<Value> {
    Ok(graph.derived_original(root)?.to_value())
}

fn print_plans(plans: &[NodePlan]) {
    println!("{}", "Planned mutations (dry run)".bold());
    for plan in plans {
        let deletes = if plan.plan.deletes.is_empty() {
            String::new()
        } else if plan.destructive {
            format!(", {} delete(s)", plan.plan.deletes.len())
        } else {
            format!(", {} delete(s) skipped", plan.plan.deletes.len())
        };
        println!(
            "  {} {} {} insert(s), {} update(s){}",
            plan.table.cyan(),
            format!("[{}]", plan.change_type.label()).dimmed(),
            plan.plan.inserts.len(),
            plan.plan.updates.len(),
            deletes
        );
        for insert in &plan.plan.inserts {
            println!("      {} {}", "+".green(), Value::Object(insert.payload.clone()));
        }
        for update in &plan.plan.updates {
            println!("      {} {} {}", "~".yellow(), update.key(), Value::Object(update.changes.clone()));
        }
        for id in &plan.plan.deletes {
            println!("      {} {}", "-".red(), id);
        }
    }
}

fn print_report(report: &SubmitReport) {
    println!("{} ({} order)", "Submit report".bold(), report.order.label());
    for node in &report.nodes {
        let status = if node.is_ok() {
            "ok".green()
        } else {
            "failed".red().bold()
        };
        println!(
            "  {} {} inserted {}, updated {}, deleted {} [{}]",
            node.table.cyan(),
            format!("[{}]", node.change_type.label()).dimmed(),
            node.inserted,
            node.updated,
            node.deleted,
            status
        );
        for error in &node.errors {
            println!("      {} {}", "error:".red(), error);
        }
    }
    println!(
        "Total: {} inserted, {} updated, {} deleted, {} error(s)",
        report.total_inserted().to_string().bright_green(),
        report.total_updated().to_string().bright_green(),
        report.total_deleted().to_string().bright_green(),
        report.error_count()
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_form_snapshot_grooms_objects() {
        let original = Snapshot::from_value(&json!({"id": 1, "name": "A", "org": {"id": 2}})).unwrap();
        let form = json!({"name": "B", "org.name": "Acme", "password": "x"});
        let snapshot = form_snapshot(&form, Some(&original), &["password".to_string()]).unwrap();
        assert_eq!(
            snapshot.to_value(),
            json!({"id": 1, "name": "B", "org": {"id": 2, "name": "Acme"}})
        );
    }

    #[test]
    fn test_form_snapshot_rows_verbatim() {
        let form = json!([{"id": 1}, {"name": "x"}]);
        let snapshot = form_snapshot(&form, None, &[]).unwrap();
        assert!(snapshot.is_rows());
        assert_eq!(snapshot.to_value(), form);
        assert!(form_snapshot(&json!("text"), None, &[]).is_none());
    }

    #[tokio::test]
    async fn test_seed_memory_store() {
        let store = MemoryStore::new();
        seed_memory_store(&store, &json!({"users": [{"id": 3, "name": "Ann"}]}))
            .await
            .unwrap();
        assert_eq!(store.rows("users").await.len(), 1);
        assert!(seed_memory_store(&store, &json!([1, 2])).await.is_err());
        assert!(seed_memory_store(&store, &json!({"users": 1})).await.is_err());
    }
}
