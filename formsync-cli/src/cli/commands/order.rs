//! `formsync order`: show the persistence order for a root table

use anyhow::{Context, Result};
use colored::*;

use crate::cli::OrderArgs;
use formsync::config::Config;
use formsync::graph::GraphBuilder;

pub fn handle_order_command(args: OrderArgs, config: &Config) -> Result<()> {
    let schema = config.schema()?;
    let root = config.root_table(args.root.as_deref())?;
    let order = args.order.unwrap_or(config.submit.order);
    let store = config.store.connect()?;

    let graph = GraphBuilder::from_schema(&schema, &root, &store)
        .with_context(|| format!("Failed to build graph for '{}'", root))?;
    let scheduled = graph.schedule(order)?;

    println!(
        "{} {} ({} order, {} nodes)",
        "Persistence order for".bold(),
        root.bright_green().bold(),
        order.label(),
        scheduled.len()
    );
    for (position, id) in scheduled.iter().enumerate() {
        let node = graph.node(*id)?;
        let nested = node
            .parent_edge()
            .map(|edge| format!(" at {}", edge.path))
            .unwrap_or_default();
        println!(
            "  {:>2}. {} {}{}",
            position + 1,
            node.name().cyan(),
            format!("[{}]", node.table().kind.label()).dimmed(),
            nested.dimmed()
        );
    }
    Ok(())
}
