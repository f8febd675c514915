//! Command line interface

pub mod commands;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use formsync::graph::ScheduleOrder;

#[derive(Parser)]
#[command(name = "formsync")]
#[command(about = "Reconcile form-shaped entity graphs against a relational store")]
#[command(version)]
pub struct Cli {
    /// Config file (defaults to <config dir>/formsync/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run one submit cycle for a form export
    Submit(SubmitArgs),
    /// Show the order in which tables would be persisted
    Order(OrderArgs),
}

#[derive(Args)]
pub struct SubmitArgs {
    /// Root table (overrides `root` in the config)
    #[arg(long)]
    pub root: Option<String>,

    /// JSON file with the data as currently stored
    #[arg(long)]
    pub original: Option<PathBuf>,

    /// JSON file with the form values (flat, dotted keys allowed)
    #[arg(long)]
    pub form: PathBuf,

    /// Form fields to drop before submitting (repeatable)
    #[arg(long = "drop", value_name = "FIELD")]
    pub drop_fields: Vec<String>,

    /// JSON file mapping table names to existing rows (memory store only)
    #[arg(long)]
    pub seed: Option<PathBuf>,

    /// Print the planned mutations without touching the store
    #[arg(long)]
    pub dry_run: bool,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,

    /// Run deletes for every table
    #[arg(long)]
    pub destructive: bool,

    /// Schedule order: topological or greedy
    #[arg(long, value_parser = parse_order)]
    pub order: Option<ScheduleOrder>,

    /// Abort the cycle after this many seconds
    #[arg(long)]
    pub timeout_secs: Option<u64>,
}

#[derive(Args)]
pub struct OrderArgs {
    /// Root table (overrides `root` in the config)
    #[arg(long)]
    pub root: Option<String>,

    /// Schedule order: topological or greedy
    #[arg(long, value_parser = parse_order)]
    pub order: Option<ScheduleOrder>,
}

fn parse_order(value: &str) -> Result<ScheduleOrder, String> {
    match value.to_ascii_lowercase().as_str() {
        "topological" | "topo" => Ok(ScheduleOrder::Topological),
        "greedy" => Ok(ScheduleOrder::Greedy),
        other => Err(format!(
            "unknown order '{}', expected 'topological' or 'greedy'",
            other
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_order() {
        assert_eq!(parse_order("greedy"), Ok(ScheduleOrder::Greedy));
        assert_eq!(parse_order("Topological"), Ok(ScheduleOrder::Topological));
        assert!(parse_order("random").is_err());
    }

    #[test]
    fn test_submit_args() {
        let cli = Cli::try_parse_from([
            "formsync",
            "--verbose",
            "submit",
            "--form",
            "form.json",
            "--drop",
            "password",
            "--drop",
            "confirm",
            "--order",
            "greedy",
        ])
        .unwrap();
        assert!(cli.verbose);
        let Commands::Submit(args) = cli.command else {
            panic!("expected submit");
        };
        assert_eq!(args.form, PathBuf::from("form.json"));
        assert_eq!(args.drop_fields, vec!["password", "confirm"]);
        assert_eq!(args.order, Some(ScheduleOrder::Greedy));
        assert!(!args.dry_run);
    }

    #[test]
    fn test_submit_requires_form() {
        assert!(Cli::try_parse_from(["formsync", "submit"]).is_err());
    }
}
