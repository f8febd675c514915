use anyhow::Result;
use clap::Parser;

mod cli;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp(None)
        .init();

    if cli.no_color {
        colored::control::set_override(false);
    }

    let config = formsync::config::Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Submit(args) => cli::commands::submit::handle_submit_command(args, &config).await,
        Commands::Order(args) => cli::commands::order::handle_order_command(args, &config),
    }
}
