//! `belugas` -- run containerized static-analysis engines.
//!
//! Logs go to stderr; stdout carries only the command result.

use clap::Parser;
use colored::Colorize;

use belugas_cli::cli::{Cli, Commands};
use belugas_cli::commands;
use belugas_cli::error::CliError;
use belugas_cli::logging;
use belugas_core::config::BelugasConfig;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("{} {}", "error:".red().bold(), e);
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let config = BelugasConfig::load_or_default(&cli.config).await?;

    logging::init_tracing(&config.general, cli.log_level.as_deref())
        .map_err(|e| CliError::Config(e.to_string()))?;
    belugas_core::metrics::describe_all();

    tracing::debug!(config = %cli.config.display(), "belugas starting");

    match cli.command {
        Commands::Analyze(args) => commands::analyze::execute(args, &config).await,
        Commands::Engines(args) => commands::engines::execute(args).await,
    }
}
