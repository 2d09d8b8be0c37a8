//! CLI argument parsing using clap derive API
//!
//! This module defines the command-line interface structure using clap's derive macros.
//! It is purely declarative with no side effects or I/O.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::registry::DEFAULT_REGISTRY_PATH;

/// Belugas -- run containerized static-analysis engines and merge their findings.
///
/// Use `belugas <COMMAND> --help` for subcommand details.
#[derive(Parser, Debug)]
#[command(name = "belugas", version, about, long_about = None)]
pub struct Cli {
    /// Path to the belugas.toml configuration file.
    #[arg(short, long, default_value = "belugas.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Supported output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Merged feature array as JSON.
    Json,
    /// Human-readable progress and summary.
    Text,
}

impl OutputFormat {
    /// Parse the `output.format` config value.
    pub fn from_config(value: &str) -> Option<Self> {
        match value {
            "json" => Some(Self::Json),
            "text" => Some(Self::Text),
            _ => None,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the analysis engines on a source directory.
    Analyze(AnalyzeArgs),

    /// List the engines in the registry.
    Engines(EnginesArgs),
}

// ---- analyze ----

/// Run engines on a source directory.
#[derive(Args, Debug)]
pub struct AnalyzeArgs {
    /// Source directory to analyze (default: current directory).
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Engine to run, as `name` or `name:channel`. Repeat to run several.
    /// Without this flag every enabled engine runs.
    #[arg(short, long = "engine")]
    pub engines: Vec<String>,

    /// Output format (default: `output.format` from the config).
    #[arg(long)]
    pub format: Option<OutputFormat>,

    /// Engine registry file.
    #[arg(long, default_value = DEFAULT_REGISTRY_PATH)]
    pub registry: PathBuf,

    /// Audit label attached to every engine container (default: random).
    #[arg(long)]
    pub label: Option<String>,
}

// ---- engines ----

/// List registry engines.
#[derive(Args, Debug)]
pub struct EnginesArgs {
    /// Engine registry file.
    #[arg(long, default_value = DEFAULT_REGISTRY_PATH)]
    pub registry: PathBuf,

    /// Output format.
    #[arg(long, default_value = "text")]
    pub format: OutputFormat,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_analyze_defaults() {
        let cli = Cli::try_parse_from(["belugas", "analyze"]).unwrap();
        match cli.command {
            Commands::Analyze(args) => {
                assert_eq!(args.path, PathBuf::from("."));
                assert!(args.engines.is_empty());
                assert!(args.format.is_none());
                assert_eq!(args.registry, PathBuf::from("engines.toml"));
                assert!(args.label.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
        assert_eq!(cli.config, PathBuf::from("belugas.toml"));
    }

    #[test]
    fn test_analyze_repeated_engines() {
        let cli = Cli::try_parse_from([
            "belugas",
            "analyze",
            "/src",
            "--engine",
            "gemfile",
            "-e",
            "rails:beta",
            "--format",
            "text",
            "--label",
            "ci-1",
        ])
        .unwrap();
        match cli.command {
            Commands::Analyze(args) => {
                assert_eq!(args.path, PathBuf::from("/src"));
                assert_eq!(args.engines, vec!["gemfile", "rails:beta"]);
                assert_eq!(args.format, Some(OutputFormat::Text));
                assert_eq!(args.label.as_deref(), Some("ci-1"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_global_log_level() {
        let cli = Cli::try_parse_from(["belugas", "engines", "--log-level", "debug"]).unwrap();
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn test_invalid_format_rejected() {
        assert!(Cli::try_parse_from(["belugas", "analyze", "--format", "xml"]).is_err());
    }

    #[test]
    fn test_output_format_from_config() {
        assert_eq!(OutputFormat::from_config("json"), Some(OutputFormat::Json));
        assert_eq!(OutputFormat::from_config("text"), Some(OutputFormat::Text));
        assert_eq!(OutputFormat::from_config("yaml"), None);
    }
}
