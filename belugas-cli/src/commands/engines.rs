//! `belugas engines` command handler

use std::io::Write;

use colored::Colorize;
use serde::Serialize;

use crate::cli::EnginesArgs;
use crate::error::CliError;
use crate::output::{OutputWriter, Render};
use crate::registry::{EngineRegistry, RegistryEntry};

/// Execute the `engines` command.
pub async fn execute(args: EnginesArgs) -> Result<(), CliError> {
    let registry = EngineRegistry::load(&args.registry).await?;
    let report = EnginesReport::from_registry(&registry);
    OutputWriter::new(args.format).render(&report)
}

/// Registry listing.
#[derive(Debug, Serialize)]
pub struct EnginesReport {
    pub engines: Vec<EngineSummary>,
}

/// One registry entry as shown by `belugas engines`.
#[derive(Debug, Serialize)]
pub struct EngineSummary {
    pub name: String,
    pub description: String,
    pub enabled: bool,
    pub channels: Vec<String>,
    pub after_engines: Vec<String>,
    pub after_features: Vec<String>,
}

impl EnginesReport {
    pub fn from_registry(registry: &EngineRegistry) -> Self {
        Self {
            engines: registry.engines.iter().map(EngineSummary::from).collect(),
        }
    }
}

impl From<&RegistryEntry> for EngineSummary {
    fn from(entry: &RegistryEntry) -> Self {
        let metadata = entry.metadata();
        Self {
            name: entry.name.clone(),
            description: entry.description.clone(),
            enabled: entry.enabled,
            channels: metadata
                .channel_names()
                .into_iter()
                .map(str::to_owned)
                .collect(),
            after_engines: entry.run_rules.engines.clone(),
            after_features: entry.run_rules.features.clone(),
        }
    }
}

impl Render for EnginesReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        if self.engines.is_empty() {
            writeln!(w, "No engines registered.")?;
            return Ok(());
        }

        writeln!(
            w,
            "{:<20} {:<9} {:<24} {}",
            "NAME".bold(),
            "ENABLED".bold(),
            "CHANNELS".bold(),
            "DESCRIPTION".bold()
        )?;
        for engine in &self.engines {
            let enabled = if engine.enabled {
                "yes".green()
            } else {
                "no".red()
            };
            writeln!(
                w,
                "{:<20} {:<9} {:<24} {}",
                engine.name,
                enabled,
                engine.channels.join(","),
                engine.description
            )?;
            if !engine.after_engines.is_empty() {
                writeln!(w, "  after engines: {}", engine.after_engines.join(", "))?;
            }
            if !engine.after_features.is_empty() {
                writeln!(w, "  after features: {}", engine.after_features.join(", "))?;
            }
        }
        Ok(())
    }
}
