//! `belugas analyze` command handler

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use belugas_core::config::{BelugasConfig, OutputConfig};
use belugas_core::error::BelugasError;
use belugas_core::types::FeatureSet;
use belugas_engine::{
    BollardContainerRuntime, ContainerRuntime, Engine, EngineDescriptor, EngineRuntimeOptions,
    NullContainerListener,
};

use crate::cli::{AnalyzeArgs, OutputFormat};
use crate::error::CliError;
use crate::formatter::{Formatter, JsonFormatter, TextFormatter};
use crate::registry::{EngineRegistry, EnginesConfigBuilder};
use crate::runner::EnginesRunner;

/// Execute the `analyze` command.
pub async fn execute(args: AnalyzeArgs, config: &BelugasConfig) -> Result<(), CliError> {
    let registry = EngineRegistry::load(&args.registry).await?;
    let source_dir = resolve_source_dir(&args.path).await?;

    let label = args
        .label
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let descriptors = EnginesConfigBuilder::new(&registry, source_dir.clone())
        .requested(args.engines.clone())
        .label(label.clone())
        .build()
        .map_err(BelugasError::from)?;

    info!(
        path = %source_dir.display(),
        label = %label,
        engines = descriptors.len(),
        "starting analysis"
    );

    let runtime = Arc::new(BollardContainerRuntime::connect(
        &config.runtime.docker_socket,
    )?);
    runtime.ping().await?;
    debug!("docker daemon reachable");

    let options = EngineRuntimeOptions::from_config(&config.runtime);
    let engines = build_engines(descriptors, &runtime, &options);
    let max_findings = config.output.max_findings_per_engine;

    let features = match resolve_format(args.format, &config.output)? {
        OutputFormat::Json => {
            run_engines(engines, JsonFormatter::new(io::stdout(), max_findings)).await?
        }
        OutputFormat::Text => {
            run_engines(engines, TextFormatter::new(io::stdout(), max_findings)).await?
        }
    };

    info!(features = features.len(), "analysis complete");
    Ok(())
}

/// Run `engines` in order through `formatter` and return the merged features.
pub async fn run_engines<R, F>(engines: Vec<Engine<R>>, formatter: F) -> Result<FeatureSet, CliError>
where
    R: ContainerRuntime,
    F: Formatter,
{
    let mut runner = EnginesRunner::new(engines, formatter).map_err(BelugasError::from)?;
    let features = runner.run(Arc::new(NullContainerListener)).await?;
    Ok(features)
}

/// Wrap each descriptor in an [`Engine`] sharing one runtime.
pub fn build_engines<R: ContainerRuntime>(
    descriptors: Vec<EngineDescriptor>,
    runtime: &Arc<R>,
    options: &EngineRuntimeOptions,
) -> Vec<Engine<R>> {
    descriptors
        .into_iter()
        .map(|descriptor| Engine::new(descriptor, Arc::clone(runtime), options.clone()))
        .collect()
}

/// The command-line format wins over `output.format`.
pub fn resolve_format(
    requested: Option<OutputFormat>,
    output: &OutputConfig,
) -> Result<OutputFormat, CliError> {
    if let Some(format) = requested {
        return Ok(format);
    }
    OutputFormat::from_config(&output.format).ok_or_else(|| {
        CliError::Config(format!(
            "unknown output format '{}', expected 'json' or 'text'",
            output.format
        ))
    })
}

async fn resolve_source_dir(path: &Path) -> Result<PathBuf, CliError> {
    let resolved = tokio::fs::canonicalize(path)
        .await
        .map_err(|e| CliError::Command(format!("cannot access {}: {e}", path.display())))?;
    let metadata = tokio::fs::metadata(&resolved).await?;
    if !metadata.is_dir() {
        return Err(CliError::Command(format!(
            "{} is not a directory",
            resolved.display()
        )));
    }
    Ok(resolved)
}
