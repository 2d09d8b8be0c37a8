//! Engine registry and engine selection
//!
//! The registry is a TOML file listing the engines that can run, in the
//! order they should run:
//!
//! ```toml
//! [[engine]]
//! name = "gemfile"
//! description = "Detects Ruby gems from Gemfile.lock"
//! command = ["/usr/src/app/bin/gemfile"]
//!
//! [engine.channels]
//! stable = "belugas/engine-gemfile:latest"
//!
//! [[engine]]
//! name = "rails"
//! run_rules = { features = ["Ruby"] }
//! channels = { stable = "belugas/engine-rails:latest" }
//! ```
//!
//! [`EnginesConfigBuilder`] turns registry entries into
//! [`EngineDescriptor`]s for one run.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use belugas_core::error::RunError;
use belugas_core::types::RunRules;
use belugas_engine::{EngineDescriptor, EngineMetadata};

use crate::error::CliError;

/// Default registry file name.
pub const DEFAULT_REGISTRY_PATH: &str = "engines.toml";

/// One engine entry in the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryEntry {
    /// Engine name.
    pub name: String,
    /// Short description.
    #[serde(default)]
    pub description: String,
    /// Whether the engine runs when no engines are requested explicitly.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Image for engines without channels.
    #[serde(default)]
    pub image: Option<String>,
    /// Command override.
    #[serde(default)]
    pub command: Vec<String>,
    /// Channel name to image.
    #[serde(default)]
    pub channels: BTreeMap<String, String>,
    /// Run prerequisites.
    #[serde(default)]
    pub run_rules: RunRules,
    /// Default engine configuration passed to the container.
    #[serde(default)]
    pub config: Map<String, Value>,
}

fn default_enabled() -> bool {
    true
}

impl RegistryEntry {
    /// Container metadata for this entry.
    pub fn metadata(&self) -> EngineMetadata {
        EngineMetadata {
            image: self.image.clone(),
            command: self.command.clone(),
            channels: self.channels.clone(),
        }
    }
}

/// Ordered list of known engines.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineRegistry {
    /// Entries in run order.
    #[serde(default, rename = "engine")]
    pub engines: Vec<RegistryEntry>,
}

impl EngineRegistry {
    /// Load a registry from a TOML file.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, CliError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            CliError::Registry(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::parse(&content)
    }

    /// Parse a registry from TOML text.
    pub fn parse(content: &str) -> Result<Self, CliError> {
        let registry: Self =
            toml::from_str(content).map_err(|e| CliError::Registry(e.to_string()))?;
        registry.validate()?;
        Ok(registry)
    }

    fn validate(&self) -> Result<(), CliError> {
        let mut seen = std::collections::BTreeSet::new();
        for entry in &self.engines {
            if entry.name.trim().is_empty() {
                return Err(CliError::Registry("engine name must not be empty".to_owned()));
            }
            if entry.name.contains(':') {
                return Err(CliError::Registry(format!(
                    "engine name '{}' must not contain ':'",
                    entry.name
                )));
            }
            if !seen.insert(entry.name.as_str()) {
                return Err(CliError::Registry(format!(
                    "engine '{}' is listed more than once",
                    entry.name
                )));
            }
            if entry.image.is_none() && entry.channels.is_empty() {
                return Err(CliError::Registry(format!(
                    "engine '{}' needs an image or at least one channel",
                    entry.name
                )));
            }
        }
        Ok(())
    }

    /// Look up an entry by name.
    pub fn get(&self, name: &str) -> Option<&RegistryEntry> {
        self.engines.iter().find(|e| e.name == name)
    }

    /// Entries enabled by default.
    pub fn enabled(&self) -> impl Iterator<Item = &RegistryEntry> {
        self.engines.iter().filter(|e| e.enabled)
    }
}

/// Builds the engine descriptors for one run.
pub struct EnginesConfigBuilder<'a> {
    registry: &'a EngineRegistry,
    source_dir: PathBuf,
    requested: Vec<String>,
    label: String,
}

impl<'a> EnginesConfigBuilder<'a> {
    /// Start a builder for the given registry and source directory.
    pub fn new(registry: &'a EngineRegistry, source_dir: impl Into<PathBuf>) -> Self {
        Self {
            registry,
            source_dir: source_dir.into(),
            requested: Vec::new(),
            label: String::new(),
        }
    }

    /// Run only these engines, in this order. Accepts `name` or `name:channel`.
    pub fn requested(mut self, names: Vec<String>) -> Self {
        self.requested = names;
        self
    }

    /// Audit label attached to every container.
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Build the descriptors.
    ///
    /// # Errors
    ///
    /// `RunError::InvalidEngineName` when a requested name is not in the registry.
    pub fn build(&self) -> Result<Vec<EngineDescriptor>, RunError> {
        if self.requested.is_empty() {
            return Ok(self
                .registry
                .enabled()
                .map(|entry| self.descriptor(entry, None))
                .collect());
        }

        self.requested
            .iter()
            .map(|request| {
                let (name, channel) = match request.split_once(':') {
                    Some((name, channel)) => (name, Some(channel)),
                    None => (request.as_str(), None),
                };
                let entry = self
                    .registry
                    .get(name)
                    .ok_or_else(|| RunError::InvalidEngineName(request.clone()))?;
                Ok(self.descriptor(entry, channel))
            })
            .collect()
    }

    fn descriptor(&self, entry: &RegistryEntry, channel: Option<&str>) -> EngineDescriptor {
        let mut config = entry.config.clone();
        if let Some(channel) = channel {
            config.insert("channel".to_owned(), Value::String(channel.to_owned()));
        }
        EngineDescriptor::new(entry.name.clone(), entry.metadata(), self.source_dir.clone())
            .with_config(Value::Object(config))
            .with_label(self.label.clone())
            .with_run_rules(entry.run_rules.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REGISTRY: &str = r#"
[[engine]]
name = "gemfile"
description = "Gemfile.lock"
command = ["/bin/gemfile"]
channels = { stable = "belugas/gemfile:1", beta = "belugas/gemfile:2" }

[[engine]]
name = "rails"
run_rules = { features = ["Ruby"] }
image = "belugas/rails"
config = { exclude_features = ["Bower"] }

[[engine]]
name = "slow"
enabled = false
image = "belugas/slow"
"#;

    fn registry() -> EngineRegistry {
        EngineRegistry::parse(REGISTRY).expect("registry should parse")
    }

    #[test]
    fn test_parse_preserves_order() {
        let names: Vec<_> = registry().engines.iter().map(|e| e.name.clone()).collect();
        assert_eq!(names, vec!["gemfile", "rails", "slow"]);
    }

    #[test]
    fn test_defaults() {
        let registry = registry();
        let rails = registry.get("rails").unwrap();
        assert!(rails.enabled);
        assert!(rails.command.is_empty());
        assert_eq!(rails.run_rules, RunRules::after_features(["Ruby"]));
        assert!(!registry.get("slow").unwrap().enabled);
    }

    #[test]
    fn test_build_all_enabled() {
        let registry = registry();
        let descriptors = EnginesConfigBuilder::new(&registry, "/src")
            .label("ci")
            .build()
            .unwrap();
        let names: Vec<_> = descriptors.iter().map(|d| d.qualified_name()).collect();
        assert_eq!(names, vec!["gemfile:stable", "rails:stable"]);
        assert_eq!(descriptors[1].config["exclude_features"][0], "Bower");
        assert_eq!(descriptors[0].label, "ci");
        assert_eq!(descriptors[0].code_path, PathBuf::from("/src"));
    }

    #[test]
    fn test_build_requested_with_channel() {
        let registry = registry();
        let descriptors = EnginesConfigBuilder::new(&registry, "/src")
            .requested(vec!["slow".to_owned(), "gemfile:beta".to_owned()])
            .build()
            .unwrap();
        let names: Vec<_> = descriptors.iter().map(|d| d.qualified_name()).collect();
        assert_eq!(names, vec!["slow:stable", "gemfile:beta"]);
        assert_eq!(
            descriptors[1].metadata.image_for("beta"),
            Some("belugas/gemfile:2")
        );
    }

    #[test]
    fn test_build_unknown_engine() {
        let registry = registry();
        let err = EnginesConfigBuilder::new(&registry, "/src")
            .requested(vec!["nope".to_owned()])
            .build()
            .unwrap_err();
        assert!(matches!(err, RunError::InvalidEngineName(name) if name == "nope"));
    }

    #[test]
    fn test_rejects_duplicate_entries() {
        let err = EngineRegistry::parse(
            r#"
[[engine]]
name = "a"
image = "x"

[[engine]]
name = "a"
image = "y"
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn test_rejects_entry_without_image() {
        let err = EngineRegistry::parse("[[engine]]\nname = \"a\"\n").unwrap_err();
        assert!(err.to_string().contains("needs an image"));
    }

    #[test]
    fn test_rejects_malformed_toml() {
        assert!(matches!(
            EngineRegistry::parse("[[engine]\nname = 1"),
            Err(CliError::Registry(_))
        ));
    }

    #[test]
    fn test_empty_registry() {
        let registry = EngineRegistry::parse("").unwrap();
        assert!(registry.engines.is_empty());
        assert!(
            EnginesConfigBuilder::new(&registry, "/src")
                .build()
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let err = EngineRegistry::load("/nonexistent/engines.toml")
            .await
            .unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}
