//! Engine run orchestration
//!
//! [`EnginesRunner`] runs the configured engines one at a time, in order.
//! Each engine receives a snapshot of every feature detected so far, and its
//! own findings are merged into the accumulated set before the next engine
//! starts.
//!
//! # Gating
//!
//! Before each engine runs, its run rules are checked against the run
//! history (engines executed, features detected). Engines whose rules are not
//! met are skipped with a warning and an `engine_skipped` notification.
//!
//! # Failure policy
//!
//! An engine failure (non-zero exit, timeout, missing image) aborts the run
//! and is returned to the caller. Invalid engine output is not a failure: it is
//! reported through the formatter and only stops that engine.

use std::collections::BTreeSet;
use std::sync::Arc;

use belugas_core::error::{BelugasError, RunError};
use belugas_core::metrics as m;
use belugas_core::types::{DetectedFeature, FeatureSet, RunHistory};
use belugas_engine::{ContainerListener, ContainerRuntime, Engine, EngineOutput, ResultSink};

use crate::formatter::Formatter;

/// Records every finding of one engine and forwards it to the formatter.
struct CollectingSink<'a, F: Formatter> {
    formatter: &'a mut F,
    features: Vec<DetectedFeature>,
}

impl<'a, F: Formatter> CollectingSink<'a, F> {
    fn new(formatter: &'a mut F) -> Self {
        Self {
            formatter,
            features: Vec::new(),
        }
    }

    fn into_features(self) -> Vec<DetectedFeature> {
        self.features
    }
}

impl<F: Formatter> ResultSink for CollectingSink<'_, F> {
    fn write(&mut self, output: &EngineOutput) -> bool {
        if let Some(feature) = output.feature() {
            self.features.push(feature.clone());
        }
        self.formatter.write(output)
    }

    fn failed(&mut self, message: &str) {
        self.formatter.failed(message);
    }
}

/// Runs engines sequentially and merges their findings.
pub struct EnginesRunner<R: ContainerRuntime, F: Formatter> {
    engines: Vec<Engine<R>>,
    formatter: F,
}

impl<R: ContainerRuntime, F: Formatter> EnginesRunner<R, F> {
    /// Create a runner.
    ///
    /// # Errors
    ///
    /// `RunError::DuplicateEngine` if two engines share a qualified name.
    pub fn new(engines: Vec<Engine<R>>, formatter: F) -> Result<Self, RunError> {
        let mut seen = BTreeSet::new();
        for engine in &engines {
            let qualified = engine.qualified_name();
            if !seen.insert(qualified.clone()) {
                return Err(RunError::DuplicateEngine(qualified));
            }
        }
        Ok(Self { engines, formatter })
    }

    /// Number of configured engines.
    pub fn len(&self) -> usize {
        self.engines.len()
    }

    /// Whether no engines are configured.
    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }

    /// The formatter.
    pub fn formatter(&self) -> &F {
        &self.formatter
    }

    /// Consume the runner and return the formatter.
    pub fn into_formatter(self) -> F {
        self.formatter
    }

    /// Run every engine and return the merged features.
    ///
    /// The formatter is closed on every path, including errors.
    ///
    /// # Errors
    ///
    /// - `RunError::NoEnabledEngines` when no engines are configured
    /// - engine failures, converted to `BelugasError::Engine`
    /// - formatter I/O errors
    pub async fn run(
        &mut self,
        listener: Arc<dyn ContainerListener>,
    ) -> Result<FeatureSet, BelugasError> {
        let outcome = self.run_engines(listener).await;
        self.formatter.close();
        outcome
    }

    async fn run_engines(
        &mut self,
        listener: Arc<dyn ContainerListener>,
    ) -> Result<FeatureSet, BelugasError> {
        if self.engines.is_empty() {
            return Err(RunError::NoEnabledEngines.into());
        }

        self.formatter.started()?;
        tracing::info!(engines = self.engines.len(), "analysis started");

        let mut history = RunHistory::new();

        for engine in &self.engines {
            let qualified = engine.qualified_name();

            if !engine.can_run(&history) {
                tracing::warn!(
                    engine = %qualified,
                    rules = ?engine.descriptor().run_rules,
                    "run rules not met, skipping engine"
                );
                metrics::counter!(m::RUN_ENGINES_SKIPPED_TOTAL, m::LABEL_ENGINE => m::engine_label(&qualified))
                    .increment(1);
                self.formatter.engine_skipped(engine.descriptor())?;
                continue;
            }

            self.formatter.engine_running(engine.descriptor())?;

            let mut sink = CollectingSink::new(&mut self.formatter);
            let result = engine
                .run(history.features(), &mut sink, Arc::clone(&listener))
                .await?;
            let detected = sink.into_features();

            tracing::info!(
                engine = %qualified,
                features = detected.len(),
                stopped = result.stopped,
                "engine finished"
            );

            history.record_engine(engine.name());
            history.merge_features(detected);

            self.formatter.engine_finished(engine.descriptor(), &result)?;
        }

        let features = history.into_features();
        metrics::gauge!(m::RUN_FEATURES_DETECTED).set(features.len() as f64);
        tracing::info!(features = features.len(), "analysis finished");

        self.formatter.finished(&features)?;
        Ok(features)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::time::Duration;

    use belugas_engine::{
        ContainerRunResult, ContainerSpec, EngineDescriptor, EngineMetadata,
        EngineRuntimeOptions, MountedPath, NullContainerListener, RuntimeError, StreamControl,
    };

    use super::*;
    use crate::formatter::JsonFormatter;

    /// Emits the chunks configured for the container's image.
    #[derive(Default)]
    struct ImageScriptRuntime {
        outputs: BTreeMap<String, Vec<String>>,
    }

    impl ContainerRuntime for ImageScriptRuntime {
        async fn run(
            &self,
            spec: &ContainerSpec,
            listener: &dyn ContainerListener,
            on_output: &mut (dyn FnMut(&[u8]) -> StreamControl + Send),
        ) -> Result<ContainerRunResult, RuntimeError> {
            let image = spec.image.clone().unwrap_or_default();
            let data = spec.data();
            listener.started(&data);
            let mut stopped = false;
            for chunk in self.outputs.get(&image).into_iter().flatten() {
                if on_output(chunk.as_bytes()).is_stop() {
                    stopped = true;
                    break;
                }
            }
            let result = ContainerRunResult {
                exit_status: Some(0),
                stopped,
                duration: Duration::from_millis(1),
                ..Default::default()
            };
            listener.finished(&data, &result);
            Ok(result)
        }
    }

    fn engine(
        runtime: &Arc<ImageScriptRuntime>,
        name: &str,
        dir: &tempfile::TempDir,
    ) -> Engine<ImageScriptRuntime> {
        let descriptor = EngineDescriptor::new(
            name,
            EngineMetadata {
                image: Some(name.to_owned()),
                ..Default::default()
            },
            "/src",
        );
        Engine::new(
            descriptor,
            Arc::clone(runtime),
            EngineRuntimeOptions::default().with_tmp(MountedPath::local(dir.path())),
        )
    }

    #[test]
    fn test_duplicate_qualified_names_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = Arc::new(ImageScriptRuntime::default());
        let err = EnginesRunner::new(
            vec![engine(&runtime, "a", &dir), engine(&runtime, "a", &dir)],
            JsonFormatter::new(Vec::new(), 10),
        )
        .err()
        .expect("duplicate should be rejected");
        assert!(matches!(err, RunError::DuplicateEngine(name) if name == "a:stable"));
    }

    #[tokio::test]
    async fn test_no_engines_still_closes_formatter() {
        struct ClosingFormatter {
            closed: bool,
        }
        impl ResultSink for ClosingFormatter {
            fn write(&mut self, _output: &EngineOutput) -> bool {
                true
            }
            fn failed(&mut self, _message: &str) {}
        }
        impl Formatter for ClosingFormatter {
            fn finished(&mut self, _features: &FeatureSet) -> std::io::Result<()> {
                Ok(())
            }
            fn close(&mut self) {
                self.closed = true;
            }
        }

        let mut runner: EnginesRunner<ImageScriptRuntime, _> =
            EnginesRunner::new(Vec::new(), ClosingFormatter { closed: false }).unwrap();
        let err = runner.run(Arc::new(NullContainerListener)).await.unwrap_err();
        assert!(matches!(err, BelugasError::Run(RunError::NoEnabledEngines)));
        assert!(runner.formatter().closed);
    }

    #[tokio::test]
    async fn test_findings_are_merged_across_engines() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = Arc::new(ImageScriptRuntime {
            outputs: BTreeMap::from([
                (
                    "first".to_owned(),
                    vec![r#"{"type":"feature","name":"dup","version":"1"}"#.to_owned()],
                ),
                (
                    "second".to_owned(),
                    vec![
                        r#"{"type":"feature","name":"dup","categories":["Library"]}"#.to_owned(),
                        r#"{"type":"feature","name":"only-second"}"#.to_owned(),
                    ],
                ),
            ]),
        });
        let mut runner = EnginesRunner::new(
            vec![engine(&runtime, "first", &dir), engine(&runtime, "second", &dir)],
            JsonFormatter::new(Vec::new(), 10),
        )
        .unwrap();

        let features = runner.run(Arc::new(NullContainerListener)).await.unwrap();

        assert_eq!(features.len(), 2);
        let dup = features.get("dup").unwrap();
        assert_eq!(dup.version.as_deref(), Some("1"));
        assert_eq!(dup.categories, vec!["Library".to_owned()]);
        assert_eq!(dup.engines, vec!["first".to_owned(), "second".to_owned()]);
        assert_eq!(features.names().collect::<Vec<_>>(), vec!["dup", "only-second"]);
    }
}
