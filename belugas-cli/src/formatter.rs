//! Result formatters
//!
//! A [`Formatter`] is the run-level result sink. It receives every finding the
//! engines emit, failure notices for invalid output, and progress
//! notifications from the runner. [`Formatter::close`] is always called once
//! the run ends, whether it succeeded or not.
//!
//! Both formatters cap the number of findings a single engine may report
//! (`output.max_findings_per_engine`). Reaching the cap asks the engine to stop.

use std::io::{self, Write};

use colored::Colorize;

use belugas_core::types::FeatureSet;
use belugas_engine::{ContainerRunResult, EngineDescriptor, EngineOutput, ResultSink};

/// Run-level result sink with progress notifications.
pub trait Formatter: ResultSink {
    /// The run is starting.
    fn started(&mut self) -> io::Result<()> {
        Ok(())
    }

    /// An engine is about to run.
    fn engine_running(&mut self, _engine: &EngineDescriptor) -> io::Result<()> {
        Ok(())
    }

    /// An engine finished successfully.
    fn engine_finished(
        &mut self,
        _engine: &EngineDescriptor,
        _result: &ContainerRunResult,
    ) -> io::Result<()> {
        Ok(())
    }

    /// An engine was skipped because its run rules were not met.
    fn engine_skipped(&mut self, _engine: &EngineDescriptor) -> io::Result<()> {
        Ok(())
    }

    /// All engines ran; `features` is the merged result.
    fn finished(&mut self, features: &FeatureSet) -> io::Result<()>;

    /// Release resources. Called exactly once per run.
    fn close(&mut self) {}
}

/// Per-engine findings counter shared by both formatters.
#[derive(Debug)]
struct FindingCap {
    max: usize,
    current: usize,
}

impl FindingCap {
    fn new(max: usize) -> Self {
        Self {
            max: max.max(1),
            current: 0,
        }
    }

    fn reset(&mut self) {
        self.current = 0;
    }

    /// Counts one finding; returns false once the cap is reached.
    fn accept(&mut self) -> bool {
        self.current += 1;
        self.current < self.max
    }
}

/// Writes the merged feature array as pretty JSON when the run finishes.
pub struct JsonFormatter<W: Write + Send> {
    out: W,
    cap: FindingCap,
    failures: Vec<String>,
}

impl<W: Write + Send> JsonFormatter<W> {
    /// Create a JSON formatter writing to `out`.
    pub fn new(out: W, max_findings_per_engine: usize) -> Self {
        Self {
            out,
            cap: FindingCap::new(max_findings_per_engine),
            failures: Vec::new(),
        }
    }

    /// Failure notices received so far.
    pub fn failures(&self) -> &[String] {
        &self.failures
    }

    /// Consume the formatter and return the writer.
    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send> ResultSink for JsonFormatter<W> {
    fn write(&mut self, _output: &EngineOutput) -> bool {
        self.cap.accept()
    }

    fn failed(&mut self, message: &str) {
        tracing::error!(message = %message, "engine reported a failure");
        self.failures.push(message.to_owned());
    }
}

impl<W: Write + Send> Formatter for JsonFormatter<W> {
    fn engine_running(&mut self, _engine: &EngineDescriptor) -> io::Result<()> {
        self.cap.reset();
        Ok(())
    }

    fn finished(&mut self, features: &FeatureSet) -> io::Result<()> {
        serde_json::to_writer_pretty(&mut self.out, features).map_err(io::Error::other)?;
        writeln!(self.out)?;
        Ok(())
    }

    fn close(&mut self) {
        if let Err(e) = self.out.flush() {
            tracing::warn!(error = %e, "failed to flush output");
        }
    }
}

/// Human-readable progress and summary output.
pub struct TextFormatter<W: Write + Send> {
    out: W,
    cap: FindingCap,
    engine_findings: usize,
    failures: usize,
}

impl<W: Write + Send> TextFormatter<W> {
    /// Create a text formatter writing to `out`.
    pub fn new(out: W, max_findings_per_engine: usize) -> Self {
        Self {
            out,
            cap: FindingCap::new(max_findings_per_engine),
            engine_findings: 0,
            failures: 0,
        }
    }

    /// Consume the formatter and return the writer.
    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send> ResultSink for TextFormatter<W> {
    fn write(&mut self, output: &EngineOutput) -> bool {
        self.engine_findings += 1;
        if let Some(feature) = output.feature() {
            // 진행 출력 실패는 분석 결과에 영향을 주지 않는다
            let _ = writeln!(self.out, "  {} {}", "+".green(), feature);
        }
        self.cap.accept()
    }

    fn failed(&mut self, message: &str) {
        self.failures += 1;
        let _ = writeln!(self.out, "  {} {}", "error:".red().bold(), message);
    }
}

impl<W: Write + Send> Formatter for TextFormatter<W> {
    fn started(&mut self) -> io::Result<()> {
        writeln!(self.out, "{}", "Starting analysis".bold())
    }

    fn engine_running(&mut self, engine: &EngineDescriptor) -> io::Result<()> {
        self.cap.reset();
        self.engine_findings = 0;
        writeln!(self.out, "Running {}:", engine.qualified_name().cyan())
    }

    fn engine_finished(
        &mut self,
        engine: &EngineDescriptor,
        result: &ContainerRunResult,
    ) -> io::Result<()> {
        writeln!(
            self.out,
            "{} {} ({} features, {:.1}s)",
            "Done".green(),
            engine.qualified_name(),
            self.engine_findings,
            result.duration.as_secs_f64()
        )
    }

    fn engine_skipped(&mut self, engine: &EngineDescriptor) -> io::Result<()> {
        writeln!(
            self.out,
            "{} {} (run rules not met)",
            "Skipped".yellow(),
            engine.qualified_name()
        )
    }

    fn finished(&mut self, features: &FeatureSet) -> io::Result<()> {
        writeln!(self.out)?;
        writeln!(self.out, "{}", "Detected features".bold())?;
        if features.is_empty() {
            writeln!(self.out, "  (none)")?;
        }
        for feature in features {
            let engines = if feature.engines.is_empty() {
                String::new()
            } else {
                format!(" [{}]", feature.engines.join(", "))
            };
            writeln!(self.out, "  {}{}", feature, engines.dimmed())?;
        }
        if self.failures > 0 {
            writeln!(
                self.out,
                "{} {} invalid output report(s)",
                "Warning:".yellow(),
                self.failures
            )?;
        }
        Ok(())
    }

    fn close(&mut self) {
        if let Err(e) = self.out.flush() {
            tracing::warn!(error = %e, "failed to flush output");
        }
    }
}
