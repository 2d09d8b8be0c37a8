//! CLI-specific error types and exit code mapping

use belugas_core::error::BelugasError;
use belugas_engine::{EngineError, RuntimeError};

/// CLI-specific error type.
///
/// Each variant carries enough context for a user-friendly message.
/// The `exit_code()` method maps errors to process exit codes.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration loading or validation failure.
    #[error("configuration error: {0}")]
    Config(String),

    /// Engine registry could not be read or is malformed.
    #[error("registry error: {0}")]
    Registry(String),

    /// A subcommand-specific operation failed.
    #[error("{0}")]
    Command(String),

    /// Cannot connect to the Docker daemon.
    #[error("docker not reachable: {0}")]
    DockerUnavailable(String),

    /// JSON serialisation failed during output rendering.
    #[error("json output error: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    /// IO error (file read, stdout write, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Wrapped domain error from belugas-core.
    #[error("{0}")]
    Core(#[from] BelugasError),
}

impl CliError {
    /// Map the error to a process exit code.
    ///
    /// | Code | Meaning                                   |
    /// |------|-------------------------------------------|
    /// | 0    | Success                                   |
    /// | 1    | General / engine failure                  |
    /// | 2    | Configuration, registry or engine selection |
    /// | 3    | Docker unreachable                        |
    /// | 10   | IO error                                  |
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::Registry(_) => 2,
            Self::Core(BelugasError::Config(_) | BelugasError::Run(_)) => 2,
            Self::DockerUnavailable(_) => 3,
            Self::Io(_) | Self::Core(BelugasError::Io(_)) => 10,
            Self::JsonSerialize(_) | Self::Command(_) | Self::Core(_) => 1,
        }
    }
}

impl From<EngineError> for CliError {
    fn from(e: EngineError) -> Self {
        Self::Core(e.into())
    }
}

impl From<RuntimeError> for CliError {
    fn from(e: RuntimeError) -> Self {
        match e {
            RuntimeError::DockerConnection(reason) => Self::DockerUnavailable(reason),
            other => Self::Command(other.to_string()),
        }
    }
}
