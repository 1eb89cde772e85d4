//! Error types for the simulation harness.

use metapop_core::CoreError;
use metapop_env::EnvError;
use thiserror::Error;

/// Rejected run configuration. Raised before any agent is built.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("Unknown graph mode: {0} (expected clustered or uniform)")]
    UnknownGraphMode(String),

    #[error("Unknown load balancing method: {0} (expected random or block)")]
    UnknownLbMethod(String),

    #[error("Invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Errors raised while building or running a simulation.
#[derive(Debug, Error)]
pub enum SimError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Model error: {0}")]
    Core(#[from] CoreError),

    #[error("Environment error: {0}")]
    Env(#[from] EnvError),

    #[error("Output error: {0}")]
    Output(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A worker task panicked or was cancelled
    #[error("Worker task failed: {0}")]
    Task(String),
}

impl SimError {
    pub(crate) fn task(err: tokio::task::JoinError) -> Self {
        Self::Task(err.to_string())
    }
}
