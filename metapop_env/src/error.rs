//! Error types for the distributed graph substrate.

use crate::types::{AgentId, WorkerId};
use thiserror::Error;

/// Errors that can occur in the substrate layer.
#[derive(Debug, Error)]
pub enum EnvError {
    /// Inter-worker send/receive failed (channel closed, etc.)
    #[error("Network error: {0}")]
    NetworkError(String),

    /// The agent id is not registered in the graph
    #[error("Unknown agent: {0}")]
    UnknownAgent(AgentId),

    /// The worker rank is outside the cluster
    #[error("Unknown worker: {0}")]
    UnknownWorker(WorkerId),

    /// Agent state serialization/deserialization failed
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl EnvError {
    /// Creates a network error.
    pub fn network(msg: impl Into<String>) -> Self {
        Self::NetworkError(msg.into())
    }

    /// Creates a serialization error from any displayable cause.
    pub fn serialization(err: impl std::fmt::Display) -> Self {
        Self::SerializationError(err.to_string())
    }
}
