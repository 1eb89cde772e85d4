//! Error types for the epidemic core.

use metapop_env::{AgentId, EnvError, WorkerId};
use thiserror::Error;

/// Errors raised by model construction and agent behaviors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Substrate operation failed
    #[error("Environment error: {0}")]
    Env(#[from] EnvError),

    /// A city-to-city edge or a disease binding points to a non-city agent
    #[error("{0} is not a city")]
    NotACity(AgentId),

    /// A disease behavior was scheduled on a non-disease agent
    #[error("{0} is not a disease")]
    NotADisease(AgentId),

    /// A behavior ran on an agent the executing worker does not own
    #[error("{agent} is not owned by {worker}")]
    NotLocal { agent: AgentId, worker: WorkerId },

    /// A disease must be bound to exactly one city
    #[error("Disease {disease} must have exactly one disease-to-city edge, found {edges}")]
    DiseaseBinding { disease: AgentId, edges: usize },

    /// Out-of-range or non-finite model parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

impl CoreError {
    /// Creates an invalid parameter error.
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidParameter(msg.into())
    }
}
