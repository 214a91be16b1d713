//! Error types for the coordination subsystem
//!
//! Safety rejections and degraded collaborators are absorbed locally and
//! never show up here. These variants cover execution faults and caller
//! misuse (activating a busy or shut-down agent, illegal transitions).

use crate::agents::lifecycle::AgentState;
use std::time::Duration;

/// Crate-wide result alias
pub type Result<T, E = AgentError> = std::result::Result<T, E>;

/// Agent error types
#[derive(Debug, Clone, thiserror::Error)]
pub enum AgentError {
    /// Failed to process input
    #[error("Processing error: {0}")]
    Processing(String),

    /// Invalid configuration
    #[error("Config error: {0}")]
    Config(String),

    /// Durable state store failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Message bus failure (closed, full)
    #[error("Bus error: {0}")]
    Bus(String),

    /// The analysis step ran past the agent's deadline
    #[error("Analysis timed out after {0:?}")]
    Timeout(Duration),

    /// The lifecycle table forbids this move
    #[error("Invalid state transition: {from} -> {to}")]
    InvalidTransition { from: AgentState, to: AgentState },

    /// The trigger is not relevant to this agent
    #[error("Trigger rejected by agent")]
    TriggerRejected,

    /// An activation cycle is already in flight
    #[error("Agent is busy (state: {0})")]
    Busy(AgentState),

    /// Agent is in maintenance
    #[error("Agent is paused")]
    Paused,

    /// Circuit breaker refused the activation
    #[error("Circuit breaker is open")]
    CircuitOpen,

    /// Agent has been permanently disabled
    #[error("Agent is shut down: {0}")]
    Shutdown(String),
}

impl From<serde_json::Error> for AgentError {
    fn from(err: serde_json::Error) -> Self {
        AgentError::Processing(err.to_string())
    }
}

impl From<anyhow::Error> for AgentError {
    fn from(err: anyhow::Error) -> Self {
        AgentError::Processing(format!("{:#}", err))
    }
}
