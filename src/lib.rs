//! CodeFlow Agents - autonomous code-analysis agent coordination
//!
//! Agents react to repository change events, run a pluggable analysis
//! capability inside a safety envelope (rate limiter, circuit breaker,
//! violation ledger) and report through a shared message bus. A consensus
//! engine merges what several agents said about the same change.

pub mod error;
pub mod utils;

// Infrastructure
pub mod bus;
pub mod channels;
pub mod config;
pub mod memory;
pub mod observability;
pub mod safety;

// Multi-agent system
pub mod agents;
pub mod consensus;
pub mod coordinator;

pub use agents::{
    AgentConfiguration, AgentEnvironment, AgentIdentity, AgentResult, AgentState, AgentSuggestion,
    AgentType, AnalysisCapability, AutonomousAgent, ChangeType, Feedback, FeedbackOutcome,
    Finding, IntelligenceProvider, Severity, TriggerEvent,
};
pub use bus::{AgentMessage, MessageBus, MessagePriority, MessageType};
pub use config::CoordinatorConfig;
pub use consensus::{ConsensusConfig, ConsensusEngine};
pub use coordinator::{AgentCoordinator, TriggerOutcome};
pub use error::{AgentError, Result};

/// Install a fmt subscriber filtered by `RUST_LOG` (default `codeflow_agents=info`).
/// Safe to call more than once; later calls are ignored.
pub fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("codeflow_agents=info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .try_init();
}
