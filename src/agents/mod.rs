//! Autonomous analysis agents
//!
//! An agent couples a pluggable [`AnalysisCapability`] with the shared
//! lifecycle, safety envelope, learning state and persistence handled by
//! [`AutonomousAgent`].

pub mod agent;
pub mod context;
pub mod health;
pub mod learning;
pub mod lifecycle;
pub mod quality;
pub mod rules;
pub mod security;
pub mod traits;
pub mod types;

pub use agent::{AgentEnvironment, AutonomousAgent};
pub use context::{ActivityRecord, AnalysisContext, OrganizationalPattern, RepositoryIntelligence};
pub use health::{HealthScore, HealthStatus};
pub use learning::LearningState;
pub use lifecycle::{AgentState, StateTransition};
pub use quality::QualityAnalyzer;
pub use security::SecurityAnalyzer;
pub use traits::{AnalysisCapability, IntelligenceProvider, NullIntelligence};
pub use types::{
    AgentConfiguration, AgentIdentity, AgentResult, AgentStateData, AgentStatus, AgentSuggestion,
    AgentType, ChangeType, Feedback, FeedbackOutcome, Finding, PerformanceMetrics, Severity,
    TriggerEvent,
};
