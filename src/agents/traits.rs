//! Collaborator trait definitions
//! Seams between the lifecycle driver and everything it does not own

use super::context::{ActivityRecord, AnalysisContext, OrganizationalPattern, RepositoryIntelligence};
use super::types::{AgentSuggestion, AgentType, Finding, TriggerEvent};
use crate::error::Result;
use async_trait::async_trait;

/// Specialization-specific analysis logic plugged into an agent
#[async_trait]
pub trait AnalysisCapability: Send + Sync {
    /// Specialization this capability implements
    fn agent_type(&self) -> AgentType;

    /// Inspect the change and produce typed findings
    async fn analyze(&self, context: &AnalysisContext) -> Result<Vec<Finding>>;

    /// Check if this capability cares about the trigger
    fn validate_trigger(&self, event: &TriggerEvent) -> bool {
        // Default: every change is relevant
        let _ = event;
        true
    }

    /// Extra veto on a candidate recommendation
    fn additional_safety_checks(&self, recommendation: &AgentSuggestion) -> bool {
        let _ = recommendation;
        true
    }

    /// File globs used when the configuration names none
    fn default_trigger_patterns(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Repository knowledge service. Every call may fail; callers degrade.
#[async_trait]
pub trait IntelligenceProvider: Send + Sync {
    async fn get_repository_intelligence(&self, repository_id: &str) -> anyhow::Result<RepositoryIntelligence>;

    async fn get_relevant_patterns(
        &self,
        repository_id: &str,
        agent_type: AgentType,
    ) -> anyhow::Result<Vec<OrganizationalPattern>>;

    async fn get_recent_activity(&self, repository_id: &str) -> anyhow::Result<Vec<ActivityRecord>>;

    async fn store_recommendations(&self, agent_id: &str, recommendations: &[AgentSuggestion]) -> anyhow::Result<()>;
}

/// Provider for running without an intelligence service
#[derive(Debug, Clone, Copy, Default)]
pub struct NullIntelligence;

#[async_trait]
impl IntelligenceProvider for NullIntelligence {
    async fn get_repository_intelligence(&self, repository_id: &str) -> anyhow::Result<RepositoryIntelligence> {
        Ok(RepositoryIntelligence {
            repository_id: repository_id.to_string(),
            ..Default::default()
        })
    }

    async fn get_relevant_patterns(&self, _repository_id: &str, _agent_type: AgentType) -> anyhow::Result<Vec<OrganizationalPattern>> {
        Ok(Vec::new())
    }

    async fn get_recent_activity(&self, _repository_id: &str) -> anyhow::Result<Vec<ActivityRecord>> {
        Ok(Vec::new())
    }

    async fn store_recommendations(&self, _agent_id: &str, _recommendations: &[AgentSuggestion]) -> anyhow::Result<()> {
        Ok(())
    }
}
