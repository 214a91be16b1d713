//! Agent Coordinator - fans one change event out to every relevant agent
//!
//! A trigger runs through:
//! - **Selection**: agents whose capability and trigger patterns accept the file
//! - **Activation**: relevant agents run concurrently, each behind its own mutex
//! - **Consensus**: results are merged and conflicts resolved
//! - **Reporting**: the merged outcome is broadcast and delivered to channels
//! - **Feedback**: each participant learns how many of its suggestions survived

use crate::agents::{
    AgentConfiguration, AgentEnvironment, AgentIdentity, AgentResult, AgentState, AgentStatus,
    AgentSuggestion, AnalysisCapability, AutonomousAgent, Feedback, HealthStatus, TriggerEvent,
};
use crate::bus::{AgentMessage, BusStats, MessageBus, MessagePriority, MessageType};
use crate::channels::{ChannelDispatcher, NotificationChannelConfig};
use crate::config::{CoordinatorConfig, StorageBackend};
use crate::consensus::{
    ConflictResolution, ConsensusConfig, ConsensusContext, ConsensusEngine, ConsensusHealth,
    CONSENSUS_AGENT_ID, RESOLVED_ID_PREFIX,
};
use crate::error::{AgentError, Result};
use crate::memory::{InMemoryStateStore, SledStateStore, StateStore};
use crate::observability::{CoordinatorMetrics, MetricsSnapshot};
use futures::future::join_all;
use serde::Serialize;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Sender id on coordinator-originated bus messages
pub const COORDINATOR_ID: &str = "coordinator";

/// Registered agent; the mutex keeps one cycle per agent at a time
pub type SharedAgent = Arc<tokio::sync::Mutex<AutonomousAgent>>;

#[derive(Debug, Clone, Serialize)]
pub struct ActivationFailure {
    pub agent_id: String,
    pub error: String,
}

/// Everything one `handle_trigger` call produced
#[derive(Debug, Clone, Default, Serialize)]
pub struct TriggerOutcome {
    pub analysis_id: String,
    pub trigger_id: String,
    pub file: String,
    /// Merged results after consensus
    pub results: Vec<AgentResult>,
    pub resolutions: Vec<ConflictResolution>,
    pub failures: Vec<ActivationFailure>,
    pub unresolved: usize,
}

impl TriggerOutcome {
    pub fn suggestion_count(&self) -> usize {
        self.results.iter().map(|r| r.suggestions.len()).sum()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CoordinatorHealth {
    pub healthy: bool,
    pub agents: Vec<AgentStatus>,
    pub consensus: ConsensusHealth,
    pub metrics: MetricsSnapshot,
    pub bus: BusStats,
}

pub struct AgentCoordinator {
    env: AgentEnvironment,
    consensus: ConsensusEngine,
    /// Coordinator-level destinations for merged results
    channels: Vec<NotificationChannelConfig>,
    agent_defaults: AgentConfiguration,
    agents: Vec<(String, SharedAgent)>,
    metrics: CoordinatorMetrics,
}

impl AgentCoordinator {
    pub fn new(env: AgentEnvironment, consensus: ConsensusConfig) -> Self {
        Self {
            env,
            consensus: ConsensusEngine::new(consensus),
            channels: Vec::new(),
            agent_defaults: AgentConfiguration::default(),
            agents: Vec::new(),
            metrics: CoordinatorMetrics::new(),
        }
    }

    /// Build the bus, store and channel stack described by `config`
    pub fn from_config(config: &CoordinatorConfig) -> Result<Self> {
        config.agents.validate()?;

        let store: Arc<dyn StateStore> = match config.storage.backend {
            StorageBackend::Memory => Arc::new(InMemoryStateStore::new()),
            StorageBackend::Sled => {
                let store = match &config.storage.path {
                    Some(path) => SledStateStore::open(path.clone()),
                    None => SledStateStore::new(),
                }
                .map_err(|e| AgentError::Storage(e.to_string()))?;
                Arc::new(store)
            }
        };
        let dispatcher =
            ChannelDispatcher::with_defaults().map_err(|e| AgentError::Config(e.to_string()))?;

        let env = AgentEnvironment::new(MessageBus::new(config.bus.channel_capacity))
            .with_store(store)
            .with_dispatcher(dispatcher)
            .with_checkpoint_ttl(config.storage.checkpoint_ttl());

        tracing::info!(
            backend = ?config.storage.backend,
            channels = config.channels.len(),
            "Coordinator configured"
        );

        Ok(Self::new(env, config.consensus)
            .with_channels(config.channels.clone())
            .with_agent_defaults(config.agents.clone()))
    }

    pub fn with_channels(mut self, channels: Vec<NotificationChannelConfig>) -> Self {
        self.channels = channels;
        self
    }

    pub fn with_agent_defaults(mut self, defaults: AgentConfiguration) -> Self {
        self.agent_defaults = defaults;
        self
    }

    pub fn bus(&self) -> &MessageBus {
        &self.env.bus
    }

    /// Collaborators shared with agents built outside the coordinator
    pub fn environment(&self) -> AgentEnvironment {
        self.env.clone()
    }

    pub fn consensus(&self) -> &ConsensusEngine {
        &self.consensus
    }

    pub fn metrics(&self) -> &CoordinatorMetrics {
        &self.metrics
    }

    pub fn agent(&self, agent_id: &str) -> Option<SharedAgent> {
        self.agents
            .iter()
            .find(|(id, _)| id == agent_id)
            .map(|(_, agent)| Arc::clone(agent))
    }

    // ========================================================================
    // Registration
    // ========================================================================

    /// Restore persisted state and start routing triggers to `agent`
    pub async fn register(&mut self, mut agent: AutonomousAgent) -> Result<SharedAgent> {
        let id = agent.id().to_string();
        if self.agent(&id).is_some() {
            return Err(AgentError::Config(format!("agent {} already registered", id)));
        }
        agent.restore().await;

        let shared = Arc::new(tokio::sync::Mutex::new(agent));
        self.agents.push((id.clone(), Arc::clone(&shared)));
        tracing::info!(agent_id = %id, "Agent registered");
        Ok(shared)
    }

    /// Create an agent with the coordinator defaults and register it
    pub async fn spawn_agent(
        &mut self,
        agent_id: &str,
        repository_id: &str,
        capability: Arc<dyn AnalysisCapability>,
        configuration: Option<AgentConfiguration>,
    ) -> Result<SharedAgent> {
        if self.agent(agent_id).is_some() {
            return Err(AgentError::Config(format!("agent {} already registered", agent_id)));
        }
        let identity = AgentIdentity::with_id(agent_id, capability.agent_type(), repository_id);
        let configuration = configuration.unwrap_or_else(|| self.agent_defaults.clone());
        let agent = AutonomousAgent::new(identity, configuration, capability, self.env.clone())?;
        self.register(agent).await
    }

    // ========================================================================
    // Trigger handling
    // ========================================================================

    pub async fn handle_trigger(&self, event: TriggerEvent) -> Result<TriggerOutcome> {
        if self.env.bus.is_closed() {
            return Err(AgentError::Shutdown("coordinator shut down".to_string()));
        }

        let analysis_id = uuid::Uuid::new_v4().to_string();
        self.metrics.increment_triggers();

        let mut outcome = TriggerOutcome {
            analysis_id: analysis_id.clone(),
            trigger_id: event.id.clone(),
            file: event.file.clone(),
            ..Default::default()
        };

        let relevant = self.select_agents(&event).await;
        if relevant.is_empty() {
            tracing::debug!(file = %event.file, "No agent accepted trigger");
            return Ok(outcome);
        }
        tracing::info!(
            analysis_id = %analysis_id,
            file = %event.file,
            agents = relevant.len(),
            "Handling trigger"
        );

        let activations = relevant.iter().map(|agent| {
            let agent = Arc::clone(agent);
            let event = event.clone();
            let analysis_id = analysis_id.as_str();
            async move {
                let mut guard = agent.lock().await;
                let id = guard.id().to_string();
                let result = guard.activate(analysis_id, event).await;
                let emergency = guard.current_state() == AgentState::Shutdown
                    && guard.state_data().safety.emergency_override.is_some();
                (id, result, emergency)
            }
        });

        let mut results = Vec::new();
        for (agent_id, result, emergency) in join_all(activations).await {
            if emergency {
                self.metrics.increment_emergency_shutdowns();
            }
            match result {
                Ok(result) => {
                    self.metrics.increment_activations();
                    self.metrics.add_suggestions_produced(result.suggestions.len());
                    results.push(result);
                }
                Err(e) => {
                    self.metrics.increment_activation_failures();
                    tracing::warn!(agent_id = %agent_id, analysis_id = %analysis_id, "Activation failed: {}", e);
                    outcome.failures.push(ActivationFailure {
                        agent_id,
                        error: e.to_string(),
                    });
                }
            }
        }

        let context = self.consensus_context(&event.repository).await;
        let report = self.consensus.resolve(&results, &context);
        outcome.results = report.results;
        outcome.resolutions = report.resolutions;
        outcome.unresolved = report.unresolved;
        self.metrics.add_suggestions_after_consensus(outcome.suggestion_count());

        self.report(&outcome).await;
        self.feed_back(&results, &outcome).await;

        Ok(outcome)
    }

    async fn select_agents(&self, event: &TriggerEvent) -> Vec<SharedAgent> {
        let mut relevant = Vec::new();
        for (_, agent) in &self.agents {
            let guard = agent.lock().await;
            if guard.current_state() != AgentState::Shutdown && guard.accepts(event) {
                relevant.push(Arc::clone(agent));
            }
        }
        relevant
    }

    async fn consensus_context(&self, repository_id: &str) -> ConsensusContext {
        match self.env.intelligence.get_repository_intelligence(repository_id).await {
            Ok(info) => ConsensusContext::from(&info),
            Err(e) => {
                tracing::warn!(repository = %repository_id, "Consensus context degraded: {}", e);
                ConsensusContext::default()
            }
        }
    }

    async fn report(&self, outcome: &TriggerOutcome) {
        let message = AgentMessage::new(
            COORDINATOR_ID,
            MessageType::ConsensusResult,
            json!({
                "analysis_id": outcome.analysis_id,
                "trigger_id": outcome.trigger_id,
                "file": outcome.file,
                "results": outcome.results,
                "resolved_conflicts": outcome.resolutions.len(),
                "unresolved_conflicts": outcome.unresolved,
            }),
        )
        .with_priority(MessagePriority::High)
        .with_correlation(outcome.analysis_id.clone());
        if let Err(e) = self.env.bus.broadcast(message) {
            tracing::warn!("Consensus result not broadcast: {}", e);
        }

        if self.channels.is_empty() {
            return;
        }
        let suggestions: Vec<_> = outcome
            .results
            .iter()
            .flat_map(|r| r.suggestions.iter().cloned())
            .collect();
        if suggestions.is_empty() {
            return;
        }
        let delivered = self.env.dispatcher.dispatch(&self.channels, &suggestions).await;
        tracing::debug!(delivered, "Merged results delivered");
    }

    /// Tell every participant which of its suggestions survived the merge
    async fn feed_back(&self, results: &[AgentResult], outcome: &TriggerOutcome) {
        let surviving: HashSet<&str> = outcome
            .results
            .iter()
            .flat_map(|r| r.suggestions.iter().map(|s| s.id.as_str()))
            .collect();
        let won: HashSet<(&str, &str)> = outcome
            .resolutions
            .iter()
            .filter_map(|r| {
                r.resolved_suggestion
                    .id
                    .strip_prefix(RESOLVED_ID_PREFIX)
                    .map(|id| (r.winner_agent_id.as_str(), id))
            })
            .collect();

        for result in results {
            let (survived, dropped): (Vec<AgentSuggestion>, Vec<AgentSuggestion>) =
                result.suggestions.iter().cloned().partition(|s| {
                    surviving.contains(s.id.as_str())
                        || won.contains(&(result.agent_id.as_str(), s.id.as_str()))
                });
            if let Some(agent) = self.agent(&result.agent_id) {
                agent
                    .lock()
                    .await
                    .record_consensus_outcome(&survived, &dropped)
                    .await;
            }
        }
    }

    // ========================================================================
    // Feedback, health, shutdown
    // ========================================================================

    /// Queue feedback in the agent's inbox; applied at its next activation
    pub fn send_feedback(&self, agent_id: &str, feedback: &Feedback) -> Result<String> {
        if agent_id == CONSENSUS_AGENT_ID {
            return Err(AgentError::Processing(
                "feedback on resolved results goes to the winning agent".to_string(),
            ));
        }
        let payload =
            serde_json::to_value(feedback).map_err(|e| AgentError::Processing(e.to_string()))?;
        let message = AgentMessage::new(COORDINATOR_ID, MessageType::Feedback, payload).to(agent_id);
        self.env.bus.publish(message)
    }

    pub async fn health(&self) -> CoordinatorHealth {
        let mut agents = Vec::with_capacity(self.agents.len());
        for (_, agent) in &self.agents {
            agents.push(agent.lock().await.status());
        }
        let consensus = self.consensus.health_check();
        let healthy = consensus.healthy
            && agents
                .iter()
                .all(|s| s.health_status != HealthStatus::Critical && s.emergency_reason.is_none());

        CoordinatorHealth {
            healthy,
            agents,
            consensus,
            metrics: self.metrics.snapshot(),
            bus: self.env.bus.stats(),
        }
    }

    /// Shut every agent down, then stop the bus
    pub async fn shutdown(&self) {
        for (id, agent) in &self.agents {
            if let Err(e) = agent.lock().await.shutdown().await {
                tracing::error!(agent_id = %id, "Shutdown failed: {}", e);
            }
        }
        if let Err(e) = self.env.bus.flush().await {
            tracing::debug!("Bus flush before close failed: {}", e);
        }
        self.env.bus.close();
        tracing::info!(agents = self.agents.len(), "Coordinator shut down");
    }
}
