//! Autonomous agent lifecycle driver
//!
//! `AutonomousAgent` owns one `AgentStateData` and drives it through the
//! activation cycle:
//!
//! IDLE -> ACTIVATED -> INITIALIZING -> ANALYZING -> SYNTHESIZING -> REPORTING -> LEARNING -> IDLE
//!
//! The specialization only supplies an `AnalysisCapability`; everything else
//! (safety gating, reporting, learning, checkpointing) lives here. All
//! mutating operations take `&mut self`, so one agent can never run two
//! cycles at once. Callers that share an agent wrap it in a mutex.

use super::context::AnalysisContext;
use super::learning::LearningState;
use super::lifecycle::{AgentState, StateTransition};
use super::traits::{AnalysisCapability, IntelligenceProvider, NullIntelligence};
use super::types::{
    AgentConfiguration, AgentIdentity, AgentResult, AgentStateData, AgentStatus, AgentSuggestion,
    Feedback, FeedbackOutcome, Finding, PerformanceMetrics, Severity, TriggerEvent,
};
use crate::bus::{AgentMessage, MessageBus, MessagePriority, MessageType, Subscription};
use crate::channels::{ChannelDispatcher, CliChannel};
use crate::error::{AgentError, Result};
use crate::memory::{final_key, learning_key, state_key, InMemoryStateStore, StateStore};
use crate::safety::{CircuitBreaker, EmergencyOverride, RateLimiter, ViolationKind};
use crate::utils::glob_match;
use chrono::Utc;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Adjustment changes above this are broadcast
const ADAPTATION_BROADCAST_DELTA: f64 = 0.01;
/// Tag added to escalated recommendations
pub const ESCALATED_TAG: &str = "escalated";
/// Default lifetime of `agent:{id}:state` checkpoints
pub const DEFAULT_CHECKPOINT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

// ============================================================================
// Environment
// ============================================================================

/// Collaborators injected into every agent
#[derive(Clone)]
pub struct AgentEnvironment {
    pub bus: MessageBus,
    pub store: Arc<dyn StateStore>,
    pub intelligence: Arc<dyn IntelligenceProvider>,
    pub dispatcher: ChannelDispatcher,
    pub checkpoint_ttl: Option<Duration>,
}

impl AgentEnvironment {
    /// In-memory store, no intelligence service, CLI channel only
    pub fn new(bus: MessageBus) -> Self {
        let mut dispatcher = ChannelDispatcher::new();
        dispatcher.register(Arc::new(CliChannel::new()));
        Self {
            bus,
            store: Arc::new(InMemoryStateStore::new()),
            intelligence: Arc::new(NullIntelligence),
            dispatcher,
            checkpoint_ttl: Some(DEFAULT_CHECKPOINT_TTL),
        }
    }

    pub fn with_store(mut self, store: Arc<dyn StateStore>) -> Self {
        self.store = store;
        self
    }

    pub fn with_intelligence(mut self, intelligence: Arc<dyn IntelligenceProvider>) -> Self {
        self.intelligence = intelligence;
        self
    }

    pub fn with_dispatcher(mut self, dispatcher: ChannelDispatcher) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    pub fn with_checkpoint_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.checkpoint_ttl = ttl;
        self
    }
}

// ============================================================================
// Agent
// ============================================================================

pub struct AutonomousAgent {
    state: AgentStateData,
    capability: Arc<dyn AnalysisCapability>,
    env: AgentEnvironment,
    inbox: Option<(Subscription, mpsc::Receiver<AgentMessage>)>,
}

impl AutonomousAgent {
    pub fn new(
        identity: AgentIdentity,
        configuration: AgentConfiguration,
        capability: Arc<dyn AnalysisCapability>,
        env: AgentEnvironment,
    ) -> Result<Self> {
        configuration.validate()?;
        if capability.agent_type() != identity.agent_type {
            return Err(AgentError::Config(format!(
                "capability type {} does not match agent type {}",
                capability.agent_type(),
                identity.agent_type
            )));
        }

        let inbox = env.bus.subscribe_channel(None, Some(&identity.id));
        tracing::info!(agent_id = %identity.id, agent_type = %identity.agent_type, "Agent created");

        Ok(Self {
            state: AgentStateData::new(identity, configuration),
            capability,
            env,
            inbox: Some(inbox),
        })
    }

    pub fn id(&self) -> &str {
        &self.state.identity.id
    }

    pub fn identity(&self) -> &AgentIdentity {
        &self.state.identity
    }

    pub fn current_state(&self) -> AgentState {
        self.state.current_state
    }

    pub fn state_data(&self) -> &AgentStateData {
        &self.state
    }

    pub fn history(&self) -> &[StateTransition] {
        &self.state.state_history
    }

    pub fn configuration(&self) -> &AgentConfiguration {
        &self.state.configuration
    }

    pub fn effective_threshold(&self) -> f64 {
        self.state
            .learning
            .effective_threshold(self.state.configuration.confidence_threshold)
    }

    // ------------------------------------------------------------------------
    // Startup restore
    // ------------------------------------------------------------------------

    /// Load learning state and metrics persisted under this agent's id.
    /// Missing or unreadable records are skipped.
    pub async fn restore(&mut self) {
        let id = self.id().to_string();

        match self.env.store.get(&learning_key(&id)).await {
            Ok(Some(value)) => match serde_json::from_value::<LearningState>(value) {
                Ok(learning) => {
                    tracing::info!(agent_id = %id, skill = learning.skill_level, "Restored learning state");
                    self.state.learning = learning;
                }
                Err(e) => tracing::warn!(agent_id = %id, "Unreadable learning record: {}", e),
            },
            Ok(None) => {}
            Err(e) => tracing::warn!(agent_id = %id, "Failed to load learning state: {}", e),
        }

        let snapshot = match self.env.store.get(&state_key(&id)).await {
            Ok(Some(value)) => Some(value),
            Ok(None) => self.env.store.get(&final_key(&id)).await.ok().flatten(),
            Err(e) => {
                tracing::warn!(agent_id = %id, "Failed to load checkpoint: {}", e);
                None
            }
        };
        if let Some(value) = snapshot {
            match value
                .get("performance")
                .cloned()
                .map(serde_json::from_value::<PerformanceMetrics>)
            {
                Some(Ok(performance)) => self.state.performance = performance,
                Some(Err(e)) => tracing::warn!(agent_id = %id, "Unreadable checkpoint metrics: {}", e),
                None => {}
            }
        }
        self.refresh_health();
    }

    // ------------------------------------------------------------------------
    // Activation cycle
    // ------------------------------------------------------------------------

    /// Whether this agent handles the trigger at all
    pub fn accepts(&self, trigger: &TriggerEvent) -> bool {
        if !self.capability.validate_trigger(trigger) {
            return false;
        }
        let patterns = if self.state.configuration.trigger_patterns.is_empty() {
            self.capability.default_trigger_patterns()
        } else {
            self.state.configuration.trigger_patterns.clone()
        };
        patterns.is_empty() || patterns.iter().any(|p| glob_match(p, &trigger.file))
    }

    /// Run one full activation cycle for `trigger`
    pub async fn activate(&mut self, analysis_id: &str, trigger: TriggerEvent) -> Result<AgentResult> {
        match self.state.current_state {
            AgentState::Shutdown => return Err(AgentError::Shutdown(self.shutdown_reason())),
            AgentState::Maintenance => return Err(AgentError::Paused),
            s if s.is_active() => return Err(AgentError::Busy(s)),
            _ => {}
        }
        if !self.accepts(&trigger) {
            return Err(AgentError::TriggerRejected);
        }
        if !self.state.safety.circuit_breaker.allow_request() {
            tracing::warn!(agent_id = %self.id(), "Activation refused, circuit breaker open");
            return Err(AgentError::CircuitOpen);
        }

        if self.state.current_state == AgentState::Error {
            self.transition(AgentState::Idle, "recovery", HashMap::new()).await?;
        }

        self.drain_inbox().await;
        if self.state.current_state == AgentState::Shutdown {
            return Err(AgentError::Shutdown(self.shutdown_reason()));
        }

        self.state.performance.activations += 1;
        self.state.performance.last_activation = Some(Utc::now());

        match self.run_cycle(analysis_id, trigger).await {
            Ok(result) => Ok(result),
            Err(e) if self.state.current_state == AgentState::Shutdown => Err(e),
            Err(e) => {
                self.handle_execution_fault(analysis_id, &e).await;
                Err(e)
            }
        }
    }

    async fn run_cycle(&mut self, analysis_id: &str, trigger: TriggerEvent) -> Result<AgentResult> {
        let mut meta = HashMap::new();
        meta.insert("analysis_id".to_string(), json!(analysis_id));
        meta.insert("file".to_string(), json!(trigger.file));
        self.transition(AgentState::Activated, "activate", meta).await?;

        let mut ctx = AnalysisContext::new(
            analysis_id,
            self.id(),
            self.state.identity.agent_type,
            trigger,
            self.state.configuration.max_analysis_time(),
        );

        // INITIALIZING
        self.transition(AgentState::Initializing, "context_created", HashMap::new()).await?;
        self.enrich(&mut ctx).await?;

        // ANALYZING
        self.transition(AgentState::Analyzing, "context_ready", HashMap::new()).await?;
        let capability = Arc::clone(&self.capability);
        let findings = self.within(&ctx, capability.analyze(&ctx)).await??;

        // SYNTHESIZING
        self.transition(AgentState::Synthesizing, "analysis_complete", HashMap::new()).await?;
        let violations_before = self.state.safety.violations.len();
        let recommendations = self.synthesize(&findings);
        if self.state.safety.should_emergency_shutdown() {
            let reason = format!(
                "{} unmitigated safety violations during synthesis",
                self.state.safety.unmitigated_count()
            );
            self.emergency_shutdown(&reason).await;
            return Err(AgentError::Shutdown(reason));
        }
        let clean_cycle = self.state.safety.violations.len() == violations_before;

        // REPORTING
        self.transition(AgentState::Reporting, "synthesis_complete", HashMap::new()).await?;
        self.report(analysis_id, &recommendations).await;

        // LEARNING
        self.transition(AgentState::Learning, "report_complete", HashMap::new()).await?;
        let elapsed_ms = ctx.elapsed_ms();
        self.learn(&findings, &recommendations, elapsed_ms, clean_cycle).await;

        self.transition(AgentState::Idle, "cycle_complete", HashMap::new()).await?;

        let mut metadata = HashMap::new();
        metadata.insert("analysis_id".to_string(), json!(analysis_id));
        metadata.insert("file".to_string(), json!(ctx.trigger.file));
        metadata.insert("findings".to_string(), json!(findings.len()));
        metadata.insert("degraded_context".to_string(), json!(ctx.degraded));

        Ok(AgentResult {
            agent_id: self.id().to_string(),
            agent_type: self.state.identity.agent_type,
            confidence: AgentResult::mean_confidence(&recommendations),
            suggestions: recommendations,
            execution_time_ms: elapsed_ms,
            metadata,
        })
    }

    /// Pull repository knowledge into the context. Provider failures only
    /// degrade the context; running past the deadline is a timeout.
    async fn enrich(&self, ctx: &mut AnalysisContext) -> Result<()> {
        let repo = ctx.trigger.repository.clone();
        let intelligence = &self.env.intelligence;

        match self.within(ctx, intelligence.get_repository_intelligence(&repo)).await? {
            Ok(info) => ctx.repository = info,
            Err(e) => {
                tracing::warn!(agent_id = %self.id(), repository = %repo, "Repository intelligence unavailable: {}", e);
                ctx.degraded = true;
            }
        }
        match self.within(ctx, intelligence.get_relevant_patterns(&repo, ctx.agent_type)).await? {
            Ok(patterns) => ctx.patterns = patterns,
            Err(e) => {
                tracing::warn!(agent_id = %self.id(), "Pattern lookup failed: {}", e);
                ctx.degraded = true;
            }
        }
        match self.within(ctx, intelligence.get_recent_activity(&repo)).await? {
            Ok(activity) => ctx.recent_activity = activity,
            Err(e) => {
                tracing::warn!(agent_id = %self.id(), "Recent activity lookup failed: {}", e);
                ctx.degraded = true;
            }
        }
        Ok(())
    }

    /// Run `fut` within what is left of the analysis budget
    async fn within<F: std::future::Future>(&self, ctx: &AnalysisContext, fut: F) -> Result<F::Output> {
        tokio::time::timeout(ctx.remaining(), fut)
            .await
            .map_err(|_| AgentError::Timeout(self.state.configuration.max_analysis_time()))
    }

    /// Turn findings into recommendations that cleared every gate
    fn synthesize(&mut self, findings: &[Finding]) -> Vec<AgentSuggestion> {
        let threshold = self.effective_threshold();
        let escalation = self.state.configuration.escalation_threshold;
        let rate_key = self.state.identity.id.clone();
        let mut kept = Vec::new();

        for finding in findings {
            self.state.performance.total_findings += 1;
            let mut suggestion = AgentSuggestion::from_finding(finding);

            if suggestion.confidence < threshold {
                self.state.performance.low_confidence_filtered += 1;
                tracing::debug!(agent_id = %rate_key, confidence = suggestion.confidence, threshold, "Below confidence threshold");
                continue;
            }

            let safety = &mut self.state.safety;
            let blocked = if !safety.circuit_breaker.is_passable() {
                Some((ViolationKind::CircuitBreaker, "circuit breaker open"))
            } else if !self.capability.additional_safety_checks(&suggestion) {
                Some((ViolationKind::SpecializationCheck, "specialization check rejected recommendation"))
            } else if !safety.rate_limiter.can_take_action(&rate_key) {
                Some((ViolationKind::RateLimit, "recommendation rate limit reached"))
            } else {
                None
            };

            if let Some((kind, why)) = blocked {
                safety.record_violation(kind, format!("{}: {}", why, suggestion.title), Some(suggestion.id.clone()));
                if safety.should_emergency_shutdown() {
                    break;
                }
                continue;
            }

            if suggestion.severity >= Severity::High && suggestion.confidence >= escalation {
                suggestion.tags.push(ESCALATED_TAG.to_string());
            }
            kept.push(suggestion);
        }
        kept
    }

    async fn report(&mut self, analysis_id: &str, recommendations: &[AgentSuggestion]) {
        if recommendations.is_empty() {
            return;
        }
        self.state.performance.recommendations_made += recommendations.len() as u64;

        self.env
            .dispatcher
            .dispatch(&self.state.configuration.notification_channels, recommendations)
            .await;

        if let Err(e) = self
            .env
            .intelligence
            .store_recommendations(self.id(), recommendations)
            .await
        {
            tracing::warn!(agent_id = %self.id(), "Failed to store recommendations: {}", e);
        }

        let escalated: Vec<&AgentSuggestion> = recommendations
            .iter()
            .filter(|r| r.tags.iter().any(|t| t == ESCALATED_TAG))
            .collect();
        let priority = if escalated.is_empty() {
            MessagePriority::Normal
        } else {
            MessagePriority::High
        };
        self.emit(
            MessageType::Recommendation,
            priority,
            json!({
                "agent_id": self.id(),
                "analysis_id": analysis_id,
                "recommendations": recommendations,
                "escalated": escalated.iter().map(|r| r.id.as_str()).collect::<Vec<_>>(),
            }),
            Some(analysis_id),
        );
    }

    async fn learn(&mut self, findings: &[Finding], recommendations: &[AgentSuggestion], elapsed_ms: u64, clean_cycle: bool) {
        self.state.learning.record_cycle(findings.len(), recommendations);

        let perf = &mut self.state.performance;
        perf.successful_cycles += 1;
        perf.record_analysis_time(elapsed_ms);

        self.state.safety.circuit_breaker.record_success();
        self.state.health.recover_reliability();
        if clean_cycle {
            let cleared = self.state.safety.mitigate_all();
            if cleared > 0 {
                tracing::debug!(agent_id = %self.id(), cleared, "Mitigated open safety violations");
            }
        }
        self.refresh_health();
        self.persist_learning().await;
    }

    // ------------------------------------------------------------------------
    // Fault handling
    // ------------------------------------------------------------------------

    async fn handle_execution_fault(&mut self, analysis_id: &str, error: &AgentError) {
        tracing::error!(agent_id = %self.id(), analysis_id, state = %self.state.current_state, "Activation failed: {}", error);
        self.state.performance.failed_cycles += 1;

        let mut meta = HashMap::new();
        meta.insert("error".to_string(), json!(error.to_string()));
        if let Err(e) = self.transition(AgentState::Error, "execution_fault", meta).await {
            tracing::warn!(agent_id = %self.id(), "Could not enter error state: {}", e);
        }

        self.state.safety.circuit_breaker.record_failure();
        self.state
            .safety
            .record_violation(ViolationKind::UnspecifiedError, error.to_string(), None);
        self.state.health.degrade_reliability();
        self.refresh_health();

        self.emit(
            MessageType::Error,
            MessagePriority::High,
            json!({
                "agent_id": self.id(),
                "analysis_id": analysis_id,
                "error": error.to_string(),
                "circuit_state": self.state.safety.circuit_breaker.state(),
            }),
            Some(analysis_id),
        );

        if self.state.safety.should_emergency_shutdown() {
            let reason = format!(
                "{} unmitigated safety violations, last: {}",
                self.state.safety.unmitigated_count(),
                error
            );
            self.emergency_shutdown(&reason).await;
        }
    }

    async fn emergency_shutdown(&mut self, reason: &str) {
        let violation_count = self.state.safety.unmitigated_count();
        self.state.safety.emergency_override = Some(EmergencyOverride {
            id: uuid::Uuid::new_v4().to_string(),
            reason: reason.to_string(),
            violation_count,
            triggered_at: Utc::now(),
        });
        tracing::error!(agent_id = %self.id(), violations = violation_count, "Emergency shutdown: {}", reason);

        self.emit(
            MessageType::EmergencyShutdown,
            MessagePriority::Critical,
            json!({
                "agent_id": self.id(),
                "reason": reason,
                "violation_count": violation_count,
            }),
            None,
        );
        self.finish_shutdown("emergency_shutdown").await;
    }

    fn shutdown_reason(&self) -> String {
        self.state
            .safety
            .emergency_override
            .as_ref()
            .map(|o| o.reason.clone())
            .unwrap_or_else(|| "agent was shut down".to_string())
    }

    // ------------------------------------------------------------------------
    // Operator controls
    // ------------------------------------------------------------------------

    /// Put the agent into maintenance; activations are refused until resumed
    pub async fn pause(&mut self) -> Result<()> {
        match self.state.current_state {
            AgentState::Maintenance => Ok(()),
            AgentState::Shutdown => Err(AgentError::Shutdown(self.shutdown_reason())),
            s if s.is_active() => Err(AgentError::Busy(s)),
            _ => self.transition(AgentState::Maintenance, "pause", HashMap::new()).await,
        }
    }

    pub async fn resume(&mut self) -> Result<()> {
        match self.state.current_state {
            AgentState::Maintenance => self.transition(AgentState::Idle, "resume", HashMap::new()).await,
            AgentState::Idle => Ok(()),
            AgentState::Shutdown => Err(AgentError::Shutdown(self.shutdown_reason())),
            other => Err(AgentError::InvalidTransition {
                from: other,
                to: AgentState::Idle,
            }),
        }
    }

    /// Apply pending inbox feedback, persist the final record and leave the bus
    pub async fn shutdown(&mut self) -> Result<()> {
        if self.state.current_state == AgentState::Shutdown {
            return Ok(());
        }
        self.drain_inbox().await;
        if self.state.current_state != AgentState::Shutdown {
            self.finish_shutdown("shutdown").await;
        }
        tracing::info!(agent_id = %self.id(), "Agent shut down");
        Ok(())
    }

    async fn finish_shutdown(&mut self, trigger: &str) {
        self.state.safety.circuit_breaker.close();
        if let Err(e) = self.transition(AgentState::Shutdown, trigger, HashMap::new()).await {
            tracing::error!(agent_id = %self.id(), "Shutdown transition failed: {}", e);
        }
        if let Some((subscription, _)) = self.inbox.take() {
            subscription.unsubscribe();
        }
    }

    /// Replace the configuration; safety limits are rebuilt, open
    /// violations and learning state are kept
    pub async fn reconfigure(&mut self, configuration: AgentConfiguration) -> Result<()> {
        configuration.validate()?;
        match self.state.current_state {
            AgentState::Shutdown => return Err(AgentError::Shutdown(self.shutdown_reason())),
            s if s.is_active() => return Err(AgentError::Busy(s)),
            _ => {}
        }

        let old = &self.state.configuration;
        if old.max_recommendations_per_period != configuration.max_recommendations_per_period
            || old.rate_limit_window_ms != configuration.rate_limit_window_ms
        {
            self.state.safety.rate_limiter = RateLimiter::new(
                configuration.max_recommendations_per_period,
                configuration.rate_limit_window_ms,
            );
        }
        if old.circuit_breaker_threshold != configuration.circuit_breaker_threshold
            || old.circuit_breaker_timeout_ms != configuration.circuit_breaker_timeout_ms
        {
            self.state.safety.circuit_breaker = CircuitBreaker::new(
                configuration.circuit_breaker_threshold,
                configuration.circuit_breaker_timeout_ms,
            );
        }

        self.state.configuration = configuration;
        self.state.updated_at = Utc::now();
        self.refresh_health();
        self.checkpoint().await;
        tracing::info!(agent_id = %self.id(), "Agent reconfigured");
        Ok(())
    }

    pub fn status(&self) -> AgentStatus {
        let s = &self.state;
        AgentStatus {
            agent_id: s.identity.id.clone(),
            agent_type: s.identity.agent_type,
            state: s.current_state,
            health: s.health.overall(),
            health_status: s.health.status(),
            circuit_state: s.safety.circuit_breaker.state(),
            open_violations: s.safety.unmitigated_count(),
            skill_level: s.learning.skill_level,
            effective_threshold: self.effective_threshold(),
            metrics: s.performance.clone(),
            emergency_reason: s.safety.emergency_override.as_ref().map(|o| o.reason.clone()),
            transitions: s.state_history.len(),
        }
    }

    // ------------------------------------------------------------------------
    // Feedback
    // ------------------------------------------------------------------------

    pub async fn process_feedback(&mut self, feedback: &Feedback) -> Result<()> {
        if self.state.current_state == AgentState::Shutdown {
            return Err(AgentError::Shutdown(self.shutdown_reason()));
        }

        let perf = &mut self.state.performance;
        match feedback.outcome {
            FeedbackOutcome::Accepted => perf.recommendations_accepted += 1,
            FeedbackOutcome::Rejected => perf.recommendations_rejected += 1,
            FeedbackOutcome::FalsePositive => {
                perf.recommendations_rejected += 1;
                perf.false_positives += 1;
            }
        }
        perf.acceptance_rate = perf.recommendations_accepted as f64 / perf.feedback_count() as f64;

        let config = &self.state.configuration;
        let delta = self.state.learning.apply_feedback(
            feedback.outcome,
            config.confidence_threshold,
            config.learning_rate,
        );
        tracing::debug!(agent_id = %self.id(), suggestion_id = %feedback.suggestion_id, delta, "Feedback applied");

        if delta.abs() > ADAPTATION_BROADCAST_DELTA {
            self.emit(
                MessageType::AdaptationUpdate,
                MessagePriority::Normal,
                json!({
                    "agent_id": self.id(),
                    "confidence_adjustment": self.state.learning.confidence_adjustment,
                    "effective_threshold": self.effective_threshold(),
                    "delta": delta,
                }),
                None,
            );
        }

        self.refresh_health();
        self.persist_learning().await;
        Ok(())
    }

    /// Learn from which of this agent's suggestions survived consensus
    pub async fn record_consensus_outcome(&mut self, survived: &[AgentSuggestion], dropped: &[AgentSuggestion]) {
        self.state.performance.consensus_survivals += survived.len() as u64;
        self.state.learning.record_consensus(survived, dropped);
        self.persist_learning().await;
        tracing::debug!(
            agent_id = %self.id(),
            survived = survived.len(),
            dropped = dropped.len(),
            "Consensus outcome recorded"
        );
    }

    async fn drain_inbox(&mut self) {
        let mut pending = Vec::new();
        if let Some((_, rx)) = self.inbox.as_mut() {
            while let Ok(message) = rx.try_recv() {
                pending.push(message);
            }
        }

        for message in pending {
            if message.message_type != MessageType::Feedback {
                tracing::debug!(agent_id = %self.id(), message_type = %message.message_type, "Ignoring inbox message");
                continue;
            }
            match serde_json::from_value::<Feedback>(message.payload) {
                Ok(feedback) => {
                    if let Err(e) = self.process_feedback(&feedback).await {
                        tracing::warn!(agent_id = %self.id(), "Inbox feedback not applied: {}", e);
                    }
                }
                Err(e) => tracing::warn!(agent_id = %self.id(), "Malformed feedback message: {}", e),
            }
        }
    }

    // ------------------------------------------------------------------------
    // Transitions & persistence
    // ------------------------------------------------------------------------

    async fn transition(
        &mut self,
        to: AgentState,
        trigger: &str,
        metadata: HashMap<String, serde_json::Value>,
    ) -> Result<()> {
        let from = self.state.current_state;
        if !from.can_transition_to(to) {
            return Err(AgentError::InvalidTransition { from, to });
        }

        let transition = StateTransition::new(from, to, trigger, metadata);
        self.state.state_history.push(transition.clone());
        self.state.current_state = to;
        self.state.updated_at = Utc::now();
        tracing::debug!(agent_id = %self.id(), from = %from, to = %to, trigger, "State transition");

        self.emit(
            MessageType::StateTransition,
            MessagePriority::Low,
            json!({ "agent_id": self.id(), "transition": transition }),
            None,
        );

        if to == AgentState::Shutdown {
            self.persist_final().await;
        } else {
            self.checkpoint().await;
        }
        Ok(())
    }

    fn refresh_health(&mut self) {
        let open = self.state.safety.unmitigated_count();
        let s = &mut self.state;
        s.health.refresh(&s.performance, &s.configuration, open);
    }

    fn emit(&self, message_type: MessageType, priority: MessagePriority, payload: serde_json::Value, correlation: Option<&str>) {
        let mut message = AgentMessage::new(self.id(), message_type, payload).with_priority(priority);
        if let Some(correlation_id) = correlation {
            message = message.with_correlation(correlation_id);
        }
        if let Err(e) = self.env.bus.broadcast(message) {
            tracing::warn!(agent_id = %self.id(), "Failed to publish message: {}", e);
        }
    }

    async fn write(&self, key: String, value: serde_json::Result<serde_json::Value>, ttl: Option<Duration>) {
        let value = match value {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(agent_id = %self.id(), key = %key, "Failed to serialize record: {}", e);
                return;
            }
        };
        if let Err(e) = self.env.store.set(&key, value, ttl).await {
            tracing::warn!(agent_id = %self.id(), key = %key, "Failed to persist record: {}", e);
        }
    }

    async fn checkpoint(&self) {
        self.write(state_key(self.id()), serde_json::to_value(&self.state), self.env.checkpoint_ttl)
            .await;
    }

    async fn persist_learning(&self) {
        self.write(learning_key(self.id()), serde_json::to_value(&self.state.learning), None)
            .await;
    }

    async fn persist_final(&self) {
        self.write(final_key(self.id()), serde_json::to_value(&self.state), None).await;
        self.persist_learning().await;
    }
}

impl Drop for AutonomousAgent {
    fn drop(&mut self) {
        if let Some((subscription, _)) = self.inbox.take() {
            subscription.unsubscribe();
        }
    }
}
