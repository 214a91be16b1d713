//! Shared data model for agents, their results, and their persisted state

use super::health::HealthScore;
use super::learning::LearningState;
use super::lifecycle::{AgentState, StateTransition};
use crate::channels::NotificationChannelConfig;
use crate::safety::SafetyControls;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

// ============================================================================
// Enumerations
// ============================================================================

/// Agent specialization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentType {
    Security,
    Quality,
    Architecture,
    Performance,
    Testing,
    Documentation,
    /// Reserved for results emitted by the consensus engine
    Consensus,
}

impl AgentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentType::Security => "security",
            AgentType::Quality => "quality",
            AgentType::Architecture => "architecture",
            AgentType::Performance => "performance",
            AgentType::Testing => "testing",
            AgentType::Documentation => "documentation",
            AgentType::Consensus => "consensus",
        }
    }
}

impl fmt::Display for AgentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Info => "info",
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        };
        f.write_str(s)
    }
}

// ============================================================================
// Identity & configuration
// ============================================================================

/// Fixed at construction, never mutated
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentIdentity {
    pub id: String,
    pub agent_type: AgentType,
    pub version: String,
    pub repository_id: String,
    pub created_at: DateTime<Utc>,
    pub session_id: String,
}

impl AgentIdentity {
    pub fn new(agent_type: AgentType, repository_id: impl Into<String>) -> Self {
        Self::with_id(
            format!("{}-{}", agent_type, uuid::Uuid::new_v4()),
            agent_type,
            repository_id,
        )
    }

    pub fn with_id(id: impl Into<String>, agent_type: AgentType, repository_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            agent_type,
            version: env!("CARGO_PKG_VERSION").to_string(),
            repository_id: repository_id.into(),
            created_at: Utc::now(),
            session_id: uuid::Uuid::new_v4().to_string(),
        }
    }
}

/// Per-agent tunables. Replaced only through `AutonomousAgent::reconfigure`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfiguration {
    pub confidence_threshold: f64,
    pub max_analysis_time_ms: u64,
    /// Recommendations allowed per rate window
    pub max_recommendations_per_period: u32,
    pub rate_limit_window_ms: u64,
    pub circuit_breaker_threshold: u32,
    pub circuit_breaker_timeout_ms: u64,
    /// Step applied to the confidence adjustment on feedback
    pub learning_rate: f64,
    /// File globs this agent reacts to; empty means capability defaults
    pub trigger_patterns: Vec<String>,
    pub notification_channels: Vec<NotificationChannelConfig>,
    /// High-severity recommendations at or above this confidence are escalated
    pub escalation_threshold: f64,
}

impl Default for AgentConfiguration {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.7,
            max_analysis_time_ms: 30_000,
            max_recommendations_per_period: 50,
            rate_limit_window_ms: 3_600_000,
            circuit_breaker_threshold: 5,
            circuit_breaker_timeout_ms: 60_000,
            learning_rate: 0.05,
            trigger_patterns: Vec::new(),
            notification_channels: Vec::new(),
            escalation_threshold: 0.9,
        }
    }
}

impl AgentConfiguration {
    pub fn max_analysis_time(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.max_analysis_time_ms)
    }

    pub fn validate(&self) -> crate::error::Result<()> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(crate::error::AgentError::Config(format!(
                "confidence_threshold {} outside [0, 1]",
                self.confidence_threshold
            )));
        }
        if self.max_analysis_time_ms == 0 {
            return Err(crate::error::AgentError::Config(
                "max_analysis_time_ms must be positive".to_string(),
            ));
        }
        if self.rate_limit_window_ms == 0 {
            return Err(crate::error::AgentError::Config(
                "rate_limit_window_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Trigger events
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Create,
    Modify,
    Delete,
}

/// External description of what changed. Read-only to agents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerEvent {
    pub id: String,
    pub file: String,
    pub repository: String,
    pub change_type: ChangeType,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub git_status: String,
    #[serde(default)]
    pub file_size: u64,
    #[serde(default)]
    pub checksum: String,
    /// Changed file contents, when the producer has them
    #[serde(default)]
    pub content: Option<String>,
}

impl TriggerEvent {
    pub fn new(file: impl Into<String>, repository: impl Into<String>, change_type: ChangeType) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            file: file.into(),
            repository: repository.into(),
            change_type,
            timestamp: Utc::now(),
            git_status: "modified".to_string(),
            file_size: 0,
            checksum: String::new(),
            content: None,
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        let content = content.into();
        self.file_size = content.len() as u64;
        self.content = Some(content);
        self
    }
}

// ============================================================================
// Findings, suggestions, results
// ============================================================================

/// Typed output of an analysis capability
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub title: String,
    pub description: String,
    pub severity: Severity,
    pub confidence: f64,
    pub reasoning: String,
    #[serde(default)]
    pub line: Option<u32>,
    #[serde(default)]
    pub code_patch: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Atomic unit of agreement/disagreement between agents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSuggestion {
    pub id: String,
    pub title: String,
    pub description: String,
    pub severity: Severity,
    pub confidence: f64,
    pub reasoning: String,
    #[serde(default)]
    pub code_patch: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl AgentSuggestion {
    pub fn from_finding(finding: &Finding) -> Self {
        let mut tags = finding.tags.clone();
        if let Some(line) = finding.line {
            tags.push(format!("line:{}", line));
        }
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: finding.title.clone(),
            description: finding.description.clone(),
            severity: finding.severity,
            confidence: finding.confidence.clamp(0.0, 1.0),
            reasoning: finding.reasoning.clone(),
            code_patch: finding.code_patch.clone(),
            tags,
        }
    }
}

/// One agent's output for one activation cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentResult {
    pub agent_id: String,
    pub agent_type: AgentType,
    pub suggestions: Vec<AgentSuggestion>,
    pub confidence: f64,
    pub execution_time_ms: u64,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl AgentResult {
    /// First suggestion, used for consensus grouping
    pub fn lead(&self) -> Option<&AgentSuggestion> {
        self.suggestions.first()
    }

    /// Mean suggestion confidence (0 when empty)
    pub fn mean_confidence(suggestions: &[AgentSuggestion]) -> f64 {
        if suggestions.is_empty() {
            0.0
        } else {
            suggestions.iter().map(|s| s.confidence).sum::<f64>() / suggestions.len() as f64
        }
    }
}

// ============================================================================
// Feedback
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackOutcome {
    Accepted,
    Rejected,
    /// Rejected because the finding was wrong
    FalsePositive,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feedback {
    pub suggestion_id: String,
    pub outcome: FeedbackOutcome,
    #[serde(default)]
    pub comment: Option<String>,
}

// ============================================================================
// Metrics & persisted state
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub activations: u64,
    pub successful_cycles: u64,
    pub failed_cycles: u64,
    pub total_findings: u64,
    pub recommendations_made: u64,
    pub low_confidence_filtered: u64,
    pub recommendations_accepted: u64,
    pub recommendations_rejected: u64,
    pub false_positives: u64,
    pub acceptance_rate: f64,
    pub average_analysis_ms: f64,
    /// Suggestions that survived consensus
    pub consensus_survivals: u64,
    pub last_activation: Option<DateTime<Utc>>,
}

impl PerformanceMetrics {
    pub fn feedback_count(&self) -> u64 {
        self.recommendations_accepted + self.recommendations_rejected
    }

    pub fn record_analysis_time(&mut self, elapsed_ms: u64) {
        let n = self.successful_cycles.max(1) as f64;
        self.average_analysis_ms += (elapsed_ms as f64 - self.average_analysis_ms) / n;
    }
}

/// Full externally observable snapshot of one agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentStateData {
    pub identity: AgentIdentity,
    pub configuration: AgentConfiguration,
    pub current_state: AgentState,
    pub state_history: Vec<StateTransition>,
    pub performance: PerformanceMetrics,
    pub health: HealthScore,
    pub learning: LearningState,
    pub safety: SafetyControls,
    pub updated_at: DateTime<Utc>,
}

impl AgentStateData {
    pub fn new(identity: AgentIdentity, configuration: AgentConfiguration) -> Self {
        let safety = SafetyControls::new(
            configuration.max_recommendations_per_period,
            configuration.rate_limit_window_ms,
            configuration.circuit_breaker_threshold,
            configuration.circuit_breaker_timeout_ms,
        );
        Self {
            identity,
            configuration,
            current_state: AgentState::Idle,
            state_history: Vec::new(),
            performance: PerformanceMetrics::default(),
            health: HealthScore::default(),
            learning: LearningState::default(),
            safety,
            updated_at: Utc::now(),
        }
    }
}

/// Summary returned by `AutonomousAgent::status`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentStatus {
    pub agent_id: String,
    pub agent_type: AgentType,
    pub state: AgentState,
    pub health: f64,
    pub health_status: super::health::HealthStatus,
    pub circuit_state: crate::safety::CircuitState,
    pub open_violations: usize,
    pub skill_level: u32,
    pub effective_threshold: f64,
    pub metrics: PerformanceMetrics,
    pub emergency_reason: Option<String>,
    pub transitions: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_order() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Low > Severity::Info);
        assert_eq!(
            [Severity::Low, Severity::Critical, Severity::Medium].iter().max(),
            Some(&Severity::Critical)
        );
    }

    #[test]
    fn test_suggestion_from_finding() {
        let finding = Finding {
            title: "Hardcoded secret".into(),
            description: "API key in source".into(),
            severity: Severity::High,
            confidence: 1.4,
            reasoning: "literal assigned to api_key".into(),
            line: Some(12),
            code_patch: None,
            tags: vec!["secrets".into()],
        };
        let s = AgentSuggestion::from_finding(&finding);
        assert_eq!(s.confidence, 1.0);
        assert_eq!(s.tags, vec!["secrets".to_string(), "line:12".to_string()]);
        assert!(!s.id.is_empty());
    }

    #[test]
    fn test_configuration_validation() {
        assert!(AgentConfiguration::default().validate().is_ok());
        let bad = AgentConfiguration {
            confidence_threshold: 1.5,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_trigger_serde_defaults() {
        let json = r#"{"id":"c1","file":"src/auth.ts","repository":"repo","change_type":"modify","timestamp":"2025-01-01T00:00:00Z"}"#;
        let event: TriggerEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.change_type, ChangeType::Modify);
        assert!(event.content.is_none());
        assert_eq!(event.file_size, 0);
    }

    #[test]
    fn test_running_average() {
        let mut m = PerformanceMetrics::default();
        m.successful_cycles = 1;
        m.record_analysis_time(100);
        m.successful_cycles = 2;
        m.record_analysis_time(300);
        assert!((m.average_analysis_ms - 200.0).abs() < 1e-9);
    }
}
