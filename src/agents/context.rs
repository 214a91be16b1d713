//! Analysis context carried through one activation cycle

use super::types::{AgentType, TriggerEvent};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// What the intelligence service knows about a repository
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RepositoryIntelligence {
    pub repository_id: String,
    #[serde(default)]
    pub languages: Vec<String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    #[serde(default)]
    pub policies: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrganizationalPattern {
    pub id: String,
    pub name: String,
    pub description: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub file: String,
    pub author: String,
    pub summary: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct AnalysisContext {
    pub analysis_id: String,
    pub agent_id: String,
    pub agent_type: AgentType,
    pub trigger: TriggerEvent,
    pub started_at: Instant,
    /// Wall-clock deadline derived from `max_analysis_time_ms`
    pub deadline: DateTime<Utc>,
    pub repository: RepositoryIntelligence,
    pub patterns: Vec<OrganizationalPattern>,
    pub recent_activity: Vec<ActivityRecord>,
    /// Set when enrichment failed and the context is partly empty
    pub degraded: bool,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl AnalysisContext {
    pub fn new(
        analysis_id: impl Into<String>,
        agent_id: impl Into<String>,
        agent_type: AgentType,
        trigger: TriggerEvent,
        max_analysis_time: Duration,
    ) -> Self {
        let budget = chrono::Duration::from_std(max_analysis_time).unwrap_or_else(|_| chrono::Duration::days(365));
        let now = Utc::now();
        let repository = RepositoryIntelligence {
            repository_id: trigger.repository.clone(),
            ..Default::default()
        };
        Self {
            analysis_id: analysis_id.into(),
            agent_id: agent_id.into(),
            agent_type,
            trigger,
            started_at: Instant::now(),
            deadline: now.checked_add_signed(budget).unwrap_or(now),
            repository,
            patterns: Vec::new(),
            recent_activity: Vec::new(),
            degraded: false,
            metadata: HashMap::new(),
        }
    }

    /// File contents, empty when the trigger carried none
    pub fn content(&self) -> &str {
        self.trigger.content.as_deref().unwrap_or("")
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.started_at.elapsed().as_millis() as u64
    }

    /// Time left before the deadline, zero once it has passed
    pub fn remaining(&self) -> Duration {
        (self.deadline - Utc::now()).to_std().unwrap_or(Duration::ZERO)
    }

    pub fn is_past_deadline(&self) -> bool {
        Utc::now() >= self.deadline
    }
}
