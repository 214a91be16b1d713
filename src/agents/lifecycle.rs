//! Agent lifecycle states and the transition table

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    #[default]
    Idle,
    Activated,
    Initializing,
    Analyzing,
    Synthesizing,
    Reporting,
    Learning,
    Error,
    Maintenance,
    Shutdown,
}

impl AgentState {
    /// Next state on the happy path, if any
    pub fn happy_path_next(&self) -> Option<AgentState> {
        use AgentState::*;
        match self {
            Idle => Some(Activated),
            Activated => Some(Initializing),
            Initializing => Some(Analyzing),
            Analyzing => Some(Synthesizing),
            Synthesizing => Some(Reporting),
            Reporting => Some(Learning),
            Learning => Some(Idle),
            Error | Maintenance | Shutdown => None,
        }
    }

    pub fn can_transition_to(&self, target: AgentState) -> bool {
        use AgentState::*;
        if *self == Shutdown {
            return false;
        }
        match target {
            // Reachable from anywhere except itself
            Error | Maintenance => *self != target,
            Shutdown => true,
            // Recovery paths back to idle
            Idle if matches!(self, Error | Maintenance | Learning) => true,
            _ => self.happy_path_next() == Some(target),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, AgentState::Shutdown)
    }

    /// Inside an activation cycle
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            AgentState::Activated
                | AgentState::Initializing
                | AgentState::Analyzing
                | AgentState::Synthesizing
                | AgentState::Reporting
                | AgentState::Learning
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentState::Idle => "idle",
            AgentState::Activated => "activated",
            AgentState::Initializing => "initializing",
            AgentState::Analyzing => "analyzing",
            AgentState::Synthesizing => "synthesizing",
            AgentState::Reporting => "reporting",
            AgentState::Learning => "learning",
            AgentState::Error => "error",
            AgentState::Maintenance => "maintenance",
            AgentState::Shutdown => "shutdown",
        }
    }
}

impl fmt::Display for AgentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Append-only history entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub id: String,
    pub from_state: AgentState,
    pub to_state: AgentState,
    pub timestamp: DateTime<Utc>,
    pub trigger: String,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl StateTransition {
    pub fn new(
        from_state: AgentState,
        to_state: AgentState,
        trigger: impl Into<String>,
        metadata: HashMap<String, serde_json::Value>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            from_state,
            to_state,
            timestamp: Utc::now(),
            trigger: trigger.into(),
            metadata,
        }
    }
}
