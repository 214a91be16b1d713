//! Message types carried by the agent message bus

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Routing type of a message
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    /// An agent moved between lifecycle states
    StateTransition,
    /// An agent reported recommendations
    Recommendation,
    /// Execution fault inside an activation cycle
    Error,
    /// Confidence adjustment moved past the broadcast delta
    AdaptationUpdate,
    /// Agent was forced offline
    EmergencyShutdown,
    /// Human/tool feedback on a recommendation
    Feedback,
    /// Merged consensus output for a trigger
    ConsensusResult,
    /// Application-defined type
    Custom(String),
}

impl MessageType {
    pub fn as_str(&self) -> &str {
        match self {
            MessageType::StateTransition => "state_transition",
            MessageType::Recommendation => "recommendation",
            MessageType::Error => "error",
            MessageType::AdaptationUpdate => "adaptation_update",
            MessageType::EmergencyShutdown => "emergency_shutdown",
            MessageType::Feedback => "feedback",
            MessageType::ConsensusResult => "consensus_result",
            MessageType::Custom(name) => name.as_str(),
        }
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Message priority levels
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum MessagePriority {
    Low = 0,
    #[default]
    Normal = 1,
    High = 2,
    Critical = 3,
}

/// Unit transported by the bus. Treat as immutable once published.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentMessage {
    /// Assigned on publish when empty
    pub message_id: String,
    pub correlation_id: String,
    pub sender: String,
    /// Direct recipient; `None` means type subscribers only
    pub to: Option<String>,
    pub message_type: MessageType,
    pub priority: MessagePriority,
    pub payload: serde_json::Value,
    /// Assigned on publish when absent
    pub created_at: Option<DateTime<Utc>>,
}

impl AgentMessage {
    pub fn new(
        sender: impl Into<String>,
        message_type: MessageType,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            message_id: String::new(),
            correlation_id: String::new(),
            sender: sender.into(),
            to: None,
            message_type,
            priority: MessagePriority::Normal,
            payload,
            created_at: None,
        }
    }

    pub fn to(mut self, recipient: impl Into<String>) -> Self {
        self.to = Some(recipient.into());
        self
    }

    pub fn with_priority(mut self, priority: MessagePriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_correlation(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = correlation_id.into();
        self
    }

    /// Fill id/timestamp/correlation when the sender left them blank
    pub(crate) fn stamp(&mut self) {
        if self.message_id.is_empty() {
            self.message_id = uuid::Uuid::new_v4().to_string();
        }
        if self.correlation_id.is_empty() {
            self.correlation_id = self.message_id.clone();
        }
        if self.created_at.is_none() {
            self.created_at = Some(Utc::now());
        }
    }

    /// Candidate subscriber keys, in delivery order
    pub fn routing_keys(&self) -> Vec<SubscriptionKey> {
        let mut keys = Vec::with_capacity(4);
        if let Some(to) = &self.to {
            keys.push(SubscriptionKey::new(Some(to), Some(&self.message_type)));
            keys.push(SubscriptionKey::new(Some(to), None));
        }
        keys.push(SubscriptionKey::Type(self.message_type.clone()));
        keys.push(SubscriptionKey::All);
        keys
    }
}

/// Registry key for a subscription
///
/// Recipient scopes and type scopes live in separate variants, so an agent
/// id never matches a message type of the same name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SubscriptionKey {
    /// Addressed to one agent, optionally narrowed to one type
    Agent {
        agent_id: String,
        message_type: Option<MessageType>,
    },
    /// Any message of this type
    Type(MessageType),
    /// Every message
    All,
}

impl SubscriptionKey {
    pub fn new(agent_id: Option<&str>, message_type: Option<&MessageType>) -> Self {
        match (agent_id, message_type) {
            (Some(agent), ty) => SubscriptionKey::Agent {
                agent_id: agent.to_string(),
                message_type: ty.cloned(),
            },
            (None, Some(ty)) => SubscriptionKey::Type(ty.clone()),
            (None, None) => SubscriptionKey::All,
        }
    }
}

impl std::fmt::Display for SubscriptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubscriptionKey::Agent {
                agent_id,
                message_type: Some(ty),
            } => write!(f, "agent:{}:{}", agent_id, ty),
            SubscriptionKey::Agent {
                agent_id,
                message_type: None,
            } => write!(f, "agent:{}", agent_id),
            SubscriptionKey::Type(ty) => write!(f, "type:{}", ty),
            SubscriptionKey::All => f.write_str("*"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_routing_keys_direct() {
        let msg = AgentMessage::new("coordinator", MessageType::Feedback, serde_json::json!({}))
            .to("security-1");
        let keys: Vec<String> = msg.routing_keys().iter().map(ToString::to_string).collect();
        assert_eq!(
            keys,
            vec!["agent:security-1:feedback", "agent:security-1", "type:feedback", "*"]
        );
    }

    #[test]
    fn test_routing_keys_broadcast() {
        let msg = AgentMessage::new("a", MessageType::Custom("ping".into()), serde_json::json!(1));
        assert_eq!(
            msg.routing_keys(),
            vec![
                SubscriptionKey::Type(MessageType::Custom("ping".into())),
                SubscriptionKey::All
            ]
        );
    }

    #[test]
    fn test_agent_id_does_not_alias_type() {
        let agent = SubscriptionKey::new(Some("error"), None);
        let ty = SubscriptionKey::new(None, Some(&MessageType::Error));
        assert_ne!(agent, ty);
        assert_ne!(agent.to_string(), ty.to_string());

        let broadcast = AgentMessage::new("a", MessageType::Error, serde_json::Value::Null);
        assert!(!broadcast.routing_keys().contains(&agent));
    }

    #[test]
    fn test_stamp_fills_blanks_only() {
        let mut msg = AgentMessage::new("a", MessageType::Error, serde_json::Value::Null)
            .with_correlation("corr-1");
        msg.stamp();
        assert!(!msg.message_id.is_empty());
        assert_eq!(msg.correlation_id, "corr-1");
        assert!(msg.created_at.is_some());

        let id = msg.message_id.clone();
        msg.stamp();
        assert_eq!(msg.message_id, id);
    }
}
