//! Durable state store for agent checkpoints
//!
//! Last-write-wins key/value storage with optional per-entry TTL. Expired
//! entries read as absent and are removed lazily on access.
//!
//! Keys used by agents:
//! - `agent:{id}:state` - latest checkpoint (expires)
//! - `agent:{id}:learning` - learning state (kept)
//! - `agent:{id}:final` - record written on shutdown (kept)

pub mod store;

pub use store::{InMemoryStateStore, SledStateStore};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[async_trait]
pub trait StateStore: Send + Sync {
    async fn get(&self, key: &str) -> anyhow::Result<Option<serde_json::Value>>;

    async fn set(&self, key: &str, value: serde_json::Value, ttl: Option<Duration>) -> anyhow::Result<()>;
}

/// On-disk envelope carrying the expiry alongside the value
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredEntry {
    pub value: serde_json::Value,
    /// Unix millis after which the entry is gone
    #[serde(default)]
    pub expires_at: Option<u64>,
}

impl StoredEntry {
    pub fn new(value: serde_json::Value, ttl: Option<Duration>, now_ms: u64) -> Self {
        Self {
            value,
            expires_at: ttl.map(|t| now_ms.saturating_add(t.as_millis() as u64)),
        }
    }

    pub fn is_expired(&self, now_ms: u64) -> bool {
        self.expires_at.is_some_and(|at| now_ms >= at)
    }
}

pub fn state_key(agent_id: &str) -> String {
    format!("agent:{}:state", agent_id)
}

pub fn learning_key(agent_id: &str) -> String {
    format!("agent:{}:learning", agent_id)
}

pub fn final_key(agent_id: &str) -> String {
    format!("agent:{}:final", agent_id)
}
