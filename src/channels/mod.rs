//! Notification channels for agent recommendations
//!
//! Every channel exposes a single `deliver` operation. Failures are returned
//! to the dispatcher, which logs them and moves on; nothing here propagates
//! into the agent lifecycle.
//!
//! Supported channels:
//! - CLI (stdout report)
//! - Slack (incoming webhook)
//! - Discord (webhook)
//! - Generic JSON webhook

use crate::agents::types::AgentSuggestion;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

pub mod discord;
pub mod slack;

pub use discord::DiscordChannel;
pub use slack::SlackChannel;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// Channel Trait
// ============================================================================

#[async_trait]
pub trait NotificationChannel: Send + Sync {
    fn kind(&self) -> ChannelKind;

    /// Deliver recommendations to the destination named by `config.target`
    async fn deliver(
        &self,
        config: &NotificationChannelConfig,
        recommendations: &[AgentSuggestion],
    ) -> Result<(), ChannelError>;
}

// ============================================================================
// Channel Types
// ============================================================================

#[derive(Debug, Clone, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel {0} not configured")]
    NotConfigured(String),
    #[error("Send failed: {0}")]
    SendFailed(String),
    #[error("Webhook error: {0}")]
    WebhookError(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Cli,
    Slack,
    Discord,
    Webhook,
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelKind::Cli => write!(f, "cli"),
            ChannelKind::Slack => write!(f, "slack"),
            ChannelKind::Discord => write!(f, "discord"),
            ChannelKind::Webhook => write!(f, "webhook"),
        }
    }
}

impl ChannelKind {
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "cli" => Some(ChannelKind::Cli),
            "slack" => Some(ChannelKind::Slack),
            "discord" => Some(ChannelKind::Discord),
            "webhook" => Some(ChannelKind::Webhook),
            _ => None,
        }
    }
}

/// One configured destination
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationChannelConfig {
    pub kind: ChannelKind,
    /// Webhook URL for HTTP channels; ignored by the CLI channel
    #[serde(default)]
    pub target: String,
    /// Minimum recommendation confidence this channel receives
    #[serde(default)]
    pub confidence_threshold: f64,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

impl NotificationChannelConfig {
    pub fn cli() -> Self {
        Self {
            kind: ChannelKind::Cli,
            target: String::new(),
            confidence_threshold: 0.0,
            enabled: true,
        }
    }

    pub fn accepts(&self, suggestion: &AgentSuggestion) -> bool {
        self.enabled && suggestion.confidence >= self.confidence_threshold
    }
}

/// Plain-text rendering shared by the text channels
pub fn format_report(recommendations: &[AgentSuggestion]) -> String {
    let mut out = format!("{} recommendation(s)\n", recommendations.len());
    for rec in recommendations {
        out.push_str(&format!(
            "[{}] {} (confidence {:.2})\n    {}\n",
            rec.severity, rec.title, rec.confidence, rec.description
        ));
        if let Some(patch) = &rec.code_patch {
            out.push_str(&format!("    patch: {}\n", patch));
        }
    }
    out
}

pub(crate) fn http_client() -> Result<Client, ChannelError> {
    Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .map_err(|e| ChannelError::NotConfigured(e.to_string()))
}

pub(crate) async fn post_json(
    client: &Client,
    url: &str,
    body: &serde_json::Value,
) -> Result<(), ChannelError> {
    if url.is_empty() {
        return Err(ChannelError::NotConfigured("missing webhook url".to_string()));
    }
    let response = client
        .post(url)
        .header("Content-Type", "application/json")
        .json(body)
        .send()
        .await
        .map_err(|e| ChannelError::SendFailed(e.to_string()))?;

    if response.status().is_success() {
        Ok(())
    } else {
        Err(ChannelError::WebhookError(format!("Status: {}", response.status())))
    }
}

// ============================================================================
// CLI Channel Implementation
// ============================================================================

pub struct CliChannel;

impl Default for CliChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl CliChannel {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl NotificationChannel for CliChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Cli
    }

    async fn deliver(
        &self,
        _config: &NotificationChannelConfig,
        recommendations: &[AgentSuggestion],
    ) -> Result<(), ChannelError> {
        println!("{}", format_report(recommendations));
        Ok(())
    }
}

// ============================================================================
// Webhook Channel Implementation
// ============================================================================

pub struct WebhookChannel {
    client: Client,
}

impl WebhookChannel {
    pub fn new() -> Result<Self, ChannelError> {
        Ok(Self {
            client: http_client()?,
        })
    }
}

#[async_trait]
impl NotificationChannel for WebhookChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Webhook
    }

    async fn deliver(
        &self,
        config: &NotificationChannelConfig,
        recommendations: &[AgentSuggestion],
    ) -> Result<(), ChannelError> {
        let body = serde_json::json!({ "recommendations": recommendations });
        post_json(&self.client, &config.target, &body).await
    }
}

// ============================================================================
// Dispatcher
// ============================================================================

/// Routes recommendations to channel implementations by kind
#[derive(Clone, Default)]
pub struct ChannelDispatcher {
    channels: HashMap<ChannelKind, Arc<dyn NotificationChannel>>,
}

impl ChannelDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dispatcher with every built-in channel registered
    pub fn with_defaults() -> Result<Self, ChannelError> {
        let mut dispatcher = Self::new();
        dispatcher.register(Arc::new(CliChannel::new()));
        dispatcher.register(Arc::new(SlackChannel::new()?));
        dispatcher.register(Arc::new(DiscordChannel::new()?));
        dispatcher.register(Arc::new(WebhookChannel::new()?));
        Ok(dispatcher)
    }

    pub fn register(&mut self, channel: Arc<dyn NotificationChannel>) {
        self.channels.insert(channel.kind(), channel);
    }

    pub fn has(&self, kind: ChannelKind) -> bool {
        self.channels.contains_key(&kind)
    }

    /// Deliver to each enabled config the recommendations meeting its
    /// threshold. Returns the number of successful deliveries.
    pub async fn dispatch(
        &self,
        configs: &[NotificationChannelConfig],
        recommendations: &[AgentSuggestion],
    ) -> usize {
        let mut delivered = 0;
        for config in configs.iter().filter(|c| c.enabled) {
            let selected: Vec<AgentSuggestion> = recommendations
                .iter()
                .filter(|r| config.accepts(r))
                .cloned()
                .collect();
            if selected.is_empty() {
                continue;
            }

            let Some(channel) = self.channels.get(&config.kind) else {
                tracing::warn!(channel = %config.kind, "No channel registered for kind");
                continue;
            };

            match channel.deliver(config, &selected).await {
                Ok(()) => {
                    delivered += 1;
                    tracing::debug!(channel = %config.kind, count = selected.len(), "Delivered recommendations");
                }
                Err(e) => {
                    tracing::warn!(channel = %config.kind, target = %config.target, "Channel delivery failed: {}", e);
                }
            }
        }
        delivered
    }
}
