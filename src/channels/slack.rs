//! Slack Channel Implementation
//!
//! Posts recommendation reports to a Slack incoming webhook

use async_trait::async_trait;
use reqwest::Client;

use super::{format_report, http_client, post_json, ChannelError, ChannelKind, NotificationChannel, NotificationChannelConfig};
use crate::agents::types::AgentSuggestion;

pub struct SlackChannel {
    client: Client,
}

impl SlackChannel {
    pub fn new() -> Result<Self, ChannelError> {
        Ok(Self {
            client: http_client()?,
        })
    }

    fn payload(recommendations: &[AgentSuggestion]) -> serde_json::Value {
        serde_json::json!({
            "text": format!("```{}```", format_report(recommendations))
        })
    }
}

#[async_trait]
impl NotificationChannel for SlackChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Slack
    }

    async fn deliver(
        &self,
        config: &NotificationChannelConfig,
        recommendations: &[AgentSuggestion],
    ) -> Result<(), ChannelError> {
        post_json(&self.client, &config.target, &Self::payload(recommendations)).await
    }
}
