//! Discord Channel Implementation
//!
//! Posts recommendation reports to a Discord webhook

use async_trait::async_trait;
use reqwest::Client;

use super::{format_report, http_client, post_json, ChannelError, ChannelKind, NotificationChannel, NotificationChannelConfig};
use crate::agents::types::AgentSuggestion;

/// Discord rejects message content above this length
const MAX_CONTENT_LEN: usize = 2000;

pub struct DiscordChannel {
    client: Client,
}

impl DiscordChannel {
    pub fn new() -> Result<Self, ChannelError> {
        Ok(Self {
            client: http_client()?,
        })
    }

    fn payload(recommendations: &[AgentSuggestion]) -> serde_json::Value {
        let mut content = format_report(recommendations);
        if content.len() > MAX_CONTENT_LEN {
            let mut cut = MAX_CONTENT_LEN - 3;
            while !content.is_char_boundary(cut) {
                cut -= 1;
            }
            content.truncate(cut);
            content.push_str("...");
        }
        serde_json::json!({ "content": content })
    }
}

#[async_trait]
impl NotificationChannel for DiscordChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Discord
    }

    async fn deliver(
        &self,
        config: &NotificationChannelConfig,
        recommendations: &[AgentSuggestion],
    ) -> Result<(), ChannelError> {
        post_json(&self.client, &config.target, &Self::payload(recommendations)).await
    }
}
