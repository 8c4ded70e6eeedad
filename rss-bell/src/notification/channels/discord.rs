//! Discord webhook notification channel.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

use super::{NotificationChannel, post_json, truncate_chars};
use crate::Result;
use crate::notification::{Notification, OPERATIONAL_TITLE};

const DISCORD_WEBHOOK_BASE: &str = "https://discord.com/api/webhooks";

const EMBED_TITLE_LIMIT: usize = 256;
const EMBED_DESCRIPTION_LIMIT: usize = 4096;

/// Discord notification channel.
pub struct DiscordChannel {
    client: Client,
    webhook_url: String,
}

impl DiscordChannel {
    pub fn new(client: Client, webhook_id: &str, token: &str) -> Self {
        Self {
            client,
            webhook_url: format!("{}/{}/{}", DISCORD_WEBHOOK_BASE, webhook_id, token),
        }
    }

    fn build_payload(notification: &Notification) -> serde_json::Value {
        let mut embed = json!({
            "title": truncate_chars(&notification.title, EMBED_TITLE_LIMIT),
            "description": truncate_chars(&notification.message, EMBED_DESCRIPTION_LIMIT),
            "color": 0xf26522,
        });
        if let Some(url) = &notification.url {
            embed["url"] = json!(url);
        }

        json!({
            "username": OPERATIONAL_TITLE,
            "embeds": [embed],
        })
    }
}

#[async_trait]
impl NotificationChannel for DiscordChannel {
    fn channel_type(&self) -> &'static str {
        "discord"
    }

    async fn send(&self, notification: &Notification) -> Result<()> {
        let payload = Self::build_payload(notification);
        post_json(&self.client, self.channel_type(), &self.webhook_url, &payload).await
    }
}
