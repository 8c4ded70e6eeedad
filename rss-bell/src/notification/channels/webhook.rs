//! Generic webhook notification channel.
//!
//! POSTs `{title, message, url}` as JSON to an arbitrary endpoint.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

use super::{NotificationChannel, post_json};
use crate::Result;
use crate::notification::Notification;

pub struct WebhookChannel {
    client: Client,
    url: String,
}

impl WebhookChannel {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    fn build_payload(notification: &Notification) -> serde_json::Value {
        json!({
            "title": notification.title,
            "message": notification.message,
            "url": notification.url.as_deref().unwrap_or_default(),
        })
    }
}

#[async_trait]
impl NotificationChannel for WebhookChannel {
    fn channel_type(&self) -> &'static str {
        "webhook"
    }

    async fn send(&self, notification: &Notification) -> Result<()> {
        let payload = Self::build_payload(notification);
        post_json(&self.client, self.channel_type(), &self.url, &payload).await
    }
}
