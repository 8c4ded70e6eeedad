//! Telegram Bot API notification channel.
//!
//! Sends one `sendMessage` request per configured chat with HTML formatting.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::warn;

use super::{NotificationChannel, post_json, truncate_chars};
use crate::notification::Notification;
use crate::{Error, Result};

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

const TELEGRAM_MESSAGE_LIMIT: usize = 4096;

pub struct TelegramChannel {
    client: Client,
    bot_token: String,
    chats: Vec<String>,
}

impl TelegramChannel {
    pub fn new(client: Client, bot_token: impl Into<String>, chats: Vec<String>) -> Self {
        Self {
            client,
            bot_token: bot_token.into(),
            chats,
        }
    }

    fn build_message(notification: &Notification) -> String {
        let mut text = format!(
            "<b>{}</b>\n{}",
            escape_html(&notification.title),
            escape_html(&notification.message)
        );
        if let Some(url) = &notification.url {
            text.push('\n');
            text.push_str(&escape_html(url));
        }
        truncate_chars(&text, TELEGRAM_MESSAGE_LIMIT)
    }
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

#[async_trait]
impl NotificationChannel for TelegramChannel {
    fn channel_type(&self) -> &'static str {
        "telegram"
    }

    async fn send(&self, notification: &Notification) -> Result<()> {
        let url = format!("{}/bot{}/sendMessage", TELEGRAM_API_BASE, self.bot_token);
        let text = Self::build_message(notification);

        let mut failed = Vec::new();
        for chat in &self.chats {
            let payload = json!({
                "chat_id": chat,
                "text": text,
                "parse_mode": "HTML",
            });
            if let Err(e) = post_json(&self.client, self.channel_type(), &url, &payload).await {
                warn!(chat = %chat, "Telegram sendMessage failed: {}", e);
                failed.push(chat.as_str());
            }
        }

        if failed.is_empty() {
            Ok(())
        } else {
            Err(Error::Other(format!(
                "Telegram delivery failed for chats: {}",
                failed.join(", ")
            )))
        }
    }
}
