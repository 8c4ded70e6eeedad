//! Notification channels.
//!
//! - Discord webhooks
//! - Telegram Bot API
//! - Generic webhooks (JSON POST)

mod discord;
mod telegram;
mod webhook;

pub use discord::DiscordChannel;
pub use telegram::TelegramChannel;
pub use webhook::WebhookChannel;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, warn};

use super::Notification;
use crate::Result;
use crate::utils::http_client::read_success_body;

/// Maximum number of retries for rate-limited requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Upper bound on a server-requested backoff.
const MAX_RETRY_AFTER: Duration = Duration::from_secs(30);

/// Trait for notification channels.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Get the channel type name.
    fn channel_type(&self) -> &'static str;

    /// Send a notification through this channel.
    async fn send(&self, notification: &Notification) -> Result<()>;
}

/// POST a JSON payload, retrying on 429 while respecting `Retry-After`.
async fn post_json(
    client: &Client,
    channel: &'static str,
    url: &str,
    payload: &serde_json::Value,
) -> Result<()> {
    let mut attempts = 0;

    loop {
        attempts += 1;

        let response = client.post(url).json(payload).send().await?;

        if response.status().as_u16() == 429 && attempts < MAX_RATE_LIMIT_RETRIES {
            let wait = retry_after(&response)
                .unwrap_or(Duration::from_secs(1))
                .min(MAX_RETRY_AFTER);
            debug!(
                channel,
                attempt = attempts,
                "Rate limited (429), waiting {:?} before retry",
                wait
            );
            tokio::time::sleep(wait).await;
            continue;
        }

        return match read_success_body("POST", url, response).await {
            Ok(_) => Ok(()),
            Err(e) => {
                warn!(channel, "Notification delivery failed: {}", e);
                Err(e)
            }
        };
    }
}

fn retry_after(response: &reqwest::Response) -> Option<Duration> {
    ["Retry-After", "X-RateLimit-Reset-After"]
        .iter()
        .filter_map(|name| response.headers().get(*name))
        .filter_map(|value| value.to_str().ok()?.trim().parse::<f64>().ok())
        .find(|secs| secs.is_finite() && *secs >= 0.0)
        .map(Duration::from_secs_f64)
}

/// Truncate to at most `limit` characters, marking the cut with an ellipsis.
fn truncate_chars(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let mut out: String = text.chars().take(limit.saturating_sub(1)).collect();
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("short", 10), "short");
        assert_eq!(truncate_chars("abcdef", 4), "abc…");
        assert_eq!(truncate_chars("日本語テキスト", 3), "日本…");
    }
}
