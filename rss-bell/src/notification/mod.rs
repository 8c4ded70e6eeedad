//! Notification delivery.
//!
//! A [`Notifier`] delivers a [`Notification`] to a service URL. The live
//! implementation, [`ServiceUrlNotifier`], resolves the URL into a
//! [`NotificationTarget`] and sends through the matching channel.

pub mod channels;
pub mod target;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use crate::Result;
use crate::utils::http_client::{DEFAULT_REQUEST_TIMEOUT, build_client};
use channels::{DiscordChannel, NotificationChannel, TelegramChannel, WebhookChannel};
pub use target::NotificationTarget;

/// Title of operational messages (startup, reload results).
pub const OPERATIONAL_TITLE: &str = "RSS Bell";

/// A message to deliver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub message: String,
    pub url: Option<String>,
}

impl Notification {
    pub fn new(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            url: None,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        let url = url.into();
        self.url = (!url.is_empty()).then_some(url);
        self
    }

    /// Notification for a new feed item.
    ///
    /// The title is the task name, or the feed's own title when the task has
    /// no name.
    pub fn for_item(task_name: &str, feed_title: &str, item_title: &str, link: &str) -> Self {
        let title = if task_name.trim().is_empty() {
            feed_title
        } else {
            task_name
        };
        Self::new(title, item_title).with_url(link)
    }

    /// An operational message from the service itself.
    pub fn operational(message: impl Into<String>) -> Self {
        Self::new(OPERATIONAL_TITLE, message)
    }
}

/// Delivers notifications to service URLs.
#[async_trait]
pub trait Notifier: Send + Sync + 'static {
    async fn notify(&self, target: &str, notification: &Notification) -> Result<()>;
}

/// [`Notifier`] for Discord, Telegram and generic webhook service URLs.
pub struct ServiceUrlNotifier {
    client: Client,
}

impl ServiceUrlNotifier {
    pub fn new() -> Self {
        Self::with_client(build_client(None, DEFAULT_REQUEST_TIMEOUT))
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    fn channel_for(&self, target: NotificationTarget) -> Box<dyn NotificationChannel> {
        match target {
            NotificationTarget::Discord { webhook_id, token } => {
                Box::new(DiscordChannel::new(self.client.clone(), &webhook_id, &token))
            }
            NotificationTarget::Telegram { bot_token, chats } => {
                Box::new(TelegramChannel::new(self.client.clone(), bot_token, chats))
            }
            NotificationTarget::Webhook { url } => {
                Box::new(WebhookChannel::new(self.client.clone(), url))
            }
        }
    }
}

impl Default for ServiceUrlNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Notifier for ServiceUrlNotifier {
    async fn notify(&self, target: &str, notification: &Notification) -> Result<()> {
        let target = NotificationTarget::parse(target)?;
        let channel = self.channel_for(target);
        debug!(
            channel = channel.channel_type(),
            title = %notification.title,
            "Sending notification"
        );
        channel.send(notification).await
    }
}
