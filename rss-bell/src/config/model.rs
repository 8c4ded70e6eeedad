//! Configuration file model.
//!
//! All optional fields default to empty / zero; an empty string for an
//! optional URL means "not configured".

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Top-level configuration snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Where operational messages (startup, reload results) are sent.
    pub app_notification_url: String,
    /// Poll tasks keyed by task id.
    pub tasks: BTreeMap<String, TaskConfig>,
}

impl AppConfig {
    pub fn app_notification_url(&self) -> Option<&str> {
        non_empty(&self.app_notification_url)
    }
}

/// Configuration of a single poll task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskConfig {
    /// Display name, used as the notification title.
    pub name: String,
    pub feed_url: String,
    /// Schedule expression, see [`crate::scheduler::BaseSchedule::parse`].
    pub cron: String,
    pub proxy: String,
    pub notification_url: String,
    /// Upper bound of the random delay added to every fire time.
    pub max_delay_in_second: u32,
    pub download_webhook: DownloadWebhookConfig,
}

impl TaskConfig {
    pub fn proxy(&self) -> Option<&str> {
        non_empty(&self.proxy)
    }

    pub fn notification_url(&self) -> Option<&str> {
        non_empty(&self.notification_url)
    }

    /// The download webhook, when an API URL is configured.
    pub fn download_webhook(&self) -> Option<&DownloadWebhookConfig> {
        non_empty(&self.download_webhook.api_url).map(|_| &self.download_webhook)
    }

    /// Whether `other` fires on a different timetable.
    ///
    /// Schedule changes cannot be applied to a live task; the task must be
    /// recreated.
    pub fn schedule_differs(&self, other: &TaskConfig) -> bool {
        self.cron != other.cron || self.max_delay_in_second != other.max_delay_in_second
    }
}

/// Download webhook settings of a task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadWebhookConfig {
    pub api_url: String,
    pub secret: String,
    pub engine: String,
    pub path: String,
    pub name: String,
    pub extra_options: String,
}

fn non_empty(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_optional_fields_default_to_empty() {
        let config: TaskConfig = serde_yaml::from_str(
            r#"
name: "Example"
feed_url: "https://example.com/rss.xml"
cron: "*/10 * * * *"
"#,
        )
        .unwrap();

        assert_eq!(config.proxy(), None);
        assert_eq!(config.notification_url(), None);
        assert_eq!(config.max_delay_in_second, 0);
        assert!(config.download_webhook().is_none());
    }

    #[test]
    fn test_blank_urls_are_unset() {
        let config = TaskConfig {
            proxy: "   ".to_string(),
            notification_url: String::new(),
            ..Default::default()
        };
        assert_eq!(config.proxy(), None);
        assert_eq!(config.notification_url(), None);
    }

    #[test]
    fn test_schedule_differs() {
        let base = TaskConfig {
            cron: "*/5 * * * *".to_string(),
            max_delay_in_second: 10,
            ..Default::default()
        };

        let renamed = TaskConfig {
            name: "renamed".to_string(),
            ..base.clone()
        };
        assert!(!base.schedule_differs(&renamed));

        let new_delay = TaskConfig {
            max_delay_in_second: 30,
            ..base.clone()
        };
        assert!(base.schedule_differs(&new_delay));

        let new_cron = TaskConfig {
            cron: "@hourly".to_string(),
            ..base.clone()
        };
        assert!(base.schedule_differs(&new_cron));
    }
}
