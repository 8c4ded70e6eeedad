//! A single feed's poll state: config, dedup cursor and one run cycle.

use chrono::Utc;
use tracing::{debug, info, warn};

use super::cursor::{CycleDecision, DedupCursor};
use crate::Result;
use crate::config::TaskConfig;
use crate::download::DownloadRequest;
use crate::feed::{Feed, FeedItem};
use crate::notification::Notification;
use crate::services::Collaborators;

/// Result of one run cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    FetchFailed(String),
    ParseFailed(String),
    /// The feed had no items.
    Empty,
    UpToDate,
    /// The feed switched between timestamped and untimestamped items.
    Reseeded,
    Dispatched {
        items: usize,
        failed_deliveries: usize,
    },
}

/// Poll state of one task. Owned and driven by its actor.
pub struct PollTask {
    id: String,
    config: TaskConfig,
    cursor: DedupCursor,
    deps: Collaborators,
}

impl PollTask {
    /// Fetch the feed once and seed the cursor from it.
    ///
    /// Fails when the initial fetch or parse fails.
    pub async fn new(id: impl Into<String>, config: TaskConfig, deps: Collaborators) -> Result<Self> {
        let id = id.into();
        let feed = fetch_feed(&deps, &config).await?;
        let cursor = DedupCursor::seed(&feed.items, Utc::now());
        info!(
            task_id = %id,
            items = feed.items.len(),
            cursor = ?cursor,
            "Poll task initialized"
        );
        Ok(Self::with_cursor(id, config, cursor, deps))
    }

    /// Build a task around an existing cursor without fetching.
    pub fn with_cursor(
        id: impl Into<String>,
        config: TaskConfig,
        cursor: DedupCursor,
        deps: Collaborators,
    ) -> Self {
        Self {
            id: id.into(),
            config,
            cursor,
            deps,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn config(&self) -> &TaskConfig {
        &self.config
    }

    pub fn cursor(&self) -> &DedupCursor {
        &self.cursor
    }

    /// Replace the config; the cursor is kept.
    pub fn update_config(&mut self, config: TaskConfig) {
        debug!(task_id = %self.id, "Task config updated");
        self.config = config;
    }

    /// Fetch, detect new items, dispatch them oldest first and advance the
    /// cursor.
    ///
    /// The cursor advances whether or not deliveries succeed; fetch and parse
    /// failures leave it untouched.
    pub async fn run(&mut self) -> CycleOutcome {
        let feed = match fetch_feed(&self.deps, &self.config).await {
            Ok(feed) => feed,
            Err(e) if e.is_parse() => {
                warn!(task_id = %self.id, feed_url = %self.config.feed_url, "Failed to parse feed: {}", e);
                return CycleOutcome::ParseFailed(e.to_string());
            }
            Err(e) => {
                warn!(task_id = %self.id, feed_url = %self.config.feed_url, "Failed to fetch feed: {}", e);
                return CycleOutcome::FetchFailed(e.to_string());
            }
        };

        if feed.items.is_empty() {
            debug!(task_id = %self.id, "Feed has no items");
            return CycleOutcome::Empty;
        }

        match self.cursor.evaluate(&feed.items) {
            CycleDecision::UpToDate => {
                debug!(task_id = %self.id, "No new items");
                CycleOutcome::UpToDate
            }
            CycleDecision::Reseed(cursor) => {
                info!(
                    task_id = %self.id,
                    from = ?self.cursor.mode(),
                    to = ?cursor.mode(),
                    "Feed changed dedup mode; re-seeding cursor"
                );
                self.cursor = cursor;
                CycleOutcome::Reseeded
            }
            CycleDecision::Dispatch { items, cursor } => {
                info!(task_id = %self.id, count = items.len(), "New items found");
                let mut failed_deliveries = 0;
                for item in &items {
                    failed_deliveries += self.dispatch(&feed, item).await;
                }
                self.cursor = cursor;
                CycleOutcome::Dispatched {
                    items: items.len(),
                    failed_deliveries,
                }
            }
        }
    }

    /// Deliver one item to every configured target. Returns the number of
    /// failed deliveries.
    async fn dispatch(&self, feed: &Feed, item: &FeedItem) -> usize {
        info!(task_id = %self.id, title = %item.title, link = %item.link, "Dispatching item");

        let notify = async {
            let Some(target) = self.config.notification_url() else {
                return true;
            };
            let notification =
                Notification::for_item(&self.config.name, &feed.title, &item.title, &item.link);
            match self.deps.notifier.notify(target, &notification).await {
                Ok(()) => true,
                Err(e) => {
                    warn!(task_id = %self.id, title = %item.title, "Notification failed: {}", e);
                    false
                }
            }
        };

        let download = async {
            let Some(webhook) = self.config.download_webhook() else {
                return true;
            };
            let request = DownloadRequest::new(item.link.clone(), webhook);
            match self
                .deps
                .download_webhook
                .send(webhook.api_url.trim(), &request)
                .await
            {
                Ok(()) => true,
                Err(e) => {
                    warn!(task_id = %self.id, title = %item.title, "Download webhook failed: {}", e);
                    false
                }
            }
        };

        let (notified, downloaded) = tokio::join!(notify, download);
        usize::from(!notified) + usize::from(!downloaded)
    }
}

async fn fetch_feed(deps: &Collaborators, config: &TaskConfig) -> Result<Feed> {
    let data = deps.fetcher.fetch(&config.feed_url, config.proxy()).await?;
    deps.parser.parse(&data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DownloadWebhookConfig;
    use crate::testing::{FakeFeed, collaborators, rss_item_xml, rss_xml};

    fn config() -> TaskConfig {
        TaskConfig {
            name: "Example".to_string(),
            feed_url: "https://example.com/rss".to_string(),
            cron: "*/5 * * * *".to_string(),
            notification_url: "generic://hooks.example.com/n".to_string(),
            download_webhook: DownloadWebhookConfig {
                api_url: "http://downloader/api".to_string(),
                engine: "aria2".to_string(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_new_fails_on_fetch_error() {
        let feed = FakeFeed::new();
        feed.fail_fetch(true);
        let (deps, _) = collaborators(&feed);

        assert!(PollTask::new("t", config(), deps).await.is_err());
    }

    #[tokio::test]
    async fn test_new_fails_on_parse_error() {
        let feed = FakeFeed::new();
        feed.set_body("<html></html>");
        let (deps, _) = collaborators(&feed);

        assert!(PollTask::new("t", config(), deps).await.is_err());
    }

    #[tokio::test]
    async fn test_timestamp_scenario_dispatches_once_in_order() {
        let feed = FakeFeed::new();
        feed.set_body(&rss_xml(&[
            rss_item_xml("A", "Mon, 01 Jan 2024 10:00:00 GMT"),
            rss_item_xml("B", "Mon, 01 Jan 2024 09:00:00 GMT"),
        ]));
        let (deps, recorder) = collaborators(&feed);
        let mut task = PollTask::new("t", config(), deps).await.unwrap();

        feed.set_body(&rss_xml(&[
            rss_item_xml("D", "Mon, 01 Jan 2024 10:10:00 GMT"),
            rss_item_xml("E", "Mon, 01 Jan 2024 10:07:00 GMT"),
            rss_item_xml("C", "Mon, 01 Jan 2024 10:05:00 GMT"),
            rss_item_xml("A", "Mon, 01 Jan 2024 10:00:00 GMT"),
        ]));
        assert_eq!(
            task.run().await,
            CycleOutcome::Dispatched {
                items: 3,
                failed_deliveries: 0
            }
        );
        assert_eq!(recorder.notified_messages(), vec!["C", "E", "D"]);
        assert_eq!(
            recorder.download_links(),
            vec!["https://e.x/C", "https://e.x/E", "https://e.x/D"]
        );

        // Unchanged feed: nothing more.
        assert_eq!(task.run().await, CycleOutcome::UpToDate);
        assert_eq!(recorder.notified_messages().len(), 3);
    }

    #[tokio::test]
    async fn test_failures_keep_cursor() {
        let feed = FakeFeed::new();
        feed.set_body(&rss_xml(&[rss_item_xml("A", "Mon, 01 Jan 2024 10:00:00 GMT")]));
        let (deps, _) = collaborators(&feed);
        let mut task = PollTask::new("t", config(), deps).await.unwrap();
        let before = task.cursor().clone();

        feed.fail_fetch(true);
        assert!(matches!(task.run().await, CycleOutcome::FetchFailed(_)));
        assert_eq!(task.cursor(), &before);

        feed.fail_fetch(false);
        feed.set_body("<rss><channel><item>");
        assert!(matches!(task.run().await, CycleOutcome::ParseFailed(_)));
        assert_eq!(task.cursor(), &before);
    }

    #[tokio::test]
    async fn test_cursor_advances_despite_delivery_failures() {
        let feed = FakeFeed::new();
        feed.set_body(&rss_xml(&[rss_item_xml("A", "Mon, 01 Jan 2024 10:00:00 GMT")]));
        let (deps, recorder) = collaborators(&feed);
        let mut task = PollTask::new("t", config(), deps).await.unwrap();

        recorder.fail_deliveries(true);
        feed.set_body(&rss_xml(&[
            rss_item_xml("B", "Mon, 01 Jan 2024 11:00:00 GMT"),
            rss_item_xml("A", "Mon, 01 Jan 2024 10:00:00 GMT"),
        ]));
        assert_eq!(
            task.run().await,
            CycleOutcome::Dispatched {
                items: 1,
                failed_deliveries: 2
            }
        );
        // Both targets were still attempted.
        assert_eq!(recorder.notified_messages(), vec!["B"]);
        assert_eq!(recorder.download_links(), vec!["https://e.x/B"]);

        recorder.fail_deliveries(false);
        assert_eq!(task.run().await, CycleOutcome::UpToDate);
    }

    #[tokio::test]
    async fn test_empty_feed_is_noop() {
        let feed = FakeFeed::new();
        feed.set_body(&rss_xml(&[]));
        let (deps, recorder) = collaborators(&feed);
        let mut task = PollTask::new("t", config(), deps).await.unwrap();
        assert!(matches!(task.cursor(), DedupCursor::Timestamp(_)));

        assert_eq!(task.run().await, CycleOutcome::Empty);
        assert!(recorder.notified_messages().is_empty());
    }

    #[tokio::test]
    async fn test_update_config_keeps_cursor_and_uses_new_targets() {
        let feed = FakeFeed::new();
        feed.set_body(&rss_xml(&[rss_item_xml("A", "Mon, 01 Jan 2024 10:00:00 GMT")]));
        let (deps, recorder) = collaborators(&feed);
        let mut task = PollTask::new("t", config(), deps).await.unwrap();
        let before = task.cursor().clone();

        task.update_config(TaskConfig {
            name: "Renamed".to_string(),
            download_webhook: DownloadWebhookConfig::default(),
            ..config()
        });
        assert_eq!(task.cursor(), &before);

        feed.set_body(&rss_xml(&[
            rss_item_xml("B", "Mon, 01 Jan 2024 11:00:00 GMT"),
            rss_item_xml("A", "Mon, 01 Jan 2024 10:00:00 GMT"),
        ]));
        task.run().await;
        assert_eq!(recorder.notified_titles(), vec!["Renamed"]);
        assert!(recorder.download_links().is_empty());
    }
}
