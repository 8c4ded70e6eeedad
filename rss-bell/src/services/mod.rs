//! Shared collaborators injected into poll tasks.

use std::sync::Arc;

use crate::download::{DownloadWebhookSender, HttpDownloadWebhook};
use crate::feed::{FeedFetcher, FeedParser, HttpFeedFetcher, XmlFeedParser};
use crate::notification::{Notifier, ServiceUrlNotifier};

/// The I/O seams of a poll task.
///
/// Cloning is cheap; every task shares the same instances.
#[derive(Clone)]
pub struct Collaborators {
    pub fetcher: Arc<dyn FeedFetcher>,
    pub parser: Arc<dyn FeedParser>,
    pub notifier: Arc<dyn Notifier>,
    pub download_webhook: Arc<dyn DownloadWebhookSender>,
}

impl Collaborators {
    pub fn new(
        fetcher: Arc<dyn FeedFetcher>,
        parser: Arc<dyn FeedParser>,
        notifier: Arc<dyn Notifier>,
        download_webhook: Arc<dyn DownloadWebhookSender>,
    ) -> Self {
        Self {
            fetcher,
            parser,
            notifier,
            download_webhook,
        }
    }

    /// HTTP-backed collaborators used by the service.
    pub fn live() -> Self {
        Self::new(
            Arc::new(HttpFeedFetcher::new()),
            Arc::new(XmlFeedParser),
            Arc::new(ServiceUrlNotifier::new()),
            Arc::new(HttpDownloadWebhook::new()),
        )
    }
}
