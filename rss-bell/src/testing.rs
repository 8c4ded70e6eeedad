//! In-memory collaborators for tests.
//!
//! Shared by the unit tests and the integration tests under `tests/`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::download::{DownloadRequest, DownloadWebhookSender};
use crate::feed::{FeedFetcher, XmlFeedParser};
use crate::notification::{Notification, Notifier};
use crate::services::Collaborators;
use crate::{Error, Result};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Default)]
struct FeedState {
    default_body: String,
    bodies: HashMap<String, String>,
    failing: bool,
    failing_urls: Vec<String>,
    fetches: Vec<(String, Option<String>)>,
}

/// A [`FeedFetcher`] serving documents from memory.
#[derive(Clone, Default)]
pub struct FakeFeed {
    state: Arc<Mutex<FeedState>>,
}

impl FakeFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Body served for every URL without a specific body.
    pub fn set_body(&self, body: &str) {
        lock(&self.state).default_body = body.to_string();
    }

    pub fn set_body_for(&self, url: &str, body: &str) {
        lock(&self.state)
            .bodies
            .insert(url.to_string(), body.to_string());
    }

    /// Make every fetch fail.
    pub fn fail_fetch(&self, failing: bool) {
        lock(&self.state).failing = failing;
    }

    /// Make fetches of `url` fail.
    pub fn fail_url(&self, url: &str) {
        lock(&self.state).failing_urls.push(url.to_string());
    }

    pub fn fetch_count(&self) -> usize {
        lock(&self.state).fetches.len()
    }

    pub fn fetch_count_for(&self, url: &str) -> usize {
        lock(&self.state)
            .fetches
            .iter()
            .filter(|(fetched, _)| fetched == url)
            .count()
    }

    /// Proxy used by each fetch, in order.
    pub fn proxies(&self) -> Vec<Option<String>> {
        lock(&self.state)
            .fetches
            .iter()
            .map(|(_, proxy)| proxy.clone())
            .collect()
    }
}

#[async_trait]
impl FeedFetcher for FakeFeed {
    async fn fetch(&self, url: &str, proxy: Option<&str>) -> Result<Vec<u8>> {
        let mut state = lock(&self.state);
        state
            .fetches
            .push((url.to_string(), proxy.map(str::to_string)));
        if state.failing || state.failing_urls.iter().any(|failing| failing == url) {
            return Err(Error::Other(format!("connection refused: {}", url)));
        }
        let body = state
            .bodies
            .get(url)
            .unwrap_or(&state.default_body)
            .clone();
        Ok(body.into_bytes())
    }
}

#[derive(Default)]
struct RecorderState {
    notifications: Vec<(String, Notification)>,
    downloads: Vec<(String, DownloadRequest)>,
    failing: bool,
}

/// Records notifications and download requests instead of sending them.
#[derive(Clone, Default)]
pub struct Recorder {
    state: Arc<Mutex<RecorderState>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every delivery fail (deliveries are still recorded).
    pub fn fail_deliveries(&self, failing: bool) {
        lock(&self.state).failing = failing;
    }

    /// `(target, notification)` pairs in delivery order.
    pub fn notifications(&self) -> Vec<(String, Notification)> {
        lock(&self.state).notifications.clone()
    }

    pub fn notified_messages(&self) -> Vec<String> {
        lock(&self.state)
            .notifications
            .iter()
            .map(|(_, n)| n.message.clone())
            .collect()
    }

    pub fn notified_titles(&self) -> Vec<String> {
        lock(&self.state)
            .notifications
            .iter()
            .map(|(_, n)| n.title.clone())
            .collect()
    }

    pub fn download_links(&self) -> Vec<String> {
        lock(&self.state)
            .downloads
            .iter()
            .map(|(_, request)| request.url.clone())
            .collect()
    }

    pub fn downloads(&self) -> Vec<(String, DownloadRequest)> {
        lock(&self.state).downloads.clone()
    }

    pub fn clear(&self) {
        let mut state = lock(&self.state);
        state.notifications.clear();
        state.downloads.clear();
    }
}

#[async_trait]
impl Notifier for Recorder {
    async fn notify(&self, target: &str, notification: &Notification) -> Result<()> {
        let mut state = lock(&self.state);
        state
            .notifications
            .push((target.to_string(), notification.clone()));
        if state.failing {
            return Err(Error::Other("notification rejected".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl DownloadWebhookSender for Recorder {
    async fn send(&self, api_url: &str, request: &DownloadRequest) -> Result<()> {
        let mut state = lock(&self.state);
        state.downloads.push((api_url.to_string(), request.clone()));
        if state.failing {
            return Err(Error::Other("download webhook rejected".to_string()));
        }
        Ok(())
    }
}

/// Collaborators backed by `feed` and a fresh [`Recorder`].
pub fn collaborators(feed: &FakeFeed) -> (Collaborators, Recorder) {
    let recorder = Recorder::new();
    let deps = Collaborators::new(
        Arc::new(feed.clone()),
        Arc::new(XmlFeedParser),
        Arc::new(recorder.clone()),
        Arc::new(recorder.clone()),
    );
    (deps, recorder)
}

/// An RSS 2.0 document wrapping `items`.
pub fn rss_xml(items: &[String]) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><rss version="2.0"><channel><title>Test feed</title>{}</channel></rss>"#,
        items.concat()
    )
}

/// A timestamped RSS item; link is `https://e.x/<title>`, GUID is the title.
pub fn rss_item_xml(title: &str, pub_date: &str) -> String {
    format!(
        "<item><title>{title}</title><link>https://e.x/{title}</link><guid>{title}</guid><pubDate>{pub_date}</pubDate></item>"
    )
}

/// An RSS item without a publication date.
pub fn rss_guid_item_xml(guid: &str) -> String {
    format!(
        "<item><title>{guid}</title><link>https://e.x/{guid}</link><guid>{guid}</guid></item>"
    )
}
