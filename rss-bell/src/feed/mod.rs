//! Feed retrieval: HTTP fetching and document parsing.

use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use reqwest::Client;
use tracing::debug;

pub use feed_parser::{Feed, FeedItem, FeedKind};

use crate::Result;
use crate::utils::http_client::{DEFAULT_REQUEST_TIMEOUT, build_client, read_success_body};

/// Downloads raw feed documents.
#[async_trait]
pub trait FeedFetcher: Send + Sync + 'static {
    async fn fetch(&self, url: &str, proxy: Option<&str>) -> Result<Vec<u8>>;
}

/// Turns raw documents into feeds.
pub trait FeedParser: Send + Sync + 'static {
    fn parse(&self, data: &[u8]) -> Result<Feed>;
}

/// [`FeedFetcher`] backed by `reqwest`, with one cached client per proxy.
pub struct HttpFeedFetcher {
    clients: DashMap<String, Client>,
    request_timeout: Duration,
}

impl HttpFeedFetcher {
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(request_timeout: Duration) -> Self {
        Self {
            clients: DashMap::new(),
            request_timeout,
        }
    }

    fn client_for(&self, proxy: Option<&str>) -> Client {
        let key = proxy.unwrap_or_default();
        if let Some(client) = self.clients.get(key) {
            return client.clone();
        }

        self.clients
            .entry(key.to_string())
            .or_insert_with(|| {
                debug!(proxy = %key, "Creating HTTP client");
                build_client(proxy, self.request_timeout)
            })
            .clone()
    }
}

impl Default for HttpFeedFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FeedFetcher for HttpFeedFetcher {
    async fn fetch(&self, url: &str, proxy: Option<&str>) -> Result<Vec<u8>> {
        let client = self.client_for(proxy);
        let response = client.get(url).send().await?;
        read_success_body("GET", url, response).await
    }
}

/// [`FeedParser`] for RSS 2.0, RSS 1.0 and Atom.
#[derive(Debug, Default, Clone, Copy)]
pub struct XmlFeedParser;

impl FeedParser for XmlFeedParser {
    fn parse(&self, data: &[u8]) -> Result<Feed> {
        Ok(feed_parser::parse(data)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_cache_per_proxy() {
        let fetcher = HttpFeedFetcher::new();
        fetcher.client_for(None);
        fetcher.client_for(None);
        fetcher.client_for(Some("http://127.0.0.1:7890"));
        fetcher.client_for(Some("not a proxy url"));

        assert_eq!(fetcher.clients.len(), 3);
    }

    #[test]
    fn test_xml_parser_maps_errors() {
        let result = XmlFeedParser.parse(b"<html><body/></html>");
        assert!(result.as_ref().is_err_and(|e| e.is_parse()));

        let feed = XmlFeedParser
            .parse(br#"<rss version="2.0"><channel><title>T</title></channel></rss>"#)
            .unwrap();
        assert_eq!(feed.title, "T");
        assert!(feed.items.is_empty());
    }
}
