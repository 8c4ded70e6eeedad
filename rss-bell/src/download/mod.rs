//! Download webhook: hands a new item's link to an external downloader.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::Result;
use crate::config::DownloadWebhookConfig;
use crate::utils::http_client::{DEFAULT_REQUEST_TIMEOUT, build_client, read_success_body};

/// Body POSTed to the downloader's API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadRequest {
    /// Link of the item to download.
    pub url: String,
    pub secret: String,
    pub engine: String,
    pub path: String,
    pub name: String,
    pub extra_options: String,
}

impl DownloadRequest {
    pub fn new(link: impl Into<String>, config: &DownloadWebhookConfig) -> Self {
        Self {
            url: link.into(),
            secret: config.secret.clone(),
            engine: config.engine.clone(),
            path: config.path.clone(),
            name: config.name.clone(),
            extra_options: config.extra_options.clone(),
        }
    }
}

/// Sends download requests.
#[async_trait]
pub trait DownloadWebhookSender: Send + Sync + 'static {
    async fn send(&self, api_url: &str, request: &DownloadRequest) -> Result<()>;
}

/// JSON-over-HTTP [`DownloadWebhookSender`].
pub struct HttpDownloadWebhook {
    client: Client,
}

impl HttpDownloadWebhook {
    pub fn new() -> Self {
        Self::with_client(build_client(None, DEFAULT_REQUEST_TIMEOUT))
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

impl Default for HttpDownloadWebhook {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DownloadWebhookSender for HttpDownloadWebhook {
    async fn send(&self, api_url: &str, request: &DownloadRequest) -> Result<()> {
        debug!(api_url = %api_url, url = %request.url, "Triggering download webhook");
        // `.json()` sets `Content-Type: application/json`.
        let response = self.client.post(api_url).json(request).send().await?;
        read_success_body("POST", api_url, response).await?;
        Ok(())
    }
}
