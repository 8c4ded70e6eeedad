use std::{sync::OnceLock, time::Duration};

use tracing::{debug, warn};

use crate::{Error, Result};

/// Request timeout applied to every outgoing request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

const USER_AGENT: &str = concat!("rss-bell/", env!("CARGO_PKG_VERSION"));

/// Maximum number of response body bytes echoed into error messages.
const ERROR_BODY_LIMIT: usize = 512;

pub fn install_rustls_provider() {
    static PROVIDER_INSTALLED: OnceLock<()> = OnceLock::new();
    PROVIDER_INSTALLED.get_or_init(|| {
        if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
            // Safe to ignore: can happen if another crate installed it first.
            debug!(existing_provider = ?e, "rustls CryptoProvider already installed");
        }
    });
}

/// Apply an explicit proxy to a `reqwest::ClientBuilder`.
///
/// - `None` => system/env proxy defaults
/// - `Some(url)` => route every scheme through `url`
/// - an unparseable proxy URL falls back to the system/env proxy
pub fn apply_proxy(builder: reqwest::ClientBuilder, proxy: Option<&str>) -> reqwest::ClientBuilder {
    let Some(url) = proxy else {
        return builder;
    };

    match reqwest::Proxy::all(url) {
        Ok(proxy) => builder.proxy(proxy),
        Err(error) => {
            warn!(
                proxy_url = %url,
                error = %error,
                "Invalid proxy URL; falling back to proxy from environment"
            );
            builder
        }
    }
}

/// Build the client used for feed fetches and outgoing webhooks.
pub fn build_client(proxy: Option<&str>, request_timeout: Duration) -> reqwest::Client {
    install_rustls_provider();

    let mut builder = reqwest::Client::builder().user_agent(USER_AGENT);
    if request_timeout > Duration::ZERO {
        builder = builder.timeout(request_timeout);
    }
    builder = apply_proxy(builder, proxy);

    builder.build().unwrap_or_else(|error| {
        warn!(
            error = %error,
            "Failed to create configured HTTP client; falling back to reqwest defaults"
        );
        reqwest::Client::new()
    })
}

/// Read a response body, turning non-2xx statuses into [`Error::HttpStatus`].
pub async fn read_success_body(
    method: &'static str,
    url: &str,
    response: reqwest::Response,
) -> Result<Vec<u8>> {
    let status = response.status();
    let body = response.bytes().await?;

    if !status.is_success() {
        let mut text = String::from_utf8_lossy(&body).into_owned();
        if text.len() > ERROR_BODY_LIMIT {
            let mut cut = ERROR_BODY_LIMIT;
            while !text.is_char_boundary(cut) {
                cut -= 1;
            }
            text.truncate(cut);
        }
        return Err(Error::HttpStatus {
            method,
            url: url.to_string(),
            status: status.as_u16(),
            body: text,
        });
    }

    Ok(body.to_vec())
}
