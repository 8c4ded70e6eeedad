//! Application-wide error types.

use thiserror::Error;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Application-wide error type.
#[derive(Error, Debug)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{method} {url} returned {status}: {body}")]
    HttpStatus {
        method: &'static str,
        url: String,
        status: u16,
        body: String,
    },

    #[error("Feed parse error: {0}")]
    Parse(#[from] feed_parser::ParseError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Config file error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid schedule '{spec}': {reason}")]
    InvalidSchedule { spec: String, reason: String },

    #[error("Invalid notification URL '{url}': {reason}")]
    InvalidNotificationUrl { url: String, reason: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn schedule(spec: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidSchedule {
            spec: spec.into(),
            reason: reason.into(),
        }
    }

    pub fn notification_url(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidNotificationUrl {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Whether the error came from decoding the feed rather than fetching it.
    pub fn is_parse(&self) -> bool {
        matches!(self, Self::Parse(_))
    }
}
