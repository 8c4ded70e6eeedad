//! rss-bell library crate.
//!
//! Polls feeds on per-task schedules and dispatches new items to
//! notification services and download webhooks.

pub mod config;
pub mod download;
pub mod error;
pub mod feed;
pub mod logging;
pub mod notification;
pub mod scheduler;
pub mod services;
#[cfg(any(test, feature = "test-utils"))]
pub mod testing;
pub mod utils;

pub use error::{Error, Result};
