//! Configuration: YAML model, loading and change watching.

pub mod events;
pub mod loader;
pub mod model;
pub mod watcher;

pub use events::ConfigEvent;
pub use loader::{CONFIG_PATH_ENV, ConfigLoader, DEFAULT_CONFIG_PATH, parse_config};
pub use model::{AppConfig, DownloadWebhookConfig, TaskConfig};
pub use watcher::ConfigWatcher;
