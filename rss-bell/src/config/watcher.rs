//! Polling config file watcher.
//!
//! Compares the file's modification time and length on every tick. A change
//! is reported once the file has stayed unchanged for the debounce window.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::events::ConfigEvent;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Fingerprint {
    modified: Option<SystemTime>,
    len: u64,
}

async fn fingerprint(path: &Path) -> Option<Fingerprint> {
    let metadata = tokio::fs::metadata(path).await.ok()?;
    Some(Fingerprint {
        modified: metadata.modified().ok(),
        len: metadata.len(),
    })
}

/// Watches a single config file.
#[derive(Debug, Clone)]
pub struct ConfigWatcher {
    path: PathBuf,
    poll_interval: Duration,
    debounce: Duration,
}

impl ConfigWatcher {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            debounce: DEFAULT_DEBOUNCE,
        }
    }

    pub fn with_intervals(mut self, poll_interval: Duration, debounce: Duration) -> Self {
        self.poll_interval = poll_interval;
        self.debounce = debounce;
        self
    }

    pub fn spawn(self, tx: mpsc::Sender<ConfigEvent>, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(tx, cancel))
    }

    /// Run until cancelled or the receiver is dropped.
    pub async fn run(self, tx: mpsc::Sender<ConfigEvent>, cancel: CancellationToken) {
        info!(path = %self.path.display(), "Watching config file");

        let mut last = fingerprint(&self.path).await;
        if last.is_none() {
            warn!(path = %self.path.display(), "Config file is not accessible yet");
        }

        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Config watcher cancelled");
                    return;
                }
                _ = ticker.tick() => {}
            }

            let current = fingerprint(&self.path).await;
            if current == last {
                continue;
            }

            let Some(settled) = self.settle(current, &cancel).await else {
                return;
            };
            last = settled;

            if settled.is_none() {
                // Deleted or mid-rename; report once it reappears.
                debug!(path = %self.path.display(), "Config file disappeared");
                continue;
            }

            let event = ConfigEvent::FileChanged {
                path: self.path.clone(),
            };
            debug!("{}", event.description());
            if tx.send(event).await.is_err() {
                debug!("Config event receiver dropped; stopping watcher");
                return;
            }
        }
    }

    /// Wait until the fingerprint is stable for one debounce window.
    ///
    /// Returns `None` when cancelled.
    async fn settle(
        &self,
        mut current: Option<Fingerprint>,
        cancel: &CancellationToken,
    ) -> Option<Option<Fingerprint>> {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return None,
                _ = tokio::time::sleep(self.debounce) => {}
            }
            let next = fingerprint(&self.path).await;
            if next == current {
                return Some(current);
            }
            current = next;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reports_change_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "tasks: {}\n").unwrap();

        let (tx, mut rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        let handle = ConfigWatcher::new(&path)
            .with_intervals(Duration::from_millis(20), Duration::from_millis(20))
            .spawn(tx, cancel.clone());

        tokio::time::sleep(Duration::from_millis(50)).await;
        std::fs::write(&path, "tasks: {}\napp_notification_url: \"x\"\n").unwrap();

        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("watcher should report the change");
        assert_eq!(event, Some(ConfigEvent::FileChanged { path: path.clone() }));

        // No further events without further writes.
        let extra = tokio::time::timeout(Duration::from_millis(200), rx.recv()).await;
        assert!(extra.is_err());

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_stops_on_cancel() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");

        let (tx, _rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();
        let handle = ConfigWatcher::new(&path).spawn(tx, cancel.clone());

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("watcher should stop")
            .unwrap();
    }
}
