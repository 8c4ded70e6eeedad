//! Config change events consumed by the reload coordinator.

use std::path::PathBuf;

use tokio::sync::mpsc;

/// Capacity of the config event channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 16;

/// Something that should trigger a config reload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigEvent {
    /// The config file's contents changed on disk.
    FileChanged { path: PathBuf },
    /// A reload was requested explicitly (e.g. `SIGHUP`).
    ReloadRequested,
}

impl ConfigEvent {
    /// Get a description of the event for logging.
    pub fn description(&self) -> String {
        match self {
            Self::FileChanged { path } => format!("Config file changed: {}", path.display()),
            Self::ReloadRequested => "Reload requested".to_string(),
        }
    }
}

pub fn channel() -> (mpsc::Sender<ConfigEvent>, mpsc::Receiver<ConfigEvent>) {
    mpsc::channel(DEFAULT_EVENT_CAPACITY)
}

/// Drain events already queued behind `first`.
///
/// A burst of changes (editors often write a file in several steps) then
/// results in a single reload. Returns the number of events coalesced.
pub fn coalesce_pending(rx: &mut mpsc::Receiver<ConfigEvent>) -> usize {
    let mut coalesced = 0;
    while rx.try_recv().is_ok() {
        coalesced += 1;
    }
    coalesced
}
