//! Messages accepted by poll actors.

use chrono::{DateTime, Utc};
use tokio::sync::oneshot;

use super::cursor::DedupCursor;
use super::task::CycleOutcome;
use crate::config::TaskConfig;

/// Messages that can be sent to a poll actor.
#[derive(Debug)]
pub enum TaskMessage {
    /// Replace the task config, keeping the cursor.
    UpdateConfig(TaskConfig),
    /// Run a cycle now instead of waiting for the next fire time.
    RunNow,
    /// Query current state (response sent via oneshot channel).
    GetState(oneshot::Sender<TaskSnapshot>),
    /// Request graceful shutdown.
    Stop,
}

/// Point-in-time view of a poll actor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSnapshot {
    pub id: String,
    pub config: TaskConfig,
    pub cursor: DedupCursor,
    pub next_run: Option<DateTime<Utc>>,
    /// Completed run cycles.
    pub runs: u64,
    pub last_outcome: Option<CycleOutcome>,
}
