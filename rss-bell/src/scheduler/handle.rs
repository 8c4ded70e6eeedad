//! Handle for sending messages to a poll actor.

use std::fmt;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use super::messages::{TaskMessage, TaskSnapshot};
use crate::config::TaskConfig;

/// Default mailbox capacity for poll actors.
pub const DEFAULT_MAILBOX_CAPACITY: usize = 32;

/// Default timeout for send operations when the mailbox is full.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_millis(100);

/// Error type for send operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendError {
    /// The actor has stopped and is no longer accepting messages.
    ActorStopped,
    /// The mailbox stayed full for the whole timeout.
    Timeout,
}

impl fmt::Display for SendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SendError::ActorStopped => write!(f, "Actor has stopped"),
            SendError::Timeout => write!(f, "Send operation timed out"),
        }
    }
}

impl std::error::Error for SendError {}

/// A handle to a poll actor.
///
/// Dropping every handle closes the mailbox, which stops the actor.
#[derive(Clone)]
pub struct TaskHandle {
    id: String,
    sender: mpsc::Sender<TaskMessage>,
    cancellation_token: CancellationToken,
    spawned_at: Instant,
}

impl TaskHandle {
    pub fn new(
        id: impl Into<String>,
        sender: mpsc::Sender<TaskMessage>,
        cancellation_token: CancellationToken,
    ) -> Self {
        Self {
            id: id.into(),
            sender,
            cancellation_token,
            spawned_at: Instant::now(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn uptime(&self) -> Duration {
        self.spawned_at.elapsed()
    }

    /// Send a message, waiting up to [`DEFAULT_SEND_TIMEOUT`] when the
    /// mailbox is full.
    pub async fn send(&self, msg: TaskMessage) -> Result<(), SendError> {
        match self.sender.try_send(msg) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(msg)) => {
                match tokio::time::timeout(DEFAULT_SEND_TIMEOUT, self.sender.reserve()).await {
                    Ok(Ok(permit)) => {
                        permit.send(msg);
                        Ok(())
                    }
                    Ok(Err(_)) => Err(SendError::ActorStopped),
                    Err(_) => Err(SendError::Timeout),
                }
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(SendError::ActorStopped),
        }
    }

    pub async fn update_config(&self, config: TaskConfig) -> Result<(), SendError> {
        self.send(TaskMessage::UpdateConfig(config)).await
    }

    pub async fn run_now(&self) -> Result<(), SendError> {
        self.send(TaskMessage::RunNow).await
    }

    /// Ask the actor for a snapshot of its state.
    ///
    /// Answered between run cycles, so this waits for an in-flight cycle.
    pub async fn snapshot(&self) -> Result<TaskSnapshot, SendError> {
        let (tx, rx) = oneshot::channel();
        self.send(TaskMessage::GetState(tx)).await?;
        rx.await.map_err(|_| SendError::ActorStopped)
    }

    pub async fn stop(&self) -> Result<(), SendError> {
        self.send(TaskMessage::Stop).await
    }

    pub fn cancel(&self) {
        self.cancellation_token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }

    /// Whether the actor's mailbox is closed.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

impl fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.id)
            .field("cancelled", &self.is_cancelled())
            .field("closed", &self.is_closed())
            .finish()
    }
}
