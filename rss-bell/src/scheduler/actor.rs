//! Poll actor: drives one [`PollTask`] on its schedule.
//!
//! The actor sleeps until the next fire time, runs one cycle, then computes
//! the following fire time from when the cycle finished. A task therefore
//! never overlaps with itself, and fires missed while a slow cycle was
//! running collapse into one. Config updates and queries arrive through the
//! mailbox and are handled between cycles.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::handle::{DEFAULT_MAILBOX_CAPACITY, TaskHandle};
use super::messages::{TaskMessage, TaskSnapshot};
use super::schedule::JitteredSchedule;
use super::task::{CycleOutcome, PollTask};

/// How an actor's run loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorOutcome {
    /// Stop message received or every handle dropped.
    Stopped,
    /// Cancellation token fired.
    Cancelled,
    /// The run loop panicked.
    Panicked,
}

pub struct PollActor {
    task: PollTask,
    schedule: JitteredSchedule,
    mailbox: mpsc::Receiver<TaskMessage>,
    cancellation_token: CancellationToken,
    next_run: Option<DateTime<Utc>>,
    runs: u64,
    last_outcome: Option<CycleOutcome>,
}

impl PollActor {
    pub fn new(
        task: PollTask,
        schedule: JitteredSchedule,
        cancellation_token: CancellationToken,
    ) -> (Self, TaskHandle) {
        let (tx, rx) = mpsc::channel(DEFAULT_MAILBOX_CAPACITY);
        let handle = TaskHandle::new(task.id(), tx, cancellation_token.clone());
        let actor = Self {
            task,
            schedule,
            mailbox: rx,
            cancellation_token,
            next_run: None,
            runs: 0,
            last_outcome: None,
        };
        (actor, handle)
    }

    pub fn id(&self) -> &str {
        self.task.id()
    }

    /// Run the actor's main loop.
    pub async fn run(mut self) -> ActorOutcome {
        info!(task_id = %self.id(), "Poll actor starting");
        self.schedule_after(Utc::now());

        loop {
            let timer = Self::create_timer(self.time_until_next_run());

            tokio::select! {
                biased;

                _ = self.cancellation_token.cancelled() => {
                    info!(task_id = %self.id(), "Poll actor cancelled");
                    return ActorOutcome::Cancelled;
                }

                msg = self.mailbox.recv() => {
                    let Some(msg) = msg else {
                        debug!(task_id = %self.id(), "Mailbox closed");
                        break;
                    };
                    if let Some(outcome) = self.handle_message(msg).await {
                        if outcome == ActorOutcome::Stopped {
                            break;
                        }
                        return outcome;
                    }
                }

                _ = timer => {
                    if !self.execute_cycle().await {
                        info!(task_id = %self.id(), "Poll actor cancelled mid-cycle");
                        return ActorOutcome::Cancelled;
                    }
                    // Compute the next fire from the later of the slot just
                    // served and now, so an early wake-up cannot serve the
                    // same slot twice.
                    let from = self
                        .next_run
                        .map_or_else(Utc::now, |scheduled| scheduled.max(Utc::now()));
                    self.schedule_after(from);
                }
            }
        }

        info!(task_id = %self.id(), "Poll actor stopped");
        ActorOutcome::Stopped
    }

    /// Handle a mailbox message. Returns `Some` when the actor should exit.
    async fn handle_message(&mut self, msg: TaskMessage) -> Option<ActorOutcome> {
        match msg {
            TaskMessage::UpdateConfig(config) => {
                self.task.update_config(config);
                None
            }
            TaskMessage::RunNow => {
                debug!(task_id = %self.id(), "Manual run requested");
                if self.execute_cycle().await {
                    None
                } else {
                    Some(ActorOutcome::Cancelled)
                }
            }
            TaskMessage::GetState(reply) => {
                // The requester may have given up.
                let _ = reply.send(self.snapshot());
                None
            }
            TaskMessage::Stop => {
                debug!(task_id = %self.id(), "Stop requested");
                Some(ActorOutcome::Stopped)
            }
        }
    }

    /// Run one cycle. Returns `false` when cancelled before it finished.
    async fn execute_cycle(&mut self) -> bool {
        let outcome = tokio::select! {
            biased;
            _ = self.cancellation_token.cancelled() => return false,
            outcome = self.task.run() => outcome,
        };

        self.runs += 1;
        debug!(task_id = %self.task.id(), outcome = ?outcome, "Run cycle finished");
        self.last_outcome = Some(outcome);
        true
    }

    fn schedule_after(&mut self, from: DateTime<Utc>) {
        self.next_run = self.schedule.next(from);
        match self.next_run {
            Some(next_run) => {
                debug!(task_id = %self.id(), next_run = %next_run, "Next run scheduled")
            }
            None => warn!(task_id = %self.id(), "Schedule has no future fire times"),
        }
    }

    fn time_until_next_run(&self) -> Option<Duration> {
        self.next_run
            .map(|next| (next - Utc::now()).to_std().unwrap_or(Duration::ZERO))
    }

    async fn create_timer(duration: Option<Duration>) {
        match duration {
            Some(duration) => tokio::time::sleep(duration).await,
            None => std::future::pending::<()>().await,
        }
    }

    fn snapshot(&self) -> TaskSnapshot {
        TaskSnapshot {
            id: self.task.id().to_string(),
            config: self.task.config().clone(),
            cursor: self.task.cursor().clone(),
            next_run: self.next_run,
            runs: self.runs,
            last_outcome: self.last_outcome.clone(),
        }
    }
}
