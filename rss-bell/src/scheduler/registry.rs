//! Live task registry.
//!
//! Maps each task id to the config snapshot it was built from and the handle
//! of its actor. Actors run in a `JoinSet` owned by the registry, so the key
//! set is always the set of scheduled, runnable tasks.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures::FutureExt;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::actor::{ActorOutcome, PollActor};
use super::handle::{SendError, TaskHandle};
use super::schedule::JitteredSchedule;
use super::task::PollTask;
use crate::config::TaskConfig;

/// Error type for registry operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("Task already registered: {0}")]
    TaskExists(String),
    #[error("Task not found: {0}")]
    TaskNotFound(String),
    #[error("Task {id} unreachable: {source}")]
    Unreachable { id: String, source: SendError },
}

/// Exit record of one actor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskExit {
    pub id: String,
    generation: u64,
    pub outcome: ActorOutcome,
}

/// A registered task.
#[derive(Debug)]
pub struct RegistryEntry {
    pub config: TaskConfig,
    pub handle: TaskHandle,
    generation: u64,
}

/// Summary of a registry shutdown.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    pub stopped: usize,
    /// Actors still running when the timeout expired; they were aborted.
    pub aborted: usize,
}

pub struct TaskRegistry {
    entries: HashMap<String, RegistryEntry>,
    task_set: JoinSet<TaskExit>,
    cancellation_token: CancellationToken,
    next_generation: u64,
}

impl TaskRegistry {
    pub fn new(cancellation_token: CancellationToken) -> Self {
        Self {
            entries: HashMap::new(),
            task_set: JoinSet::new(),
            cancellation_token,
            next_generation: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&RegistryEntry> {
        self.entries.get(id)
    }

    /// Registered ids, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.entries.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Config snapshot of every registered task.
    pub fn configs(&self) -> impl Iterator<Item = (&String, &TaskConfig)> {
        self.entries.iter().map(|(id, entry)| (id, &entry.config))
    }

    /// Number of actors still running, including ones being torn down.
    pub fn running_actors(&self) -> usize {
        self.task_set.len()
    }

    pub fn child_token(&self) -> CancellationToken {
        self.cancellation_token.child_token()
    }

    /// Spawn an actor for `task` and register it.
    pub fn register(
        &mut self,
        task: PollTask,
        schedule: JitteredSchedule,
    ) -> Result<TaskHandle, RegistryError> {
        let id = task.id().to_string();
        if self.entries.contains_key(&id) {
            return Err(RegistryError::TaskExists(id));
        }

        let config = task.config().clone();
        let (actor, handle) = PollActor::new(task, schedule, self.child_token());
        let generation = self.next_generation;
        self.next_generation += 1;

        let exit_id = id.clone();
        self.task_set.spawn(async move {
            let outcome = AssertUnwindSafe(actor.run())
                .catch_unwind()
                .await
                .unwrap_or(ActorOutcome::Panicked);
            TaskExit {
                id: exit_id,
                generation,
                outcome,
            }
        });

        debug!(task_id = %id, "Registered poll task");
        self.entries.insert(
            id,
            RegistryEntry {
                config,
                handle: handle.clone(),
                generation,
            },
        );
        Ok(handle)
    }

    /// Cancel a task's actor and drop its entry.
    pub fn remove(&mut self, id: &str) -> Option<RegistryEntry> {
        let entry = self.entries.remove(id)?;
        entry.handle.cancel();
        debug!(task_id = %id, "Removed poll task");
        Some(entry)
    }

    /// Send a new config to a live task and record it as the snapshot.
    pub async fn update_config(
        &mut self,
        id: &str,
        config: TaskConfig,
    ) -> Result<(), RegistryError> {
        let entry = self
            .entries
            .get_mut(id)
            .ok_or_else(|| RegistryError::TaskNotFound(id.to_string()))?;

        entry
            .handle
            .update_config(config.clone())
            .await
            .map_err(|source| RegistryError::Unreachable {
                id: id.to_string(),
                source,
            })?;
        entry.config = config;
        Ok(())
    }

    /// Collect finished actors without waiting.
    ///
    /// An actor that exited on its own (panic, closed mailbox) leaves a stale
    /// entry behind; such entries are dropped. Returns their ids.
    pub fn reap_finished(&mut self) -> Vec<String> {
        let mut dropped = Vec::new();
        while let Some(result) = self.task_set.try_join_next() {
            match result {
                Ok(exit) => {
                    if let Some(id) = self.handle_exit(exit) {
                        dropped.push(id);
                    }
                }
                Err(e) => error!("Poll actor join error: {}", e),
            }
        }
        dropped
    }

    fn handle_exit(&mut self, exit: TaskExit) -> Option<String> {
        let current = self
            .entries
            .get(&exit.id)
            .is_some_and(|entry| entry.generation == exit.generation);

        if !current {
            debug!(task_id = %exit.id, outcome = ?exit.outcome, "Reaped retired poll actor");
            return None;
        }

        warn!(
            task_id = %exit.id,
            outcome = ?exit.outcome,
            "Poll actor exited unexpectedly; dropping its entry"
        );
        self.entries.remove(&exit.id);
        Some(exit.id)
    }

    /// Cancel every actor and wait for them, up to `timeout`.
    pub async fn shutdown(&mut self, timeout: Duration) -> ShutdownReport {
        info!(tasks = self.entries.len(), "Shutting down poll tasks");
        self.cancellation_token.cancel();
        for entry in self.entries.values() {
            entry.handle.cancel();
        }
        self.entries.clear();

        let mut report = ShutdownReport::default();
        let drain = async {
            while self.task_set.join_next().await.is_some() {
                report.stopped += 1;
            }
        };
        if tokio::time::timeout(timeout, drain).await.is_err() {
            report.aborted = self.task_set.len();
            warn!(aborted = report.aborted, "Poll actors did not stop in time; aborting");
            self.task_set.abort_all();
        }
        report
    }
}
