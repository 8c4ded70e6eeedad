//! Reload coordinator.
//!
//! Owns the task registry and is the only place reconciliation happens. The
//! registry lock is held for a whole reconciliation, so reloads never
//! overlap. A snapshot that fails to load leaves the registry untouched.

use std::time::Duration;

use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::messages::TaskSnapshot;
use super::reconciler::{ReconcileReport, Reconciler};
use super::registry::{RegistryError, ShutdownReport, TaskRegistry};
use crate::Result;
use crate::config::events::coalesce_pending;
use crate::config::{AppConfig, ConfigEvent, ConfigLoader};
use crate::notification::Notification;
use crate::services::Collaborators;

/// Upper bound on waiting for actors during shutdown.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// How often finished actors are collected.
const REAP_INTERVAL: Duration = Duration::from_secs(60);

struct CoordinatorState {
    registry: TaskRegistry,
    /// Last snapshot applied.
    applied: Option<AppConfig>,
}

pub struct ReloadCoordinator {
    loader: ConfigLoader,
    reconciler: Reconciler,
    deps: Collaborators,
    state: Mutex<CoordinatorState>,
    cancellation_token: CancellationToken,
}

impl ReloadCoordinator {
    pub fn new(
        loader: ConfigLoader,
        deps: Collaborators,
        cancellation_token: CancellationToken,
    ) -> Self {
        let registry = TaskRegistry::new(cancellation_token.child_token());
        Self {
            loader,
            reconciler: Reconciler::new(deps.clone()),
            deps,
            state: Mutex::new(CoordinatorState {
                registry,
                applied: None,
            }),
            cancellation_token,
        }
    }

    /// Load the config and register its tasks.
    ///
    /// Fails only when the config cannot be loaded; individual task failures
    /// are reported in the returned [`ReconcileReport`].
    pub async fn initial_load(&self) -> Result<ReconcileReport> {
        let config = self.loader.load().await?;
        info!(tasks = config.tasks.len(), "Registering tasks");
        let report = self.apply(config.clone()).await;
        self.notify_operator(&config, format!("Tasks added, {}", report.summary()))
            .await;
        Ok(report)
    }

    /// Reload the config file and reconcile.
    ///
    /// Returns `None` when the snapshot could not be loaded.
    pub async fn reload(&self) -> Option<ReconcileReport> {
        let config = match self.loader.load().await {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    path = %self.loader.path().display(),
                    "Ignoring config change, snapshot failed to load: {}", e
                );
                return None;
            }
        };

        let report = self.apply(config.clone()).await;
        self.notify_operator(&config, format!("Config reloaded, {}", report.summary()))
            .await;
        Some(report)
    }

    /// Reconcile the registry against `config`.
    pub async fn apply(&self, config: AppConfig) -> ReconcileReport {
        let mut state = self.state.lock().await;
        state.registry.reap_finished();
        let report = self
            .reconciler
            .reconcile(&mut state.registry, &config.tasks)
            .await;
        state.applied = Some(config);
        report
    }

    /// Consume config events until cancelled or the channel closes.
    pub async fn run(&self, mut events: mpsc::Receiver<ConfigEvent>) {
        let mut reap = tokio::time::interval(REAP_INTERVAL);
        reap.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        reap.tick().await;

        loop {
            tokio::select! {
                biased;

                _ = self.cancellation_token.cancelled() => {
                    debug!("Reload coordinator cancelled");
                    break;
                }

                event = events.recv() => {
                    let Some(event) = event else {
                        debug!("Config event channel closed");
                        break;
                    };
                    let coalesced = coalesce_pending(&mut events);
                    info!(coalesced, "{}", event.description());
                    self.reload().await;
                }

                _ = reap.tick() => self.restart_crashed().await,
            }
        }
    }

    /// Drop entries of actors that died and rebuild them from the last
    /// applied snapshot.
    async fn restart_crashed(&self) {
        let mut state = self.state.lock().await;
        let dropped = state.registry.reap_finished();
        if dropped.is_empty() {
            return;
        }
        let Some(config) = state.applied.clone() else {
            return;
        };

        error!(tasks = ?dropped, "Restarting poll tasks that exited unexpectedly");
        let report = self
            .reconciler
            .reconcile(&mut state.registry, &config.tasks)
            .await;
        if !report.failed.is_empty() {
            warn!(tasks = ?report.failed, "Some poll tasks could not be restarted");
        }
    }

    pub async fn task_ids(&self) -> Vec<String> {
        self.state.lock().await.registry.ids()
    }

    /// Snapshot of one task's actor.
    pub async fn task_snapshot(&self, id: &str) -> Option<TaskSnapshot> {
        let handle = {
            let state = self.state.lock().await;
            state.registry.get(id)?.handle.clone()
        };
        handle.snapshot().await.ok()
    }

    /// Run one poll cycle of `id` outside its schedule.
    pub async fn run_now(&self, id: &str) -> std::result::Result<(), RegistryError> {
        let handle = {
            let state = self.state.lock().await;
            match state.registry.get(id) {
                Some(entry) => entry.handle.clone(),
                None => return Err(RegistryError::TaskNotFound(id.to_string())),
            }
        };
        handle
            .run_now()
            .await
            .map_err(|source| RegistryError::Unreachable {
                id: id.to_string(),
                source,
            })
    }

    /// Stop every task, waiting at most [`DEFAULT_SHUTDOWN_TIMEOUT`].
    pub async fn shutdown(&self) -> ShutdownReport {
        self.cancellation_token.cancel();
        let mut state = self.state.lock().await;
        state.registry.shutdown(DEFAULT_SHUTDOWN_TIMEOUT).await
    }

    async fn notify_operator(&self, config: &AppConfig, message: String) {
        let Some(target) = config.app_notification_url() else {
            return;
        };
        let notification = Notification::operational(message);
        if let Err(e) = self.deps.notifier.notify(target, &notification).await {
            warn!("Failed to send operational notification: {}", e);
        }
    }
}
