//! Reconciliation of the live registry against a config snapshot.
//!
//! For every task id:
//! - registered but absent from the snapshot: removed
//! - present in both with a different schedule: removed and rebuilt (fresh
//!   cursor)
//! - present in both with other differences: config updated in place
//! - only in the snapshot: built and registered
//!
//! Tasks are built concurrently and a failure only affects its own id.

use std::collections::{BTreeMap, HashMap};

use futures::future::join_all;
use tracing::{debug, info, warn};

use super::registry::TaskRegistry;
use super::schedule::JitteredSchedule;
use super::task::PollTask;
use crate::Result;
use crate::config::TaskConfig;
use crate::services::Collaborators;

/// Changes needed to bring a registry in line with a snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcilePlan {
    pub remove: Vec<String>,
    pub recreate: Vec<String>,
    pub update: Vec<String>,
    pub create: Vec<String>,
}

impl ReconcilePlan {
    /// Diff `current` (registered configs) against `desired`. Ids are sorted.
    pub fn diff<'a>(
        current: impl IntoIterator<Item = (&'a String, &'a TaskConfig)>,
        desired: &BTreeMap<String, TaskConfig>,
    ) -> Self {
        let current: HashMap<&String, &TaskConfig> = current.into_iter().collect();
        let mut plan = Self::default();

        for (id, config) in &current {
            match desired.get(*id) {
                None => plan.remove.push((*id).clone()),
                Some(wanted) if config.schedule_differs(wanted) => {
                    plan.recreate.push((*id).clone())
                }
                Some(wanted) if *config != wanted => plan.update.push((*id).clone()),
                Some(_) => {}
            }
        }
        plan.create = desired
            .keys()
            .filter(|id| !current.contains_key(id))
            .cloned()
            .collect();

        plan.remove.sort();
        plan.recreate.sort();
        plan.update.sort();
        plan
    }

    pub fn is_empty(&self) -> bool {
        self.remove.is_empty()
            && self.recreate.is_empty()
            && self.update.is_empty()
            && self.create.is_empty()
    }
}

/// What a reconciliation did, by task id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub added: Vec<String>,
    pub updated: Vec<String>,
    pub recreated: Vec<String>,
    pub removed: Vec<String>,
    /// Ids that could not be (re)registered. They are absent from the
    /// registry afterwards.
    pub failed: Vec<String>,
}

impl ReconcileReport {
    pub fn is_noop(&self) -> bool {
        self.added.is_empty()
            && self.updated.is_empty()
            && self.recreated.is_empty()
            && self.removed.is_empty()
            && self.failed.is_empty()
    }

    /// One-line summary for operational messages.
    pub fn summary(&self) -> String {
        let mut parts = Vec::new();
        for (label, ids) in [
            ("added", &self.added),
            ("updated", &self.updated),
            ("recreated", &self.recreated),
            ("removed", &self.removed),
            ("failed", &self.failed),
        ] {
            if !ids.is_empty() {
                parts.push(format!("{}: {}", label, ids.join(", ")));
            }
        }
        if parts.is_empty() {
            "no changes".to_string()
        } else {
            parts.join("; ")
        }
    }

    fn sort(&mut self) {
        self.added.sort();
        self.updated.sort();
        self.recreated.sort();
        self.removed.sort();
        self.failed.sort();
    }
}

/// Applies config snapshots to a [`TaskRegistry`].
#[derive(Clone)]
pub struct Reconciler {
    deps: Collaborators,
}

impl Reconciler {
    pub fn new(deps: Collaborators) -> Self {
        Self { deps }
    }

    /// Bring `registry` in line with `desired`.
    ///
    /// Returns after every construction has finished.
    pub async fn reconcile(
        &self,
        registry: &mut TaskRegistry,
        desired: &BTreeMap<String, TaskConfig>,
    ) -> ReconcileReport {
        let plan = ReconcilePlan::diff(registry.configs(), desired);
        debug!(plan = ?plan, "Reconciliation plan");
        let mut report = ReconcileReport::default();

        for id in &plan.remove {
            registry.remove(id);
            report.removed.push(id.clone());
        }

        let mut recreate = plan.recreate;
        for id in plan.update {
            let Some(config) = desired.get(&id) else {
                continue;
            };
            match registry.update_config(&id, config.clone()).await {
                Ok(()) => report.updated.push(id),
                Err(e) => {
                    warn!(task_id = %id, "Config update failed, recreating task: {}", e);
                    recreate.push(id);
                }
            }
        }

        for id in &recreate {
            registry.remove(id);
        }

        let builds = recreate
            .iter()
            .map(|id| (id, true))
            .chain(plan.create.iter().map(|id| (id, false)))
            .filter_map(|(id, recreated)| desired.get(id).map(|config| (id, config, recreated)))
            .map(|(id, config, recreated)| async move {
                (id, recreated, self.build(id, config).await)
            });

        for (id, recreated, built) in join_all(builds).await {
            let registered = built.and_then(|(task, schedule)| {
                registry
                    .register(task, schedule)
                    .map_err(|e| crate::Error::Other(e.to_string()))
            });
            match registered {
                Ok(_) if recreated => report.recreated.push(id.clone()),
                Ok(_) => report.added.push(id.clone()),
                Err(e) => {
                    warn!(task_id = %id, "Failed to register task: {}", e);
                    report.failed.push(id.clone());
                }
            }
        }

        report.sort();
        if !report.is_noop() {
            info!(
                tasks = registry.len(),
                "Reconciled tasks: {}",
                report.summary()
            );
        }
        report
    }

    async fn build(&self, id: &str, config: &TaskConfig) -> Result<(PollTask, JitteredSchedule)> {
        let schedule = JitteredSchedule::parse(&config.cron, config.max_delay_in_second)?;
        let task = PollTask::new(id, config.clone(), self.deps.clone()).await?;
        Ok((task, schedule))
    }
}
