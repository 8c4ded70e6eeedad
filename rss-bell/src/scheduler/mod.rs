//! Scheduling core.
//!
//! Each configured task is a [`PollTask`] driven by its own [`PollActor`];
//! the [`TaskRegistry`] tracks live actors and the [`Reconciler`] keeps it in
//! line with config snapshots handed over by the [`ReloadCoordinator`].

pub mod actor;
pub mod coordinator;
pub mod cursor;
pub mod handle;
pub mod messages;
pub mod reconciler;
pub mod registry;
pub mod schedule;
pub mod task;

pub use actor::{ActorOutcome, PollActor};
pub use coordinator::{DEFAULT_SHUTDOWN_TIMEOUT, ReloadCoordinator};
pub use cursor::{CycleDecision, DedupCursor, DedupMode};
pub use handle::{SendError, TaskHandle};
pub use messages::{TaskMessage, TaskSnapshot};
pub use reconciler::{ReconcilePlan, ReconcileReport, Reconciler};
pub use registry::{RegistryError, ShutdownReport, TaskRegistry};
pub use schedule::{BaseSchedule, JitteredSchedule, ScheduleZone};
pub use task::{CycleOutcome, PollTask};
