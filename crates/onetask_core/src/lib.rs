//! Task execution engine for the OneTask personal task manager.
//! This crate is the single source of truth for lifecycle invariants:
//! WIP=1, completion/energy pairing, and checkpoint ordering.

pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use logging::{default_log_level, init_logging, logging_status};
pub use model::checkpoint::{Checkpoint, CheckpointId};
pub use model::energy::{DayKey, EnergyBudget, EnergyValidationError};
pub use model::task::{NewTask, Task, TaskId, TaskStatus, TaskValidationError, UserId};
pub use repo::checkpoint_repo::{
    CheckpointRepoError, CheckpointRepoResult, CheckpointRepository, SqliteCheckpointRepository,
};
pub use repo::energy_repo::{
    EnergyRepoError, EnergyRepoResult, EnergyRepository, SqliteEnergyRepository,
};
pub use repo::task_repo::{
    SqliteTaskRepository, TaskListQuery, TaskRepoError, TaskRepoResult, TaskRepository, WIP_LIMIT,
};
pub use service::checkpoint_manager::CheckpointManager;
pub use service::daily_view::{ActiveTaskView, DailyView, DailyViewAggregator, ViewError};
pub use service::energy_ledger::EnergyLedger;
pub use service::lifecycle::{EngineConfig, LifecycleEngine};

/// Returns the engine crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
