//! Daily view aggregation.
//!
//! # Responsibility
//! - Compose lifecycle, checkpoint and energy state into one read-only
//!   snapshot for presentation.
//!
//! # Invariants
//! - No writes; failures are pass-through from the repositories read.

use crate::model::checkpoint::Checkpoint;
use crate::model::energy::{DayKey, EnergyBudget};
use crate::model::task::{Task, TaskStatus, UserId};
use crate::repo::checkpoint_repo::{CheckpointRepoError, CheckpointRepository};
use crate::repo::energy_repo::{EnergyRepoError, EnergyRepository};
use crate::repo::task_repo::{TaskListQuery, TaskRepoError, TaskRepository};
use crate::service::lifecycle::EngineConfig;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type ViewResult<T> = Result<T, ViewError>;

/// Pass-through failure from one of the composed repositories.
#[derive(Debug)]
pub enum ViewError {
    Task(TaskRepoError),
    Checkpoint(CheckpointRepoError),
    Energy(EnergyRepoError),
}

impl Display for ViewError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Task(err) => write!(f, "{err}"),
            Self::Checkpoint(err) => write!(f, "{err}"),
            Self::Energy(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ViewError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Task(err) => Some(err),
            Self::Checkpoint(err) => Some(err),
            Self::Energy(err) => Some(err),
        }
    }
}

impl From<TaskRepoError> for ViewError {
    fn from(value: TaskRepoError) -> Self {
        Self::Task(value)
    }
}

impl From<CheckpointRepoError> for ViewError {
    fn from(value: CheckpointRepoError) -> Self {
        Self::Checkpoint(value)
    }
}

impl From<EnergyRepoError> for ViewError {
    fn from(value: EnergyRepoError) -> Self {
        Self::Energy(value)
    }
}

/// The active task joined with its sub-steps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveTaskView {
    pub task: Task,
    pub checkpoints: Vec<Checkpoint>,
}

/// One user's day at a glance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailyView {
    /// Stored or materialized capacity record for the day.
    pub budget: EnergyBudget,
    /// The single active task with its checkpoints, if any.
    pub active_task: Option<ActiveTaskView>,
    /// Backlog tasks ready to be started.
    pub ready_tasks: Vec<Task>,
    /// Tasks whose completion landed on the requested day.
    pub completed_today: Vec<Task>,
}

/// Read-only composition over the three repositories.
pub struct DailyViewAggregator<T, C, E>
where
    T: TaskRepository,
    C: CheckpointRepository,
    E: EnergyRepository,
{
    tasks: T,
    checkpoints: C,
    energy: E,
    config: EngineConfig,
}

impl<T, C, E> DailyViewAggregator<T, C, E>
where
    T: TaskRepository,
    C: CheckpointRepository,
    E: EnergyRepository,
{
    /// Creates an aggregator over the provided repositories.
    pub fn new(tasks: T, checkpoints: C, energy: E, config: EngineConfig) -> Self {
        Self {
            tasks,
            checkpoints,
            energy,
            config,
        }
    }

    /// Builds the snapshot for one user and day.
    pub fn snapshot(&self, user: UserId, day: &DayKey) -> ViewResult<DailyView> {
        let budget = self
            .energy
            .get_budget(user, day, self.config.default_daily_budget)?;

        let active_task = match self.tasks.find_active(user)? {
            Some(task) => {
                let checkpoints = self.checkpoints.list_checkpoints(user, task.uuid)?;
                Some(ActiveTaskView { task, checkpoints })
            }
            None => None,
        };

        let ready_tasks = self.tasks.list_tasks(
            user,
            &TaskListQuery {
                status: Some(TaskStatus::Backlog),
                ..TaskListQuery::default()
            },
        )?;

        let completed_today = self.tasks.list_completed_on(user, day)?;

        Ok(DailyView {
            budget,
            active_task,
            ready_tasks,
            completed_today,
        })
    }
}
