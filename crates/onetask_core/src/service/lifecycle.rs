//! Task lifecycle engine.
//!
//! # Responsibility
//! - Expose the state-machine transitions callers invoke per request.
//! - Enforce single-tasking: the WIP=1 gate and the completion/energy
//!   attribution pairing live behind these entry points.
//!
//! # Invariants
//! - After any sequence of operations, at most one non-deleted task per
//!   user is active.
//! - Completing a task attributes its cost to today exactly once.
//! - No transition is retried internally; domain failures are returned
//!   as typed errors for the caller to translate.

use crate::model::task::{NewTask, Task, TaskId, UserId};
use crate::repo::task_repo::{TaskRepoError, TaskRepoResult, TaskRepository};
use log::{info, warn};

/// Tunable knobs for the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Budget materialized for days that have no stored energy row.
    pub default_daily_budget: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_daily_budget: 5,
        }
    }
}

/// Use-case service driving task state transitions.
pub struct LifecycleEngine<R: TaskRepository> {
    repo: R,
    config: EngineConfig,
}

impl<R: TaskRepository> LifecycleEngine<R> {
    /// Creates an engine using the provided task store implementation.
    pub fn new(repo: R, config: EngineConfig) -> Self {
        Self { repo, config }
    }

    /// Captures a new backlog task for a user.
    pub fn capture(&self, user: UserId, request: NewTask) -> TaskRepoResult<Task> {
        let task = Task::capture(user, request);
        let id = self.repo.create_task(&task)?;
        info!("event=task_capture module=lifecycle status=ok task={id}");
        self.require(user, id)
    }

    /// Backlog -> Active under the WIP=1 gate.
    pub fn start(&self, user: UserId, id: TaskId) -> TaskRepoResult<Task> {
        match self.repo.activate_exclusive(user, id) {
            Ok(task) => {
                info!("event=task_start module=lifecycle status=ok task={id}");
                Ok(task)
            }
            Err(err) => {
                warn!("event=task_start module=lifecycle status=error task={id} error={err}");
                Err(err)
            }
        }
    }

    /// {Backlog, Active} -> Completed, charging today's energy ledger.
    pub fn complete(&self, user: UserId, id: TaskId) -> TaskRepoResult<Task> {
        match self
            .repo
            .complete_attributing(user, id, self.config.default_daily_budget)
        {
            Ok(task) => {
                info!(
                    "event=task_complete module=lifecycle status=ok task={id} cost={}",
                    task.energy_cost
                );
                Ok(task)
            }
            Err(err) => {
                warn!("event=task_complete module=lifecycle status=error task={id} error={err}");
                Err(err)
            }
        }
    }

    /// {Backlog, Active} -> Abandoned. No energy is attributed.
    pub fn abandon(&self, user: UserId, id: TaskId) -> TaskRepoResult<Task> {
        let task = self.repo.abandon_task(user, id)?;
        info!("event=task_abandon module=lifecycle status=ok task={id}");
        Ok(task)
    }

    /// Active -> Backlog deferral; `started_at` stays as history.
    pub fn backlog(&self, user: UserId, id: TaskId) -> TaskRepoResult<Task> {
        let task = self.repo.backlog_task(user, id)?;
        info!("event=task_backlog module=lifecycle status=ok task={id}");
        Ok(task)
    }

    /// Returns the single active task for a user, if any.
    pub fn get_active(&self, user: UserId) -> TaskRepoResult<Option<Task>> {
        self.repo.find_active(user)
    }

    /// Tombstones a task; it disappears from status queries and the WIP
    /// check until restored.
    pub fn soft_delete(&self, user: UserId, id: TaskId) -> TaskRepoResult<()> {
        self.repo.soft_delete_task(user, id)?;
        info!("event=task_soft_delete module=lifecycle status=ok task={id}");
        Ok(())
    }

    /// Restores a tombstoned task to the status it held.
    pub fn restore(&self, user: UserId, id: TaskId) -> TaskRepoResult<Task> {
        let task = self.repo.restore_task(user, id)?;
        info!("event=task_restore module=lifecycle status=ok task={id}");
        Ok(task)
    }

    fn require(&self, user: UserId, id: TaskId) -> TaskRepoResult<Task> {
        self.repo
            .get_task(user, id, false)?
            .ok_or(TaskRepoError::NotFound(id))
    }
}
