//! Checkpoint use-case service.
//!
//! # Responsibility
//! - Provide stable entry points for sub-step management.
//! - Delegate ordering and scoping rules to the repository contract.
//!
//! # Invariants
//! - Checkpoints never gate or mutate the owning task's status.

use crate::model::checkpoint::{Checkpoint, CheckpointId};
use crate::model::task::{TaskId, UserId};
use crate::repo::checkpoint_repo::{CheckpointRepoResult, CheckpointRepository};
use log::info;

/// Use-case service for ordered sub-steps.
pub struct CheckpointManager<R: CheckpointRepository> {
    repo: R,
}

impl<R: CheckpointRepository> CheckpointManager<R> {
    /// Creates a manager using the provided repository implementation.
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Appends a checkpoint, or places it at an explicit order.
    pub fn add(
        &self,
        user: UserId,
        task: TaskId,
        title: &str,
        explicit_order: Option<i64>,
    ) -> CheckpointRepoResult<Checkpoint> {
        let checkpoint = self.repo.add_checkpoint(user, task, title, explicit_order)?;
        info!(
            "event=checkpoint_add module=checkpoints status=ok task={task} checkpoint={}",
            checkpoint.uuid
        );
        Ok(checkpoint)
    }

    /// Lists a task's checkpoints in display order.
    pub fn list(&self, user: UserId, task: TaskId) -> CheckpointRepoResult<Vec<Checkpoint>> {
        self.repo.list_checkpoints(user, task)
    }

    /// Replaces the full order sequence; afterwards a list read yields
    /// exactly `ordered`.
    pub fn reorder(
        &self,
        user: UserId,
        task: TaskId,
        ordered: &[CheckpointId],
    ) -> CheckpointRepoResult<()> {
        self.repo.reorder_checkpoints(user, task, ordered)?;
        info!(
            "event=checkpoint_reorder module=checkpoints status=ok task={task} count={}",
            ordered.len()
        );
        Ok(())
    }

    /// Hard-deletes one checkpoint.
    pub fn delete(&self, user: UserId, id: CheckpointId) -> CheckpointRepoResult<()> {
        self.repo.delete_checkpoint(user, id)?;
        info!("event=checkpoint_delete module=checkpoints status=ok checkpoint={id}");
        Ok(())
    }

    /// Flips a checkpoint's completion flag.
    pub fn toggle_complete(
        &self,
        user: UserId,
        id: CheckpointId,
    ) -> CheckpointRepoResult<Checkpoint> {
        self.repo.toggle_checkpoint(user, id)
    }
}
