//! Checkpoint domain model.
//!
//! # Responsibility
//! - Define the ordered sub-step record attached to a task.
//!
//! # Invariants
//! - `sort_order` values are unique per task and contiguous immediately
//!   after a reorder; gaps left by deletes are tolerated at rest.
//! - Checkpoints are advisory: they never gate the owning task's status.

use crate::model::task::TaskId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable identifier for a checkpoint.
pub type CheckpointId = Uuid;

/// One ordered sub-step of a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Stable global ID.
    pub uuid: CheckpointId,
    /// Owning task.
    pub task_uuid: TaskId,
    /// Short step description.
    pub title: String,
    /// Completion flag; independent of the owning task's status.
    pub completed: bool,
    /// Zero-based position within the task.
    pub sort_order: i64,
    /// Epoch ms completion timestamp; set exactly when `completed`.
    pub completed_at: Option<i64>,
}
