//! Task domain model.
//!
//! # Responsibility
//! - Define the unit of executable work and its lifecycle status machine.
//! - Provide lifecycle helpers for soft-delete semantics.
//!
//! # Invariants
//! - `uuid` is stable and never reused for another task.
//! - `deleted_at` is the source of truth for tombstone state.
//! - `completed_at` is set exactly when `status == Completed`.
//! - `started_at` is set once the task has been active and is never
//!   cleared by a deferral back to backlog.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable identifier for a task.
pub type TaskId = Uuid;

/// Stable identifier for the owning user.
///
/// Identity issuance lives outside this engine; the id is opaque here.
pub type UserId = Uuid;

/// Lifecycle status of a task.
///
/// Forward lifecycle is `Backlog -> Active -> Completed`, with
/// `Active -> Backlog` as deferral and `Abandoned` reachable from both
/// non-terminal states. `Completed` and `Abandoned` are terminal; only
/// soft-delete/restore can touch a terminal task afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Captured but not being worked on.
    Backlog,
    /// The single task currently being worked on (WIP=1 per user).
    Active,
    /// Finished; energy cost has been attributed.
    Completed,
    /// Given up on; no energy attributed.
    Abandoned,
}

impl TaskStatus {
    /// Returns whether the status has outgoing domain transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Abandoned)
    }
}

/// Validation failures for task records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskValidationError {
    /// Title is empty after trimming.
    EmptyTitle,
    /// Energy cost must be a positive integer.
    NonPositiveEnergyCost(i64),
    /// `completed_at` presence disagrees with `status`.
    CompletedAtMismatch,
    /// An active task must carry a `started_at` timestamp.
    ActiveWithoutStartedAt,
}

impl Display for TaskValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyTitle => write!(f, "task title cannot be empty"),
            Self::NonPositiveEnergyCost(value) => {
                write!(f, "task energy cost must be positive, got {value}")
            }
            Self::CompletedAtMismatch => {
                write!(f, "completed_at must be set exactly for completed tasks")
            }
            Self::ActiveWithoutStartedAt => {
                write!(f, "active task must have started_at set")
            }
        }
    }
}

impl Error for TaskValidationError {}

/// Canonical record for one unit of executable work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Stable global ID.
    pub uuid: TaskId,
    /// Owning user; no cross-user visibility anywhere in the engine.
    pub user_uuid: UserId,
    /// Short actionable title.
    pub title: String,
    /// Optional longer description.
    pub description: Option<String>,
    /// Positive capacity units charged to the day the task completes.
    pub energy_cost: i64,
    /// Lifecycle status; mutated only through engine transitions.
    pub status: TaskStatus,
    /// Optional grouping parent.
    pub parent_uuid: Option<TaskId>,
    /// Optional recurring-template source that produced this record.
    pub recurrence_uuid: Option<Uuid>,
    /// Epoch ms creation timestamp.
    pub created_at: i64,
    /// Epoch ms update timestamp.
    pub updated_at: i64,
    /// Epoch ms of first activation. Kept on deferral as a history marker.
    pub started_at: Option<i64>,
    /// Epoch ms of completion.
    pub completed_at: Option<i64>,
    /// Soft delete tombstone; set means hidden from all status queries.
    pub deleted_at: Option<i64>,
}

/// Caller-facing shape for capturing a new backlog task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTask {
    pub title: String,
    pub description: Option<String>,
    pub energy_cost: i64,
    pub parent_uuid: Option<TaskId>,
    pub recurrence_uuid: Option<Uuid>,
}

impl NewTask {
    /// Creates a capture request with the given title and cost.
    pub fn new(title: impl Into<String>, energy_cost: i64) -> Self {
        Self {
            title: title.into(),
            description: None,
            energy_cost,
            parent_uuid: None,
            recurrence_uuid: None,
        }
    }
}

impl Task {
    /// Builds a backlog task for a user with a generated stable ID.
    ///
    /// Timestamps are zero until the repository persists the row; the
    /// store fills them from its own clock.
    pub fn capture(user_uuid: UserId, request: NewTask) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            user_uuid,
            title: request.title,
            description: request.description,
            energy_cost: request.energy_cost,
            status: TaskStatus::Backlog,
            parent_uuid: request.parent_uuid,
            recurrence_uuid: request.recurrence_uuid,
            created_at: 0,
            updated_at: 0,
            started_at: None,
            completed_at: None,
            deleted_at: None,
        }
    }

    /// Checks record-level invariants prior to persistence.
    pub fn validate(&self) -> Result<(), TaskValidationError> {
        if self.title.trim().is_empty() {
            return Err(TaskValidationError::EmptyTitle);
        }
        if self.energy_cost <= 0 {
            return Err(TaskValidationError::NonPositiveEnergyCost(
                self.energy_cost,
            ));
        }
        if self.completed_at.is_some() != (self.status == TaskStatus::Completed) {
            return Err(TaskValidationError::CompletedAtMismatch);
        }
        if self.status == TaskStatus::Active && self.started_at.is_none() {
            return Err(TaskValidationError::ActiveWithoutStartedAt);
        }
        Ok(())
    }

    /// Returns whether this task should be considered visible.
    pub fn is_visible(&self) -> bool {
        self.deleted_at.is_none()
    }
}
