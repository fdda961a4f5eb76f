//! Checkpoint repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide persistence APIs for ordered sub-steps of tasks.
//! - Keep SQL details and ordering behavior inside the repository
//!   boundary.
//!
//! # Invariants
//! - Every operation scopes through an owning task that is visible to the
//!   calling user (not soft-deleted).
//! - Listing is deterministic: `sort_order ASC, uuid ASC`.
//! - A reorder must cover exactly the task's current checkpoint set and
//!   leaves orders dense and zero-based; deletes may leave gaps.

use crate::db::migrations::latest_version;
use crate::db::DbError;
use crate::model::checkpoint::{Checkpoint, CheckpointId};
use crate::model::task::{TaskId, UserId};
use crate::repo::task_repo::{table_exists, table_has_column};
use rusqlite::{params, Connection, Row, Transaction, TransactionBehavior};
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

const CHECKPOINT_SELECT_SQL: &str = "SELECT
    c.uuid AS uuid,
    c.task_uuid AS task_uuid,
    c.title AS title,
    c.completed AS completed,
    c.sort_order AS sort_order,
    c.completed_at AS completed_at
FROM checkpoints c
INNER JOIN tasks t ON t.uuid = c.task_uuid";

pub type CheckpointRepoResult<T> = Result<T, CheckpointRepoError>;

/// Errors from checkpoint repository operations.
#[derive(Debug)]
pub enum CheckpointRepoError {
    /// Underlying SQLite/bootstrap error; the only retryable kind.
    Db(DbError),
    /// Checkpoint absent or reached through a foreign/deleted task.
    NotFound(CheckpointId),
    /// Owning task absent, foreign-owned, or soft-deleted.
    TaskNotFound(TaskId),
    /// Checkpoint title is empty after trimming.
    EmptyTitle,
    /// Reorder list is not a permutation of the task's checkpoint set.
    InvalidReorderSet(String),
    /// Persisted data cannot be converted to a valid read model.
    InvalidData(String),
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    /// Required table is missing.
    MissingRequiredTable(&'static str),
    /// Required column is missing from expected table.
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
}

impl Display for CheckpointRepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "checkpoint not found: {id}"),
            Self::TaskNotFound(id) => write!(f, "task not found: {id}"),
            Self::EmptyTitle => write!(f, "checkpoint title cannot be empty"),
            Self::InvalidReorderSet(message) => {
                write!(f, "invalid checkpoint reorder set: {message}")
            }
            Self::InvalidData(message) => {
                write!(f, "invalid persisted checkpoint data: {message}")
            }
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "checkpoint repository requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "checkpoint repository requires table `{table}`")
            }
            Self::MissingRequiredColumn { table, column } => write!(
                f,
                "checkpoint repository requires column `{column}` in table `{table}`"
            ),
        }
    }
}

impl Error for CheckpointRepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for CheckpointRepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for CheckpointRepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Checkpoint store contract consumed by the checkpoint manager.
pub trait CheckpointRepository {
    /// Inserts one checkpoint; order defaults to `max(existing) + 1`.
    fn add_checkpoint(
        &self,
        user: UserId,
        task: TaskId,
        title: &str,
        explicit_order: Option<i64>,
    ) -> CheckpointRepoResult<Checkpoint>;
    /// Lists a task's checkpoints ordered by `sort_order ASC, uuid ASC`.
    fn list_checkpoints(&self, user: UserId, task: TaskId)
        -> CheckpointRepoResult<Vec<Checkpoint>>;
    /// Rewrites every checkpoint's order to its index in `ordered`.
    fn reorder_checkpoints(
        &self,
        user: UserId,
        task: TaskId,
        ordered: &[CheckpointId],
    ) -> CheckpointRepoResult<()>;
    /// Hard-deletes one checkpoint; remaining orders are not renumbered.
    fn delete_checkpoint(&self, user: UserId, id: CheckpointId) -> CheckpointRepoResult<()>;
    /// Flips `completed` and sets/clears `completed_at` accordingly.
    fn toggle_checkpoint(&self, user: UserId, id: CheckpointId)
        -> CheckpointRepoResult<Checkpoint>;
}

/// SQLite-backed checkpoint repository.
pub struct SqliteCheckpointRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteCheckpointRepository<'conn> {
    /// Creates a repository from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> CheckpointRepoResult<Self> {
        ensure_checkpoint_connection_ready(conn)?;
        Ok(Self { conn })
    }
}

impl CheckpointRepository for SqliteCheckpointRepository<'_> {
    fn add_checkpoint(
        &self,
        user: UserId,
        task: TaskId,
        title: &str,
        explicit_order: Option<i64>,
    ) -> CheckpointRepoResult<Checkpoint> {
        if title.trim().is_empty() {
            return Err(CheckpointRepoError::EmptyTitle);
        }
        ensure_visible_task(self.conn, user, task)?;

        let sort_order = match explicit_order {
            Some(value) => value,
            None => next_sort_order(self.conn, task)?,
        };

        let uuid = Uuid::new_v4();
        self.conn.execute(
            "INSERT INTO checkpoints (uuid, task_uuid, title, completed, sort_order)
             VALUES (?1, ?2, ?3, 0, ?4);",
            params![uuid.to_string(), task.to_string(), title, sort_order],
        )?;

        load_required_checkpoint(self.conn, user, uuid)
    }

    fn list_checkpoints(
        &self,
        user: UserId,
        task: TaskId,
    ) -> CheckpointRepoResult<Vec<Checkpoint>> {
        ensure_visible_task(self.conn, user, task)?;

        let mut stmt = self.conn.prepare(&format!(
            "{CHECKPOINT_SELECT_SQL}
             WHERE c.task_uuid = ?1
               AND t.user_uuid = ?2
               AND t.deleted_at IS NULL
             ORDER BY c.sort_order ASC, c.uuid ASC;"
        ))?;

        let mut rows = stmt.query(params![task.to_string(), user.to_string()])?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            items.push(parse_checkpoint_row(row)?);
        }
        Ok(items)
    }

    fn reorder_checkpoints(
        &self,
        user: UserId,
        task: TaskId,
        ordered: &[CheckpointId],
    ) -> CheckpointRepoResult<()> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        ensure_visible_task(&tx, user, task)?;

        let current = list_checkpoint_ids(&tx, task)?;
        let current_set: BTreeSet<CheckpointId> = current.iter().copied().collect();
        let ordered_set: BTreeSet<CheckpointId> = ordered.iter().copied().collect();

        if ordered_set.len() != ordered.len() {
            return Err(CheckpointRepoError::InvalidReorderSet(
                "list contains duplicate ids".to_string(),
            ));
        }
        if current_set != ordered_set {
            return Err(CheckpointRepoError::InvalidReorderSet(format!(
                "list must cover exactly the task's {} checkpoint(s), got {}",
                current_set.len(),
                ordered.len()
            )));
        }

        for (index, id) in ordered.iter().enumerate() {
            tx.execute(
                "UPDATE checkpoints
                 SET sort_order = ?2
                 WHERE uuid = ?1
                   AND task_uuid = ?3;",
                params![id.to_string(), index as i64, task.to_string()],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    fn delete_checkpoint(&self, user: UserId, id: CheckpointId) -> CheckpointRepoResult<()> {
        let changed = self.conn.execute(
            "DELETE FROM checkpoints
             WHERE uuid = ?1
               AND EXISTS (
                 SELECT 1
                 FROM tasks
                 WHERE tasks.uuid = checkpoints.task_uuid
                   AND tasks.user_uuid = ?2
                   AND tasks.deleted_at IS NULL
               );",
            params![id.to_string(), user.to_string()],
        )?;

        if changed == 0 {
            return Err(CheckpointRepoError::NotFound(id));
        }
        Ok(())
    }

    fn toggle_checkpoint(
        &self,
        user: UserId,
        id: CheckpointId,
    ) -> CheckpointRepoResult<Checkpoint> {
        let changed = self.conn.execute(
            "UPDATE checkpoints
             SET completed = CASE completed WHEN 1 THEN 0 ELSE 1 END,
                 completed_at = CASE completed
                     WHEN 1 THEN NULL
                     ELSE (strftime('%s', 'now') * 1000)
                 END
             WHERE uuid = ?1
               AND EXISTS (
                 SELECT 1
                 FROM tasks
                 WHERE tasks.uuid = checkpoints.task_uuid
                   AND tasks.user_uuid = ?2
                   AND tasks.deleted_at IS NULL
               );",
            params![id.to_string(), user.to_string()],
        )?;

        if changed == 0 {
            return Err(CheckpointRepoError::NotFound(id));
        }
        load_required_checkpoint(self.conn, user, id)
    }
}

fn ensure_visible_task(conn: &Connection, user: UserId, task: TaskId) -> CheckpointRepoResult<()> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM tasks
            WHERE uuid = ?1
              AND user_uuid = ?2
              AND deleted_at IS NULL
        );",
        params![task.to_string(), user.to_string()],
        |row| row.get(0),
    )?;
    if exists == 1 {
        Ok(())
    } else {
        Err(CheckpointRepoError::TaskNotFound(task))
    }
}

fn next_sort_order(conn: &Connection, task: TaskId) -> CheckpointRepoResult<i64> {
    let next: i64 = conn.query_row(
        "SELECT COALESCE(MAX(sort_order), -1) + 1
         FROM checkpoints
         WHERE task_uuid = ?1;",
        [task.to_string()],
        |row| row.get(0),
    )?;
    Ok(next)
}

fn list_checkpoint_ids(conn: &Connection, task: TaskId) -> CheckpointRepoResult<Vec<CheckpointId>> {
    let mut stmt = conn.prepare(
        "SELECT uuid
         FROM checkpoints
         WHERE task_uuid = ?1
         ORDER BY sort_order ASC, uuid ASC;",
    )?;
    let mut rows = stmt.query([task.to_string()])?;
    let mut ids = Vec::new();
    while let Some(row) = rows.next()? {
        let value: String = row.get(0)?;
        ids.push(parse_uuid(&value, "checkpoints.uuid")?);
    }
    Ok(ids)
}

fn load_required_checkpoint(
    conn: &Connection,
    user: UserId,
    id: CheckpointId,
) -> CheckpointRepoResult<Checkpoint> {
    let mut stmt = conn.prepare(&format!(
        "{CHECKPOINT_SELECT_SQL}
         WHERE c.uuid = ?1
           AND t.user_uuid = ?2
           AND t.deleted_at IS NULL;"
    ))?;
    let mut rows = stmt.query(params![id.to_string(), user.to_string()])?;
    if let Some(row) = rows.next()? {
        return parse_checkpoint_row(row);
    }
    Err(CheckpointRepoError::NotFound(id))
}

fn parse_checkpoint_row(row: &Row<'_>) -> CheckpointRepoResult<Checkpoint> {
    let uuid = parse_uuid(&row.get::<_, String>("uuid")?, "checkpoints.uuid")?;
    let task_uuid = parse_uuid(&row.get::<_, String>("task_uuid")?, "checkpoints.task_uuid")?;

    let completed = match row.get::<_, i64>("completed")? {
        0 => false,
        1 => true,
        other => {
            return Err(CheckpointRepoError::InvalidData(format!(
                "invalid completed value `{other}` in checkpoints.completed"
            )));
        }
    };

    Ok(Checkpoint {
        uuid,
        task_uuid,
        title: row.get("title")?,
        completed,
        sort_order: row.get("sort_order")?,
        completed_at: row.get("completed_at")?,
    })
}

fn parse_uuid(value: &str, column: &'static str) -> CheckpointRepoResult<Uuid> {
    Uuid::parse_str(value).map_err(|_| {
        CheckpointRepoError::InvalidData(format!("invalid uuid `{value}` in {column}"))
    })
}

fn ensure_checkpoint_connection_ready(conn: &Connection) -> CheckpointRepoResult<()> {
    let expected_version = latest_version();
    let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if actual_version != expected_version {
        return Err(CheckpointRepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    if !table_exists(conn, "checkpoints")? {
        return Err(CheckpointRepoError::MissingRequiredTable("checkpoints"));
    }

    for column in [
        "uuid",
        "task_uuid",
        "title",
        "completed",
        "sort_order",
        "completed_at",
    ] {
        if !table_has_column(conn, "checkpoints", column)? {
            return Err(CheckpointRepoError::MissingRequiredColumn {
                table: "checkpoints",
                column,
            });
        }
    }

    Ok(())
}
