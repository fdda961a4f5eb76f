//! Task store contract and SQLite implementation.
//!
//! # Responsibility
//! - Provide scoped reads, scoped lists, conditional atomic transitions,
//!   soft-delete and restore over the `tasks` table.
//! - Keep SQL details inside the repository boundary.
//!
//! # Invariants
//! - The WIP=1 gate (`activate_exclusive`) is a single conditional UPDATE
//!   carrying a `NOT EXISTS` guard; concurrent starts for one user
//!   linearize through it.
//! - Completion and its energy attribution commit in one immediate
//!   transaction; the ledger is never charged twice for one task.
//! - All reads and writes are scoped by `user_uuid` and skip soft-deleted
//!   rows unless `include_deleted` is requested.

use crate::db::migrations::latest_version;
use crate::db::DbError;
use crate::model::energy::DayKey;
use crate::model::task::{Task, TaskId, TaskStatus, TaskValidationError, UserId};
use crate::repo::energy_repo::attribute_energy;
use rusqlite::{params, Connection, Row, Transaction, TransactionBehavior};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Work-in-progress cap enforced per user.
pub const WIP_LIMIT: u32 = 1;

const TASK_SELECT_SQL: &str = "SELECT
    uuid,
    user_uuid,
    title,
    description,
    energy_cost,
    status,
    parent_uuid,
    recurrence_uuid,
    created_at,
    updated_at,
    started_at,
    completed_at,
    deleted_at
FROM tasks";

pub type TaskRepoResult<T> = Result<T, TaskRepoError>;

/// Errors from task store operations.
#[derive(Debug)]
pub enum TaskRepoError {
    /// Record-level invariant violation, rejected before SQL.
    Validation(TaskValidationError),
    /// Underlying SQLite/bootstrap error; the only retryable kind.
    Db(DbError),
    /// Task absent, foreign-owned, or soft-deleted.
    NotFound(TaskId),
    /// A second concurrent active task was attempted.
    WipLimitExceeded { current: u32, limit: u32 },
    /// Transition requested from a status that does not allow it.
    InvalidTransition { from: TaskStatus, to: TaskStatus },
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

impl TaskRepoError {
    /// Whether a caller-side retry can possibly change the outcome.
    ///
    /// Only infrastructure faults qualify; domain errors deterministically
    /// repeat until state changes.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Db(_))
    }
}

impl Display for TaskRepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "task not found: {id}"),
            Self::WipLimitExceeded { current, limit } => write!(
                f,
                "work-in-progress limit exceeded: {current} active of {limit} allowed"
            ),
            Self::InvalidTransition { from, to } => write!(
                f,
                "invalid task transition from {from:?} to {to:?}"
            ),
            Self::InvalidData(message) => write!(f, "invalid persisted task data: {message}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "task repository requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "task repository requires table `{table}`")
            }
            Self::MissingRequiredColumn { table, column } => write!(
                f,
                "task repository requires column `{column}` in table `{table}`"
            ),
        }
    }
}

impl Error for TaskRepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<TaskValidationError> for TaskRepoError {
    fn from(value: TaskValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for TaskRepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for TaskRepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Query options for listing tasks.
#[derive(Debug, Clone, Default)]
pub struct TaskListQuery {
    pub status: Option<TaskStatus>,
    pub include_deleted: bool,
    pub limit: Option<u32>,
    pub offset: u32,
}

/// Task store contract consumed by the lifecycle engine and aggregator.
pub trait TaskRepository {
    /// Persists a captured task and returns its stable id.
    fn create_task(&self, task: &Task) -> TaskRepoResult<TaskId>;
    /// Loads one task scoped to its owner.
    fn get_task(
        &self,
        user: UserId,
        id: TaskId,
        include_deleted: bool,
    ) -> TaskRepoResult<Option<Task>>;
    /// Lists tasks for one user using filter and pagination options.
    fn list_tasks(&self, user: UserId, query: &TaskListQuery) -> TaskRepoResult<Vec<Task>>;
    /// Lists tasks completed on the given calendar day.
    fn list_completed_on(&self, user: UserId, day: &DayKey) -> TaskRepoResult<Vec<Task>>;
    /// Returns the single active task for a user, if any.
    fn find_active(&self, user: UserId) -> TaskRepoResult<Option<Task>>;
    /// Backlog -> Active under the WIP=1 gate. Idempotent on the task that
    /// is already the active one.
    fn activate_exclusive(&self, user: UserId, id: TaskId) -> TaskRepoResult<Task>;
    /// {Backlog, Active} -> Completed, attributing `energy_cost` to today's
    /// energy row in the same transaction. No-op on an already completed
    /// task; the ledger is never charged again.
    fn complete_attributing(
        &self,
        user: UserId,
        id: TaskId,
        default_budget: i64,
    ) -> TaskRepoResult<Task>;
    /// {Backlog, Active} -> Abandoned. Idempotent on Abandoned.
    fn abandon_task(&self, user: UserId, id: TaskId) -> TaskRepoResult<Task>;
    /// Active -> Backlog deferral; keeps `started_at`. Idempotent on
    /// Backlog.
    fn backlog_task(&self, user: UserId, id: TaskId) -> TaskRepoResult<Task>;
    /// Marks a task soft-deleted. Idempotent.
    fn soft_delete_task(&self, user: UserId, id: TaskId) -> TaskRepoResult<()>;
    /// Clears the tombstone, returning the task to the status it held.
    /// Restoring an active task while another is active fails the WIP gate.
    fn restore_task(&self, user: UserId, id: TaskId) -> TaskRepoResult<Task>;
}

/// SQLite-backed task store.
pub struct SqliteTaskRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteTaskRepository<'conn> {
    /// Creates a repository from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> TaskRepoResult<Self> {
        ensure_task_connection_ready(conn)?;
        Ok(Self { conn })
    }
}

impl TaskRepository for SqliteTaskRepository<'_> {
    fn create_task(&self, task: &Task) -> TaskRepoResult<TaskId> {
        task.validate()?;

        self.conn.execute(
            "INSERT INTO tasks (
                uuid,
                user_uuid,
                title,
                description,
                energy_cost,
                status,
                parent_uuid,
                recurrence_uuid,
                started_at,
                completed_at,
                deleted_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11);",
            params![
                task.uuid.to_string(),
                task.user_uuid.to_string(),
                task.title.as_str(),
                task.description.as_deref(),
                task.energy_cost,
                status_to_db(task.status),
                task.parent_uuid.map(|value| value.to_string()),
                task.recurrence_uuid.map(|value| value.to_string()),
                task.started_at,
                task.completed_at,
                task.deleted_at,
            ],
        )?;

        Ok(task.uuid)
    }

    fn get_task(
        &self,
        user: UserId,
        id: TaskId,
        include_deleted: bool,
    ) -> TaskRepoResult<Option<Task>> {
        load_task(self.conn, user, id, include_deleted)
    }

    fn list_tasks(&self, user: UserId, query: &TaskListQuery) -> TaskRepoResult<Vec<Task>> {
        let mut sql = format!("{TASK_SELECT_SQL} WHERE user_uuid = ?1");
        let mut bind_values: Vec<rusqlite::types::Value> =
            vec![rusqlite::types::Value::Text(user.to_string())];

        if !query.include_deleted {
            sql.push_str(" AND deleted_at IS NULL");
        }

        if let Some(status) = query.status {
            sql.push_str(" AND status = ?");
            bind_values.push(rusqlite::types::Value::Text(
                status_to_db(status).to_string(),
            ));
        }

        sql.push_str(" ORDER BY created_at ASC, uuid ASC");

        if let Some(limit) = query.limit {
            sql.push_str(" LIMIT ?");
            bind_values.push(rusqlite::types::Value::Integer(i64::from(limit)));
            if query.offset > 0 {
                sql.push_str(" OFFSET ?");
                bind_values.push(rusqlite::types::Value::Integer(i64::from(query.offset)));
            }
        } else if query.offset > 0 {
            sql.push_str(" LIMIT -1 OFFSET ?");
            bind_values.push(rusqlite::types::Value::Integer(i64::from(query.offset)));
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(rusqlite::params_from_iter(bind_values))?;
        let mut tasks = Vec::new();
        while let Some(row) = rows.next()? {
            tasks.push(parse_task_row(row)?);
        }
        Ok(tasks)
    }

    fn list_completed_on(&self, user: UserId, day: &DayKey) -> TaskRepoResult<Vec<Task>> {
        let mut stmt = self.conn.prepare(&format!(
            "{TASK_SELECT_SQL}
             WHERE user_uuid = ?1
               AND deleted_at IS NULL
               AND status = 'completed'
               AND date(completed_at / 1000, 'unixepoch') = ?2
             ORDER BY completed_at ASC, uuid ASC;"
        ))?;

        let mut rows = stmt.query(params![user.to_string(), day.as_str()])?;
        let mut tasks = Vec::new();
        while let Some(row) = rows.next()? {
            tasks.push(parse_task_row(row)?);
        }
        Ok(tasks)
    }

    fn find_active(&self, user: UserId) -> TaskRepoResult<Option<Task>> {
        let mut stmt = self.conn.prepare(&format!(
            "{TASK_SELECT_SQL}
             WHERE user_uuid = ?1
               AND deleted_at IS NULL
               AND status = 'active'
             LIMIT 1;"
        ))?;

        let mut rows = stmt.query([user.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_task_row(row)?));
        }
        Ok(None)
    }

    fn activate_exclusive(&self, user: UserId, id: TaskId) -> TaskRepoResult<Task> {
        // The whole WIP=1 check-and-set races through this one statement;
        // there is no gap between the guard and the write.
        let changed = self.conn.execute(
            "UPDATE tasks
             SET status = 'active',
                 started_at = COALESCE(started_at, strftime('%s', 'now') * 1000),
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE uuid = ?1
               AND user_uuid = ?2
               AND deleted_at IS NULL
               AND status = 'backlog'
               AND NOT EXISTS (
                 SELECT 1
                 FROM tasks
                 WHERE user_uuid = ?2
                   AND status = 'active'
                   AND deleted_at IS NULL
               );",
            params![id.to_string(), user.to_string()],
        )?;

        if changed == 1 {
            return load_required_task(self.conn, user, id);
        }

        // Guard did not match: classify without weakening the invariant.
        match load_task(self.conn, user, id, false)? {
            None => Err(TaskRepoError::NotFound(id)),
            Some(task) if task.status == TaskStatus::Active => Ok(task),
            Some(task) if task.status == TaskStatus::Backlog => {
                let current = count_active(self.conn, user)?.max(1);
                Err(TaskRepoError::WipLimitExceeded {
                    current,
                    limit: WIP_LIMIT,
                })
            }
            Some(task) => Err(TaskRepoError::InvalidTransition {
                from: task.status,
                to: TaskStatus::Active,
            }),
        }
    }

    fn complete_attributing(
        &self,
        user: UserId,
        id: TaskId,
        default_budget: i64,
    ) -> TaskRepoResult<Task> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;

        let changed = tx.execute(
            "UPDATE tasks
             SET status = 'completed',
                 completed_at = (strftime('%s', 'now') * 1000),
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE uuid = ?1
               AND user_uuid = ?2
               AND deleted_at IS NULL
               AND status IN ('backlog', 'active');",
            params![id.to_string(), user.to_string()],
        )?;

        if changed == 1 {
            let task = load_required_task(&tx, user, id)?;
            attribute_energy(&tx, user, None, task.energy_cost, default_budget)?;
            tx.commit()?;
            return Ok(task);
        }

        // Re-completing is a no-op and must not charge the ledger again.
        let result = match load_task(&tx, user, id, false)? {
            None => Err(TaskRepoError::NotFound(id)),
            Some(task) if task.status == TaskStatus::Completed => Ok(task),
            Some(task) => Err(TaskRepoError::InvalidTransition {
                from: task.status,
                to: TaskStatus::Completed,
            }),
        };
        tx.commit()?;
        result
    }

    fn abandon_task(&self, user: UserId, id: TaskId) -> TaskRepoResult<Task> {
        self.simple_transition(
            user,
            id,
            TaskStatus::Abandoned,
            "UPDATE tasks
             SET status = 'abandoned',
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE uuid = ?1
               AND user_uuid = ?2
               AND deleted_at IS NULL
               AND status IN ('backlog', 'active');",
        )
    }

    fn backlog_task(&self, user: UserId, id: TaskId) -> TaskRepoResult<Task> {
        // started_at is intentionally kept as a history marker.
        self.simple_transition(
            user,
            id,
            TaskStatus::Backlog,
            "UPDATE tasks
             SET status = 'backlog',
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE uuid = ?1
               AND user_uuid = ?2
               AND deleted_at IS NULL
               AND status = 'active';",
        )
    }

    fn soft_delete_task(&self, user: UserId, id: TaskId) -> TaskRepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE tasks
             SET deleted_at = COALESCE(deleted_at, strftime('%s', 'now') * 1000),
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE uuid = ?1
               AND user_uuid = ?2;",
            params![id.to_string(), user.to_string()],
        )?;

        if changed == 0 {
            return Err(TaskRepoError::NotFound(id));
        }
        Ok(())
    }

    fn restore_task(&self, user: UserId, id: TaskId) -> TaskRepoResult<Task> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;

        let stored = match load_task(&tx, user, id, true)? {
            None => {
                tx.commit()?;
                return Err(TaskRepoError::NotFound(id));
            }
            Some(task) => task,
        };

        if stored.deleted_at.is_none() {
            tx.commit()?;
            return Ok(stored);
        }

        let changed = if stored.status == TaskStatus::Active {
            // An active tombstone re-enters the WIP gate on restore.
            tx.execute(
                "UPDATE tasks
                 SET deleted_at = NULL,
                     updated_at = (strftime('%s', 'now') * 1000)
                 WHERE uuid = ?1
                   AND user_uuid = ?2
                   AND NOT EXISTS (
                     SELECT 1
                     FROM tasks
                     WHERE user_uuid = ?2
                       AND status = 'active'
                       AND deleted_at IS NULL
                   );",
                params![id.to_string(), user.to_string()],
            )?
        } else {
            tx.execute(
                "UPDATE tasks
                 SET deleted_at = NULL,
                     updated_at = (strftime('%s', 'now') * 1000)
                 WHERE uuid = ?1
                   AND user_uuid = ?2;",
                params![id.to_string(), user.to_string()],
            )?
        };

        if changed == 0 {
            let current = count_active(&tx, user)?.max(1);
            tx.commit()?;
            return Err(TaskRepoError::WipLimitExceeded {
                current,
                limit: WIP_LIMIT,
            });
        }

        let task = load_required_task(&tx, user, id)?;
        tx.commit()?;
        Ok(task)
    }
}

impl SqliteTaskRepository<'_> {
    fn simple_transition(
        &self,
        user: UserId,
        id: TaskId,
        to: TaskStatus,
        sql: &str,
    ) -> TaskRepoResult<Task> {
        let changed = self
            .conn
            .execute(sql, params![id.to_string(), user.to_string()])?;

        if changed == 1 {
            return load_required_task(self.conn, user, id);
        }

        match load_task(self.conn, user, id, false)? {
            None => Err(TaskRepoError::NotFound(id)),
            Some(task) if task.status == to => Ok(task),
            Some(task) => Err(TaskRepoError::InvalidTransition {
                from: task.status,
                to,
            }),
        }
    }
}

fn load_task(
    conn: &Connection,
    user: UserId,
    id: TaskId,
    include_deleted: bool,
) -> TaskRepoResult<Option<Task>> {
    let mut stmt = conn.prepare(&format!(
        "{TASK_SELECT_SQL}
         WHERE uuid = ?1
           AND user_uuid = ?2
           AND (?3 = 1 OR deleted_at IS NULL);"
    ))?;

    let include = if include_deleted { 1i64 } else { 0i64 };
    let mut rows = stmt.query(params![id.to_string(), user.to_string(), include])?;
    if let Some(row) = rows.next()? {
        return Ok(Some(parse_task_row(row)?));
    }
    Ok(None)
}

fn load_required_task(conn: &Connection, user: UserId, id: TaskId) -> TaskRepoResult<Task> {
    load_task(conn, user, id, true)?.ok_or(TaskRepoError::NotFound(id))
}

fn count_active(conn: &Connection, user: UserId) -> TaskRepoResult<u32> {
    let count: u32 = conn.query_row(
        "SELECT COUNT(*)
         FROM tasks
         WHERE user_uuid = ?1
           AND status = 'active'
           AND deleted_at IS NULL;",
        [user.to_string()],
        |row| row.get(0),
    )?;
    Ok(count)
}

fn parse_task_row(row: &Row<'_>) -> TaskRepoResult<Task> {
    let uuid = parse_uuid(&row.get::<_, String>("uuid")?, "tasks.uuid")?;
    let user_uuid = parse_uuid(&row.get::<_, String>("user_uuid")?, "tasks.user_uuid")?;

    let status_text: String = row.get("status")?;
    let status = parse_status(&status_text).ok_or_else(|| {
        TaskRepoError::InvalidData(format!("invalid task status `{status_text}` in tasks.status"))
    })?;

    let parent_uuid = row
        .get::<_, Option<String>>("parent_uuid")?
        .map(|value| parse_uuid(&value, "tasks.parent_uuid"))
        .transpose()?;
    let recurrence_uuid = row
        .get::<_, Option<String>>("recurrence_uuid")?
        .map(|value| parse_uuid(&value, "tasks.recurrence_uuid"))
        .transpose()?;

    Ok(Task {
        uuid,
        user_uuid,
        title: row.get("title")?,
        description: row.get("description")?,
        energy_cost: row.get("energy_cost")?,
        status,
        parent_uuid,
        recurrence_uuid,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
        started_at: row.get("started_at")?,
        completed_at: row.get("completed_at")?,
        deleted_at: row.get("deleted_at")?,
    })
}

fn status_to_db(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Backlog => "backlog",
        TaskStatus::Active => "active",
        TaskStatus::Completed => "completed",
        TaskStatus::Abandoned => "abandoned",
    }
}

fn parse_status(value: &str) -> Option<TaskStatus> {
    match value {
        "backlog" => Some(TaskStatus::Backlog),
        "active" => Some(TaskStatus::Active),
        "completed" => Some(TaskStatus::Completed),
        "abandoned" => Some(TaskStatus::Abandoned),
        _ => None,
    }
}

fn parse_uuid(value: &str, column: &'static str) -> TaskRepoResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| TaskRepoError::InvalidData(format!("invalid uuid `{value}` in {column}")))
}

fn ensure_task_connection_ready(conn: &Connection) -> TaskRepoResult<()> {
    let expected_version = latest_version();
    let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if actual_version != expected_version {
        return Err(TaskRepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    if !table_exists(conn, "tasks")? {
        return Err(TaskRepoError::MissingRequiredTable("tasks"));
    }

    for column in [
        "uuid",
        "user_uuid",
        "title",
        "description",
        "energy_cost",
        "status",
        "parent_uuid",
        "recurrence_uuid",
        "created_at",
        "updated_at",
        "started_at",
        "completed_at",
        "deleted_at",
    ] {
        if !table_has_column(conn, "tasks", column)? {
            return Err(TaskRepoError::MissingRequiredColumn {
                table: "tasks",
                column,
            });
        }
    }

    Ok(())
}

pub(crate) fn table_exists(conn: &Connection, table: &str) -> Result<bool, rusqlite::Error> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

pub(crate) fn table_has_column(
    conn: &Connection,
    table: &str,
    column: &str,
) -> Result<bool, rusqlite::Error> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table});"))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let current: String = row.get(1)?;
        if current == column {
            return Ok(true);
        }
    }
    Ok(false)
}
