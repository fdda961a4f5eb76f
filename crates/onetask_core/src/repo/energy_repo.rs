//! Energy ledger contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide per-(user, day) budget reads and upserts over
//!   `energy_budgets`.
//! - Own the attribution increment shared with task completion.
//!
//! # Invariants
//! - `spent` only ever increases; reversal is unsupported.
//! - Absent rows materialize as (default budget, 0 spent) without being
//!   persisted until a write occurs.
//! - The current day is read from SQLite (`date('now')`), the engine's
//!   single clock source.

use crate::db::migrations::latest_version;
use crate::db::DbError;
use crate::model::energy::{DayKey, EnergyBudget, EnergyValidationError};
use crate::model::task::UserId;
use crate::repo::task_repo::{table_exists, table_has_column};
use rusqlite::{params, Connection, OptionalExtension};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type EnergyRepoResult<T> = Result<T, EnergyRepoError>;

/// Errors from energy ledger operations.
#[derive(Debug)]
pub enum EnergyRepoError {
    /// Rejected before SQL: negative budget, non-positive cost, bad day.
    Validation(EnergyValidationError),
    /// Underlying SQLite/bootstrap error; the only retryable kind.
    Db(DbError),
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

impl Display for EnergyRepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::InvalidData(message) => {
                write!(f, "invalid persisted energy data: {message}")
            }
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "energy repository requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "energy repository requires table `{table}`")
            }
            Self::MissingRequiredColumn { table, column } => write!(
                f,
                "energy repository requires column `{column}` in table `{table}`"
            ),
        }
    }
}

impl Error for EnergyRepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<EnergyValidationError> for EnergyRepoError {
    fn from(value: EnergyValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for EnergyRepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for EnergyRepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Energy ledger contract consumed by services and the aggregator.
pub trait EnergyRepository {
    /// Loads the stored row or materializes the default without
    /// persisting it.
    fn get_budget(
        &self,
        user: UserId,
        day: &DayKey,
        default_budget: i64,
    ) -> EnergyRepoResult<EnergyBudget>;
    /// Upserts the budget for a day while preserving any existing spend.
    fn set_budget(
        &self,
        user: UserId,
        day: &DayKey,
        budget: i64,
    ) -> EnergyRepoResult<EnergyBudget>;
    /// Increments `spent` by `cost`, creating the row with the default
    /// budget when absent. Never decrements.
    fn attribute(
        &self,
        user: UserId,
        day: &DayKey,
        cost: i64,
        default_budget: i64,
    ) -> EnergyRepoResult<EnergyBudget>;
    /// Current UTC calendar day per the store's clock.
    fn today(&self) -> EnergyRepoResult<DayKey>;
}

/// SQLite-backed energy ledger.
pub struct SqliteEnergyRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteEnergyRepository<'conn> {
    /// Creates a repository from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> EnergyRepoResult<Self> {
        ensure_energy_connection_ready(conn)?;
        Ok(Self { conn })
    }
}

impl EnergyRepository for SqliteEnergyRepository<'_> {
    fn get_budget(
        &self,
        user: UserId,
        day: &DayKey,
        default_budget: i64,
    ) -> EnergyRepoResult<EnergyBudget> {
        let stored = self
            .conn
            .query_row(
                "SELECT budget, spent
                 FROM energy_budgets
                 WHERE user_uuid = ?1
                   AND day = ?2;",
                params![user.to_string(), day.as_str()],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)),
            )
            .optional()?;

        match stored {
            Some((budget, spent)) => Ok(EnergyBudget {
                user_uuid: user,
                day: day.clone(),
                budget,
                spent,
            }),
            None => Ok(EnergyBudget::materialized(
                user,
                day.clone(),
                default_budget,
            )),
        }
    }

    fn set_budget(
        &self,
        user: UserId,
        day: &DayKey,
        budget: i64,
    ) -> EnergyRepoResult<EnergyBudget> {
        if budget < 0 {
            return Err(EnergyValidationError::NegativeBudget(budget).into());
        }

        self.conn.execute(
            "INSERT INTO energy_budgets (user_uuid, day, budget, spent)
             VALUES (?1, ?2, ?3, 0)
             ON CONFLICT (user_uuid, day) DO UPDATE SET
                 budget = excluded.budget,
                 updated_at = (strftime('%s', 'now') * 1000);",
            params![user.to_string(), day.as_str(), budget],
        )?;

        self.get_budget(user, day, budget)
    }

    fn attribute(
        &self,
        user: UserId,
        day: &DayKey,
        cost: i64,
        default_budget: i64,
    ) -> EnergyRepoResult<EnergyBudget> {
        if cost <= 0 {
            return Err(EnergyValidationError::NonPositiveCost(cost).into());
        }

        attribute_energy(self.conn, user, Some(day), cost, default_budget)?;
        self.get_budget(user, day, default_budget)
    }

    fn today(&self) -> EnergyRepoResult<DayKey> {
        let value: String = self
            .conn
            .query_row("SELECT date('now');", [], |row| row.get(0))?;
        DayKey::new(value).map_err(|err| EnergyRepoError::InvalidData(err.to_string()))
    }
}

/// Increments the spend for (user, day) in one upsert statement.
///
/// `day = None` charges the store's current day (`date('now')`). Shared
/// with task completion so the flip and the charge commit together.
pub(crate) fn attribute_energy(
    conn: &Connection,
    user: UserId,
    day: Option<&DayKey>,
    cost: i64,
    default_budget: i64,
) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO energy_budgets (user_uuid, day, budget, spent)
         VALUES (?1, COALESCE(?2, date('now')), ?3, ?4)
         ON CONFLICT (user_uuid, day) DO UPDATE SET
             spent = spent + excluded.spent,
             updated_at = (strftime('%s', 'now') * 1000);",
        params![
            user.to_string(),
            day.map(|value| value.as_str().to_string()),
            default_budget,
            cost,
        ],
    )?;
    Ok(())
}

fn ensure_energy_connection_ready(conn: &Connection) -> EnergyRepoResult<()> {
    let expected_version = latest_version();
    let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if actual_version != expected_version {
        return Err(EnergyRepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    if !table_exists(conn, "energy_budgets")? {
        return Err(EnergyRepoError::MissingRequiredTable("energy_budgets"));
    }

    for column in ["user_uuid", "day", "budget", "spent", "updated_at"] {
        if !table_has_column(conn, "energy_budgets", column)? {
            return Err(EnergyRepoError::MissingRequiredColumn {
                table: "energy_budgets",
                column,
            });
        }
    }

    Ok(())
}
