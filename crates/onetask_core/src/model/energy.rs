//! Energy accounting model.
//!
//! # Responsibility
//! - Define the per-user, per-day capacity record.
//! - Validate calendar-day keys before they reach SQL.
//!
//! # Invariants
//! - `spent` is monotonically non-decreasing within a day.
//! - `remaining` may go negative; over-budget is a signal, not a gate.
//! - A `DayKey` always holds a well-formed `YYYY-MM-DD` string.

use crate::model::task::UserId;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

static DAY_KEY_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("day key pattern must compile")
});

/// Validation failures for energy records and day keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnergyValidationError {
    /// Day key is not `YYYY-MM-DD`.
    MalformedDay(String),
    /// Budgets cannot be negative.
    NegativeBudget(i64),
    /// Attribution cost must be positive.
    NonPositiveCost(i64),
}

impl Display for EnergyValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MalformedDay(value) => {
                write!(f, "day key must be YYYY-MM-DD, got `{value}`")
            }
            Self::NegativeBudget(value) => {
                write!(f, "energy budget cannot be negative, got {value}")
            }
            Self::NonPositiveCost(value) => {
                write!(f, "energy cost must be positive, got {value}")
            }
        }
    }
}

impl Error for EnergyValidationError {}

/// Calendar-day key in `YYYY-MM-DD` form.
///
/// Kept as validated text because SQLite's `date('now')` is the engine's
/// clock source and produces exactly this shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DayKey(String);

impl DayKey {
    /// Validates and wraps a calendar-day string.
    pub fn new(value: impl Into<String>) -> Result<Self, EnergyValidationError> {
        let value = value.into();
        if !DAY_KEY_PATTERN.is_match(&value) {
            return Err(EnergyValidationError::MalformedDay(value));
        }
        Ok(Self(value))
    }

    /// Returns the raw `YYYY-MM-DD` text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for DayKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-user, per-day capacity accounting record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnergyBudget {
    /// Owning user.
    pub user_uuid: UserId,
    /// Calendar day this record accounts for.
    pub day: DayKey,
    /// Planned capacity for the day.
    pub budget: i64,
    /// Cumulative cost of tasks completed on this day.
    pub spent: i64,
}

impl EnergyBudget {
    /// Materializes the default record for a day with no stored row.
    pub fn materialized(user_uuid: UserId, day: DayKey, default_budget: i64) -> Self {
        Self {
            user_uuid,
            day,
            budget: default_budget,
            spent: 0,
        }
    }

    /// Remaining capacity; negative means over budget.
    pub fn remaining(&self) -> i64 {
        self.budget - self.spent
    }
}

#[cfg(test)]
mod tests {
    use super::{DayKey, EnergyBudget, EnergyValidationError};
    use uuid::Uuid;

    #[test]
    fn day_key_accepts_calendar_shape() {
        let day = DayKey::new("2025-07-01").unwrap();
        assert_eq!(day.as_str(), "2025-07-01");
        assert_eq!(day.to_string(), "2025-07-01");
    }

    #[test]
    fn day_key_rejects_malformed_input() {
        for bad in ["2025-7-1", "20250701", "tomorrow", "2025-07-01T00:00"] {
            let err = DayKey::new(bad).unwrap_err();
            assert!(matches!(err, EnergyValidationError::MalformedDay(_)));
        }
    }

    #[test]
    fn materialized_default_has_zero_spent() {
        let budget = EnergyBudget::materialized(
            Uuid::new_v4(),
            DayKey::new("2025-07-01").unwrap(),
            5,
        );
        assert_eq!(budget.budget, 5);
        assert_eq!(budget.spent, 0);
        assert_eq!(budget.remaining(), 5);
    }

    #[test]
    fn remaining_may_go_negative() {
        let mut budget = EnergyBudget::materialized(
            Uuid::new_v4(),
            DayKey::new("2025-07-01").unwrap(),
            3,
        );
        budget.spent = 5;
        assert_eq!(budget.remaining(), -2);
    }
}
