//! Energy ledger use-case service.
//!
//! # Responsibility
//! - Provide budget reads and explicit budget writes to callers.
//!
//! # Invariants
//! - Spend attribution happens only through task completion; this
//!   service never increments `spent` on behalf of callers.

use crate::model::energy::{DayKey, EnergyBudget};
use crate::model::task::UserId;
use crate::repo::energy_repo::{EnergyRepoResult, EnergyRepository};
use crate::service::lifecycle::EngineConfig;
use log::info;

/// Use-case service over per-day capacity records.
pub struct EnergyLedger<R: EnergyRepository> {
    repo: R,
    config: EngineConfig,
}

impl<R: EnergyRepository> EnergyLedger<R> {
    /// Creates a ledger using the provided repository implementation.
    pub fn new(repo: R, config: EngineConfig) -> Self {
        Self { repo, config }
    }

    /// Returns the stored record for a day, or a materialized default
    /// that is not persisted until a write occurs.
    pub fn get(&self, user: UserId, day: &DayKey) -> EnergyRepoResult<EnergyBudget> {
        self.repo
            .get_budget(user, day, self.config.default_daily_budget)
    }

    /// Upserts the budget value for a day, preserving existing spend.
    pub fn set_budget(
        &self,
        user: UserId,
        day: &DayKey,
        budget: i64,
    ) -> EnergyRepoResult<EnergyBudget> {
        let record = self.repo.set_budget(user, day, budget)?;
        info!("event=budget_set module=energy status=ok day={day} budget={budget}");
        Ok(record)
    }

    /// Current calendar day per the store's clock.
    pub fn today(&self) -> EnergyRepoResult<DayKey> {
        self.repo.today()
    }
}
