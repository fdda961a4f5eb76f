//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define use-case oriented data access contracts for tasks, checkpoints
//!   and energy accounting.
//! - Isolate SQLite query details from service/business orchestration.
//!
//! # Invariants
//! - Every query is scoped to the owning user and excludes soft-deleted
//!   tasks unless explicitly asked otherwise.
//! - Cross-row invariants (WIP=1, completion attribution) are enforced
//!   inside single atomic statements or single immediate transactions.
//! - Repository APIs return semantic errors (`NotFound`,
//!   `WipLimitExceeded`, validation) in addition to DB transport errors.

pub mod checkpoint_repo;
pub mod energy_repo;
pub mod task_repo;
