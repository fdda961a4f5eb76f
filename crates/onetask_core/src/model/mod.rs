//! Domain model for the task execution engine.
//!
//! # Responsibility
//! - Define canonical data structures used by engine business logic.
//! - Keep validation rules next to the records they protect.
//!
//! # Invariants
//! - Every domain object is identified by a stable UUID; energy rows are
//!   keyed by (user, calendar day).
//! - Task deletion is represented by soft-delete tombstones, not hard
//!   delete.

pub mod checkpoint;
pub mod energy;
pub mod task;
