//! Engine use-case services.
//!
//! # Responsibility
//! - Orchestrate repository calls into use-case level APIs.
//! - Keep transport/presentation layers decoupled from storage details.
//!
//! # Invariants
//! - Services never bypass repository validation/atomicity contracts.
//! - The lifecycle engine is the sole writer of task status and of
//!   energy spend.

pub mod checkpoint_manager;
pub mod daily_view;
pub mod energy_ledger;
pub mod lifecycle;
