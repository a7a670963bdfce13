//! Retirement-plan account simulation engine
//!
//! This crate is the accounting and settlement core of a long-horizon
//! pension simulator (PGBL/VGBL-style products) under a monthly-stepped
//! clock. It provides:
//! - Certificate-unit valuation: each account is pooled behind its own
//!   unit price, independent of the underlying fund mix
//! - FIFO cost-basis lots consumed by units, with tax aging preserved
//!   across transfers and portabilities
//! - Calendar-exact regressive brackets, flat progressive withholding
//!   with an advisory marginal estimate, and the IOF excise threshold tax
//! - Eight request executors drained in a single chronological batch per
//!   month, each atomically isolated behind a store savepoint
//!
//! The engine is a pure library: deterministic, synchronous, log-free.
//! Drive it through [`scheduler::evolve`] and read the structured
//! per-month event log it returns.
//!
//! ```ignore
//! use previsim_core::model::{Fund, FundId, PlanType, RequestKind, UserId};
//! use previsim_core::store::LedgerStore;
//!
//! let mut store = LedgerStore::default();
//! store.insert_fund(Fund::new(FundId(1), "Equities", 1.0).with_returns(vec![0.01]));
//! let user = UserId(1);
//! store.set_brokerage_cash(user, 10_000.0);
//! let cert = store.create_certificate(user, PlanType::Vgbl, store.clock.date);
//! // ... set an allocation, submit requests ...
//! let log = previsim_core::scheduler::evolve(&mut store, 12);
//! ```

#![warn(clippy::all)]

// ============================================================================
// Core modules
// ============================================================================

pub mod date_math;
pub mod error;
pub mod execute;
pub mod lots;
pub mod scheduler;
pub mod store;
pub mod taxes;
pub mod valuation;

// ============================================================================
// Type definition modules
// ============================================================================

pub mod model;

// ============================================================================
// Test modules
// ============================================================================

#[cfg(test)]
mod tests;

// ============================================================================
// Public re-exports for convenience
// ============================================================================

pub use error::{ConfigError, ExecError, InvariantError, UserError};
pub use scheduler::evolve;
pub use store::LedgerStore;
