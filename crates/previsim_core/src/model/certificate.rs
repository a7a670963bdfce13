//! Certificates: one participant's account under a pension plan
//!
//! A certificate pools multi-fund holdings behind a single internal unit
//! price (`total_value / unit_supply`), so lots issued at different times
//! carry comparable shares regardless of the underlying fund mix.

use jiff::civil::Date;
use serde::{Deserialize, Serialize};

use super::ids::{CertificateId, UserId};

/// Plan product type.
///
/// PGBL contributions are tax-deductible, so withdrawals are taxed on the
/// full redeemed amount. VGBL contributions are post-tax, so only the
/// earnings portion of a withdrawal is taxable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlanType {
    Pgbl,
    Vgbl,
}

impl PlanType {
    /// Whether withdrawals tax only the earnings portion (VGBL) rather
    /// than the full redeemed amount (PGBL).
    pub fn taxes_earnings_only(&self) -> bool {
        matches!(self, PlanType::Vgbl)
    }
}

/// Lifecycle phase. Stored and preserved, but no executor branches on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Accumulating,
    Spending,
}

/// Withdrawal tax schedule. Elected at most once per certificate; the
/// election is irrevocable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaxRegime {
    Progressive,
    Regressive,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Certificate {
    pub certificate_id: CertificateId,
    pub user_id: UserId,
    pub plan_type: PlanType,
    pub phase: Phase,
    pub tax_regime: Option<TaxRegime>,
    /// Cached aggregate of all lots' `units_remaining`. Kept in sync by
    /// the executors; `lots::reconcile` self-heals any drift.
    pub unit_supply: f64,
    /// For VGBL: the outstanding cost basis not yet recognized as taxable
    /// earnings. Meaningless for PGBL and left at zero there.
    pub premium_remaining: f64,
    pub created_date: Date,
}

impl Certificate {
    pub fn new(
        certificate_id: CertificateId,
        user_id: UserId,
        plan_type: PlanType,
        created_date: Date,
    ) -> Self {
        Self {
            certificate_id,
            user_id,
            plan_type,
            phase: Phase::Accumulating,
            tax_regime: None,
            unit_supply: 0.0,
            premium_remaining: 0.0,
            created_date,
        }
    }
}
