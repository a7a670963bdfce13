//! Withdrawal and contribution tax calculations
//!
//! Two orthogonal axes: the certificate's *regime* (regressive holding-age
//! brackets vs progressive flat withholding) and its *plan type* (PGBL
//! taxes the full redeemed amount, VGBL only the earnings share). On top
//! sits the excise (IOF) tax on annual contribution volume.
//!
//! Bracket tables are configuration ([`TaxTables`]); the functions here
//! only encode the arithmetic.

use jiff::civil::Date;

use crate::date_math::{add_years, days_between};
use crate::error::UserError;
use crate::model::{
    CertificateId, LotId, PlanType, ProgressiveBracket, TaxRegime, TaxTables,
};
use crate::store::LedgerStore;
use crate::valuation;

// ============================================================================
// Regressive regime: calendar-year holding brackets
// ============================================================================

/// Regressive rate for a lot held from `lot_date` to `as_of`.
///
/// Each bracket boundary is the lot date plus that bracket's whole number
/// of calendar years (a Feb 29 lot gets a Feb 28 boundary in non-leap
/// years). The boundary date itself still belongs to the bracket it
/// closes: a lot evaluated exactly two calendar years after issue is still
/// at the two-year rate and drops the next day.
pub fn regressive_rate(tables: &TaxTables, lot_date: Date, as_of: Date) -> f64 {
    for bracket in &tables.regressive_brackets {
        let boundary = add_years(lot_date, bracket.max_years as i32);
        if as_of <= boundary {
            return bracket.rate;
        }
    }
    tables.regressive_floor_rate
}

/// The next bracket a lot will fall into, and when.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BracketDrop {
    pub next_rate: f64,
    /// Days from `as_of` until the lower rate takes effect (the day after
    /// the bracket boundary).
    pub days_until: i32,
}

/// When the lot's rate next drops; `None` once at the terminal floor rate.
pub fn next_bracket_drop(tables: &TaxTables, lot_date: Date, as_of: Date) -> Option<BracketDrop> {
    for (i, bracket) in tables.regressive_brackets.iter().enumerate() {
        let boundary = add_years(lot_date, bracket.max_years as i32);
        if as_of <= boundary {
            let next_rate = tables
                .regressive_brackets
                .get(i + 1)
                .map(|b| b.rate)
                .unwrap_or(tables.regressive_floor_rate);
            return Some(BracketDrop {
                next_rate,
                days_until: days_between(as_of, boundary) + 1,
            });
        }
    }
    None
}

// ============================================================================
// Progressive regime: flat withholding plus an advisory estimate
// ============================================================================

/// Advisory final-tax estimate from the marginal bracket table with its
/// linear deduction terms. The flat withholding is what is actually
/// collected; this figure is informational only.
pub fn progressive_estimate(brackets: &[ProgressiveBracket], taxable_base: f64) -> f64 {
    if taxable_base <= 0.0 {
        return 0.0;
    }
    for bracket in brackets {
        if taxable_base <= bracket.up_to {
            return (taxable_base * bracket.rate - bracket.deduction).max(0.0);
        }
    }
    0.0
}

// ============================================================================
// Taxable base
// ============================================================================

/// VGBL earnings ratio: the share of certificate value that is gain rather
/// than returned premium. A property of the whole pool, not of any one
/// lot's own cost basis.
pub fn earnings_ratio(premium_remaining: f64, total_value: f64) -> f64 {
    if total_value <= 0.0 {
        return 0.0;
    }
    (1.0 - premium_remaining / total_value).max(0.0)
}

/// Per-lot rate, taxable base, and tax for one consumed lot of an outflow.
///
/// `lot_gross_value` is the lot's redeemed market value at the captured
/// unit price; `taxable_total` is the certificate-level taxable amount
/// (full gross for PGBL, `gross × earnings_ratio` for VGBL), distributed
/// across lots in proportion to market-value share.
#[allow(clippy::too_many_arguments)]
pub(crate) fn lot_tax(
    tables: &TaxTables,
    regime: TaxRegime,
    plan_type: PlanType,
    lot_date: Date,
    as_of: Date,
    lot_gross_value: f64,
    gross_amount: f64,
    taxable_total: f64,
) -> (f64, f64, f64) {
    let rate = match regime {
        TaxRegime::Regressive => regressive_rate(tables, lot_date, as_of),
        TaxRegime::Progressive => tables.withholding_rate,
    };
    let taxable = match plan_type {
        PlanType::Pgbl => lot_gross_value,
        PlanType::Vgbl => {
            if gross_amount > 0.0 {
                (lot_gross_value / gross_amount) * taxable_total
            } else {
                0.0
            }
        }
    };
    (rate, taxable, taxable * rate)
}

// ============================================================================
// Excise (IOF) tax on annual contribution volume
// ============================================================================

/// Excess-over-threshold differencing rule: only the portion of the new
/// contribution that crosses the annual threshold is taxed, no matter how
/// many prior contributions already occurred that year.
pub fn excise_tax(
    existing_period_total: f64,
    declared_external_total: f64,
    new_amount: f64,
    threshold: f64,
    rate: f64,
) -> f64 {
    let before = existing_period_total + declared_external_total;
    let after = before + new_amount;
    let excess_before = (before - threshold).max(0.0);
    let excess_after = (after - threshold).max(0.0);
    (excess_after - excess_before) * rate
}

// ============================================================================
// Pre-withdrawal estimate (read-only preview)
// ============================================================================

#[derive(Debug, Clone)]
pub struct TaxBreakdownLine {
    pub lot_id: LotId,
    pub lot_date: Date,
    pub gross_value: f64,
    pub rate: f64,
    pub taxable: f64,
    pub tax: f64,
}

#[derive(Debug, Clone)]
pub struct RegimeEstimate {
    pub gross: f64,
    pub tax: f64,
    pub net: f64,
    pub effective_rate: f64,
    pub lines: Vec<TaxBreakdownLine>,
    /// Advisory marginal estimate; only present under the progressive
    /// regime.
    pub estimated_final_tax: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct WithdrawalEstimate {
    pub certificate_id: CertificateId,
    pub plan_type: PlanType,
    pub regime: Option<TaxRegime>,
    pub total_value: f64,
    pub amount: f64,
    /// Present when the regime is regressive or still unset.
    pub regressive: Option<RegimeEstimate>,
    /// Present when the regime is progressive or still unset.
    pub progressive: Option<RegimeEstimate>,
}

/// Preview the tax on a withdrawal without mutating anything. When the
/// certificate's regime is still unset, both estimates are returned so the
/// owner can compare before electing.
pub fn estimate_withdrawal(
    store: &LedgerStore,
    certificate_id: CertificateId,
    amount: f64,
) -> Result<WithdrawalEstimate, UserError> {
    let cert = store
        .certificate(certificate_id)
        .ok_or(UserError::CertificateNotFound(certificate_id))?;
    if amount <= 0.0 {
        return Err(UserError::NonPositiveAmount(amount));
    }

    let total_value = valuation::total_value(store, certificate_id);
    let amount = amount.min(total_value);
    let unit_price = valuation::unit_price(store, certificate_id);
    let units_to_redeem = if unit_price > 0.0 { amount / unit_price } else { 0.0 };

    // Walk the lots FIFO without consuming them
    let mut takes: Vec<(LotId, Date, f64)> = Vec::new();
    let mut remaining = units_to_redeem;
    for lot in store.lots_fifo(certificate_id) {
        if remaining <= 1e-9 {
            break;
        }
        if lot.units_remaining <= 1e-9 {
            continue;
        }
        let take = lot.units_remaining.min(remaining);
        takes.push((lot.lot_id, lot.date, take));
        remaining -= take;
    }

    let taxable_total = match cert.plan_type {
        PlanType::Pgbl => amount,
        PlanType::Vgbl => amount * earnings_ratio(cert.premium_remaining, total_value),
    };

    let estimate_for = |regime: TaxRegime| -> RegimeEstimate {
        let mut lines = Vec::with_capacity(takes.len());
        let mut total_tax = 0.0;
        for (lot_id, lot_date, units) in &takes {
            let gross_value = units * unit_price;
            let (rate, taxable, tax) = lot_tax(
                &store.config.tax_tables,
                regime,
                cert.plan_type,
                *lot_date,
                store.clock.date,
                gross_value,
                amount,
                taxable_total,
            );
            total_tax += tax;
            lines.push(TaxBreakdownLine {
                lot_id: *lot_id,
                lot_date: *lot_date,
                gross_value,
                rate,
                taxable,
                tax,
            });
        }
        let estimated_final_tax = match regime {
            TaxRegime::Progressive => Some(progressive_estimate(
                &store.config.tax_tables.progressive_brackets,
                taxable_total,
            )),
            TaxRegime::Regressive => None,
        };
        RegimeEstimate {
            gross: amount,
            tax: total_tax,
            net: amount - total_tax,
            effective_rate: if amount > 0.0 { total_tax / amount } else { 0.0 },
            lines,
            estimated_final_tax,
        }
    };

    let regressive = match cert.tax_regime {
        Some(TaxRegime::Regressive) | None => Some(estimate_for(TaxRegime::Regressive)),
        Some(TaxRegime::Progressive) => None,
    };
    let progressive = match cert.tax_regime {
        Some(TaxRegime::Progressive) | None => Some(estimate_for(TaxRegime::Progressive)),
        Some(TaxRegime::Regressive) => None,
    };

    Ok(WithdrawalEstimate {
        certificate_id,
        plan_type: cert.plan_type,
        regime: cert.tax_regime,
        total_value,
        amount,
        regressive,
        progressive,
    })
}
