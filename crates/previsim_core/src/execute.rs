//! Request executors
//!
//! One executor per request kind, each composing valuation, lot accounting
//! and the tax module. Executors mutate the store freely and return either
//! a structured event or an error; the scheduler wraps every call in a
//! savepoint, so a failing executor never has to clean up after itself.
//!
//! Ordering inside an executor is load-bearing: the unit price and the
//! VGBL premium fraction are captured *before* holdings are sold, because
//! both are derived from the pre-sale certificate value.

use crate::date_math::{add_years, days_between};
use crate::error::{ExecError, InvariantError, UserError};
use crate::lots::{self, ConsumedLot};
use crate::model::{
    AllocationSet, Certificate, CertificateId, EngineEvent, LotAllocation, LotSource, OutflowKind,
    PlanType, Request, RequestId, RequestKind, TaxRegime, WithdrawalRecord,
};
use crate::store::LedgerStore;
use crate::taxes;
use crate::valuation;

/// Proportional sells may overshoot the holdings value by this fraction
/// before the request is refused.
pub const SELL_TOLERANCE: f64 = 0.001;

/// Result of one successfully executed request.
#[derive(Debug)]
pub(crate) struct ExecOutcome {
    pub event: EngineEvent,
    /// Certificates whose unit supply the scheduler should reconcile.
    pub touched: Vec<CertificateId>,
}

pub(crate) fn execute_request(
    store: &mut LedgerStore,
    request: &Request,
) -> Result<ExecOutcome, ExecError> {
    match &request.kind {
        RequestKind::Contribution { amount, tax_regime } => {
            execute_contribution(store, request, *amount, *tax_regime)
        }
        RequestKind::Withdrawal { amount, tax_regime } => {
            execute_withdrawal(store, request, *amount, *tax_regime)
        }
        RequestKind::FundSwap { new_allocations } => {
            execute_fund_swap(store, request, new_allocations)
        }
        RequestKind::TransferInternal {
            destination,
            amount,
        } => execute_transfer_internal(store, request, *destination, *amount),
        RequestKind::TransferExternalOut {
            institution,
            amount,
        } => execute_transfer_external_out(store, request, institution, *amount),
        RequestKind::TransferExternalIn {
            institution,
            amount,
        } => execute_transfer_external_in(store, request, institution, *amount),
        RequestKind::PortabilityOut {
            destination,
            amount,
        } => execute_portability_out(store, request, *destination, *amount),
        RequestKind::PortabilityIn { .. } => {
            Err(UserError::RequestNotExecutable(request.request_id).into())
        }
        RequestKind::BrokerageWithdrawal { amount } => {
            execute_brokerage_withdrawal(store, request, *amount)
        }
    }
}

// ============================================================================
// Shared helpers
// ============================================================================

/// Fetch the request's certificate and re-verify it belongs to the
/// requesting user before anything is mutated.
fn require_certificate(
    store: &LedgerStore,
    request: &Request,
) -> Result<Certificate, UserError> {
    let certificate_id = request
        .certificate_id
        .ok_or(UserError::MissingCertificate(request.request_id))?;
    let cert = store
        .certificate(certificate_id)
        .ok_or(UserError::CertificateNotFound(certificate_id))?;
    if cert.user_id != request.user_id {
        return Err(UserError::OwnershipMismatch {
            certificate_id,
            user_id: request.user_id,
        });
    }
    Ok(cert.clone())
}

/// Sell holdings proportionally across all funds to raise `amount`.
fn sell_holdings(
    store: &mut LedgerStore,
    certificate_id: CertificateId,
    amount: f64,
) -> Result<(), UserError> {
    let holdings = store.holdings(certificate_id);
    let total: f64 = holdings
        .iter()
        .map(|(fund_id, units)| {
            units * store.fund(*fund_id).map(|f| f.current_nav).unwrap_or(0.0)
        })
        .sum();

    if total <= 0.0 || amount > total * (1.0 + SELL_TOLERANCE) {
        return Err(UserError::InsufficientHoldings {
            certificate_id,
            requested: amount,
            available: total,
        });
    }

    let sell_fraction = (amount / total).min(1.0);
    for (fund_id, units) in holdings {
        store.set_holding(certificate_id, fund_id, units * (1.0 - sell_fraction));
    }
    Ok(())
}

/// Buy into a certificate per its target allocation, fractional units, no
/// cash residual. The allocation is a hard precondition for every inflow.
fn buy_per_allocation(
    store: &mut LedgerStore,
    certificate_id: CertificateId,
    amount: f64,
) -> Result<(), ExecError> {
    let allocation = store
        .allocation(certificate_id)
        .cloned()
        .ok_or(UserError::MissingTargetAllocation(certificate_id))?;
    for (fund_id, fraction) in allocation.normalized() {
        let nav = store
            .fund(fund_id)
            .ok_or(InvariantError::FundNotFound(fund_id))?
            .current_nav;
        if nav <= 0.0 {
            continue;
        }
        let units = amount * fraction / nav;
        let existing = store.holding_units(certificate_id, fund_id);
        store.set_holding(certificate_id, fund_id, existing + units);
    }
    Ok(())
}

/// Apply a regime election if the certificate has none yet. The election
/// is irrevocable, so a differing later choice is ignored rather than
/// applied.
fn elect_regime(store: &mut LedgerStore, certificate_id: CertificateId, choice: Option<TaxRegime>) {
    if let Some(choice) = choice
        && let Some(cert) = store.certificate_mut(certificate_id)
        && cert.tax_regime.is_none()
    {
        cert.tax_regime = Some(choice);
    }
}

/// Append zero-tax audit rows for a non-taxed outflow (transfers carry
/// their tax clocks with them instead of settling).
fn audit_untaxed(
    store: &mut LedgerStore,
    outflow: OutflowKind,
    request_id: RequestId,
    consumed: &[ConsumedLot],
    unit_price: f64,
) {
    let as_of = store.clock.date;
    for lot in consumed {
        store.push_lot_allocation(LotAllocation {
            outflow,
            request_id,
            lot_id: lot.lot_id,
            units_consumed: lot.units_consumed,
            amount_consumed: lot.amount_consumed,
            gross_value: lot.units_consumed * unit_price,
            days_held: days_between(lot.date, as_of).max(0),
            tax_rate: 0.0,
            taxable_base: 0.0,
            tax_amount: 0.0,
        });
    }
}

fn positive_unit_price(
    store: &LedgerStore,
    certificate_id: CertificateId,
) -> Result<f64, InvariantError> {
    let unit_price = valuation::unit_price(store, certificate_id);
    if unit_price <= 0.0 {
        return Err(InvariantError::NonPositiveUnitPrice {
            certificate_id,
            unit_price,
        });
    }
    Ok(unit_price)
}

// ============================================================================
// Inflows
// ============================================================================

fn execute_contribution(
    store: &mut LedgerStore,
    request: &Request,
    amount: f64,
    regime_choice: Option<TaxRegime>,
) -> Result<ExecOutcome, ExecError> {
    let cert = require_certificate(store, request)?;
    let certificate_id = cert.certificate_id;
    if amount <= 0.0 {
        return Err(UserError::NonPositiveAmount(amount).into());
    }
    if store.allocation(certificate_id).is_none() {
        return Err(UserError::MissingTargetAllocation(certificate_id).into());
    }
    let cash = store.brokerage_cash(request.user_id);
    if cash < amount {
        return Err(UserError::InsufficientBrokerageCash {
            user_id: request.user_id,
            requested: amount,
            available: cash,
        }
        .into());
    }

    // Excise applies to non-deductible direct contributions only, against
    // the user's full calendar-year volume plus any declared amount held
    // at other issuers.
    let mut excise = 0.0;
    if cert.plan_type == PlanType::Vgbl {
        let year = store.clock.date.year();
        let existing = store.contributions_in_year(request.user_id, PlanType::Vgbl, year);
        let declared = store.declared_external(request.user_id, year);
        let threshold = store.config.excise.threshold_for_year(year);
        excise = taxes::excise_tax(existing, declared, amount, threshold, store.config.excise.rate);
        if excise >= amount {
            return Err(UserError::ExciseConsumesContribution {
                amount,
                tax: excise,
            }
            .into());
        }
    }
    let net = amount - excise;

    elect_regime(store, certificate_id, regime_choice);
    store.set_brokerage_cash(request.user_id, cash - amount);

    let unit_price = positive_unit_price(store, certificate_id)?;
    let (_, units_issued) = lots::issue_lot(
        store,
        certificate_id,
        store.clock.date,
        LotSource::Contribution,
        amount,
        net,
        net,
        unit_price,
    )?;
    if cert.plan_type == PlanType::Vgbl {
        store.update_premium_remaining(certificate_id, net);
    }
    buy_per_allocation(store, certificate_id, net)?;

    Ok(ExecOutcome {
        event: EngineEvent::ContributionExecuted {
            request_id: request.request_id,
            certificate_id,
            gross: amount,
            excise_tax: excise,
            net_invested: net,
            units_issued,
            unit_price,
        },
        touched: vec![certificate_id],
    })
}

fn execute_transfer_external_in(
    store: &mut LedgerStore,
    request: &Request,
    institution: &str,
    amount: f64,
) -> Result<ExecOutcome, ExecError> {
    let cert = require_certificate(store, request)?;
    let certificate_id = cert.certificate_id;
    if amount <= 0.0 {
        return Err(UserError::NonPositiveAmount(amount).into());
    }
    if store.allocation(certificate_id).is_none() {
        return Err(UserError::MissingTargetAllocation(certificate_id).into());
    }

    let schedule = store.config.portin_schedule.clone();
    let premium_fraction = store.config.portin_premium_fraction;

    // One pre-captured price for every tranche; issuing the first backdated
    // lot would otherwise dilute the price the later ones see.
    let unit_price = positive_unit_price(store, certificate_id)?;
    let total_units = amount / unit_price;

    let mut tranches = Vec::with_capacity(schedule.tranches().len());
    for tranche in schedule.tranches() {
        let fraction = tranche.pct / 100.0;
        let tranche_amount = amount * fraction;
        let tranche_units = total_units * fraction;
        let lot_date = add_years(store.clock.date, -(tranche.years_ago as i32));
        let cost_basis = match cert.plan_type {
            PlanType::Vgbl => tranche_amount * premium_fraction,
            PlanType::Pgbl => tranche_amount,
        };
        lots::issue_lot_with_units(
            store,
            certificate_id,
            lot_date,
            LotSource::TransferExternal,
            tranche_amount,
            tranche_amount,
            cost_basis,
            tranche_units,
            unit_price,
        );
        tranches.push((lot_date, tranche_amount));
    }

    if cert.plan_type == PlanType::Vgbl {
        store.update_premium_remaining(certificate_id, amount * premium_fraction);
    }
    buy_per_allocation(store, certificate_id, amount)?;

    Ok(ExecOutcome {
        event: EngineEvent::ExternalTransferInExecuted {
            request_id: request.request_id,
            certificate_id,
            amount,
            institution: institution.to_string(),
            tranches,
        },
        touched: vec![certificate_id],
    })
}

// ============================================================================
// Outflows
// ============================================================================

fn execute_withdrawal(
    store: &mut LedgerStore,
    request: &Request,
    amount: f64,
    regime_choice: Option<TaxRegime>,
) -> Result<ExecOutcome, ExecError> {
    let cert = require_certificate(store, request)?;
    let certificate_id = cert.certificate_id;
    if amount <= 0.0 {
        return Err(UserError::NonPositiveAmount(amount).into());
    }

    elect_regime(store, certificate_id, regime_choice);
    let regime = store
        .certificate(certificate_id)
        .and_then(|c| c.tax_regime)
        .ok_or(UserError::TaxRegimeNotChosen(certificate_id))?;

    let total_value = valuation::total_value(store, certificate_id);
    if total_value <= 0.0 {
        return Err(UserError::InsufficientHoldings {
            certificate_id,
            requested: amount,
            available: 0.0,
        }
        .into());
    }
    let amount = amount.min(total_value);

    // Captured before the sale mutates holdings
    let unit_price = positive_unit_price(store, certificate_id)?;
    let premium_before = cert.premium_remaining;
    let units_to_redeem = amount / unit_price;

    sell_holdings(store, certificate_id, amount)?;
    let consumed = lots::consume_fifo(store, certificate_id, units_to_redeem)?;

    let taxable_total = match cert.plan_type {
        PlanType::Pgbl => amount,
        PlanType::Vgbl => amount * taxes::earnings_ratio(premium_before, total_value),
    };

    let tables = store.config.tax_tables.clone();
    let as_of = store.clock.date;
    let mut total_tax = 0.0;
    for lot in &consumed {
        let gross_value = lot.units_consumed * unit_price;
        let (rate, taxable, tax) = taxes::lot_tax(
            &tables,
            regime,
            cert.plan_type,
            lot.date,
            as_of,
            gross_value,
            amount,
            taxable_total,
        );
        total_tax += tax;
        store.push_lot_allocation(LotAllocation {
            outflow: OutflowKind::Withdrawal,
            request_id: request.request_id,
            lot_id: lot.lot_id,
            units_consumed: lot.units_consumed,
            amount_consumed: lot.amount_consumed,
            gross_value,
            days_held: days_between(lot.date, as_of).max(0),
            tax_rate: rate,
            taxable_base: taxable,
            tax_amount: tax,
        });
    }
    let net = amount - total_tax;

    store.push_withdrawal_record(WithdrawalRecord {
        certificate_id,
        request_id: request.request_id,
        gross_amount: amount,
        tax_withheld: total_tax,
        net_amount: net,
        date: as_of,
    });

    store.update_unit_supply(certificate_id, -units_to_redeem);
    if cert.plan_type == PlanType::Vgbl {
        let premium_fraction = (premium_before / total_value).min(1.0);
        store.update_premium_remaining(certificate_id, -(amount * premium_fraction));
    }
    store.add_brokerage_cash(request.user_id, net);

    let estimated_final_tax = match regime {
        TaxRegime::Progressive => Some(taxes::progressive_estimate(
            &tables.progressive_brackets,
            taxable_total,
        )),
        TaxRegime::Regressive => None,
    };

    Ok(ExecOutcome {
        event: EngineEvent::WithdrawalExecuted {
            request_id: request.request_id,
            certificate_id,
            gross: amount,
            tax: total_tax,
            net,
            regime,
            estimated_final_tax,
        },
        touched: vec![certificate_id],
    })
}

fn execute_transfer_external_out(
    store: &mut LedgerStore,
    request: &Request,
    institution: &str,
    amount: f64,
) -> Result<ExecOutcome, ExecError> {
    let cert = require_certificate(store, request)?;
    let certificate_id = cert.certificate_id;
    if amount <= 0.0 {
        return Err(UserError::NonPositiveAmount(amount).into());
    }
    let total_value = valuation::total_value(store, certificate_id);
    if total_value <= 0.0 {
        return Err(UserError::InsufficientHoldings {
            certificate_id,
            requested: amount,
            available: 0.0,
        }
        .into());
    }
    let amount = amount.min(total_value);

    let unit_price = positive_unit_price(store, certificate_id)?;
    let premium_before = cert.premium_remaining;
    let units_to_redeem = amount / unit_price;

    sell_holdings(store, certificate_id, amount)?;
    let consumed = lots::consume_fifo(store, certificate_id, units_to_redeem)?;
    audit_untaxed(
        store,
        OutflowKind::TransferExternalOut,
        request.request_id,
        &consumed,
        unit_price,
    );

    store.update_unit_supply(certificate_id, -units_to_redeem);
    if cert.plan_type == PlanType::Vgbl {
        let premium_fraction = (premium_before / total_value).min(1.0);
        store.update_premium_remaining(certificate_id, -(amount * premium_fraction));
    }
    // The ported value leaves the simulation; nothing is credited.

    Ok(ExecOutcome {
        event: EngineEvent::ExternalTransferOutExecuted {
            request_id: request.request_id,
            certificate_id,
            amount,
            institution: institution.to_string(),
        },
        touched: vec![certificate_id],
    })
}

fn execute_brokerage_withdrawal(
    store: &mut LedgerStore,
    request: &Request,
    amount: f64,
) -> Result<ExecOutcome, ExecError> {
    if amount <= 0.0 {
        return Err(UserError::NonPositiveAmount(amount).into());
    }
    let cash = store.brokerage_cash(request.user_id);
    if cash < amount {
        return Err(UserError::InsufficientBrokerageCash {
            user_id: request.user_id,
            requested: amount,
            available: cash,
        }
        .into());
    }
    store.set_brokerage_cash(request.user_id, cash - amount);

    Ok(ExecOutcome {
        event: EngineEvent::BrokerageWithdrawalExecuted {
            request_id: request.request_id,
            user_id: request.user_id,
            amount,
        },
        touched: Vec::new(),
    })
}

// ============================================================================
// Fund swap, the one operation that touches no lots
// ============================================================================

fn execute_fund_swap(
    store: &mut LedgerStore,
    request: &Request,
    new_allocations: &AllocationSet,
) -> Result<ExecOutcome, ExecError> {
    let cert = require_certificate(store, request)?;
    let certificate_id = cert.certificate_id;

    // Validate the target funds before anything is sold
    for entry in new_allocations.entries() {
        if store.fund(entry.fund_id).is_none() {
            return Err(UserError::UnknownFund(entry.fund_id).into());
        }
    }

    // Sell everything
    let mut total_cash = 0.0;
    for (fund_id, units) in store.holdings(certificate_id) {
        let nav = store.fund(fund_id).map(|f| f.current_nav).unwrap_or(0.0);
        total_cash += units * nav;
        store.set_holding(certificate_id, fund_id, 0.0);
    }

    // Buy the new mix with the same proceeds; lots are untouched
    for (fund_id, fraction) in new_allocations.normalized() {
        let nav = store.fund(fund_id).map(|f| f.current_nav).unwrap_or(0.0);
        if nav <= 0.0 {
            continue;
        }
        store.set_holding(certificate_id, fund_id, total_cash * fraction / nav);
    }

    store.set_allocation(certificate_id, new_allocations.clone());

    Ok(ExecOutcome {
        event: EngineEvent::FundSwapExecuted {
            request_id: request.request_id,
            certificate_id,
            reallocated: total_cash,
        },
        touched: vec![certificate_id],
    })
}

// ============================================================================
// Certificate-to-certificate moves
// ============================================================================

fn execute_transfer_internal(
    store: &mut LedgerStore,
    request: &Request,
    destination: CertificateId,
    amount: f64,
) -> Result<ExecOutcome, ExecError> {
    let source = require_certificate(store, request)?;
    let dest = store
        .certificate(destination)
        .cloned()
        .ok_or(UserError::DestinationNotFound(destination))?;
    // Internal transfers stay within one participant's certificates
    if dest.user_id != request.user_id {
        return Err(UserError::OwnershipMismatch {
            certificate_id: destination,
            user_id: request.user_id,
        }
        .into());
    }

    check_endpoint_compatibility(&source, &dest)?;
    if store.allocation(destination).is_none() {
        return Err(UserError::MissingTargetAllocation(destination).into());
    }

    let source_value = valuation::total_value(store, source.certificate_id);
    let amount = amount.min(source_value);
    if amount <= 0.0 {
        return Err(UserError::NonPositiveAmount(amount).into());
    }

    inherit_regime(store, &source, &dest);
    let premium_moved = transfer_value(
        store,
        request.request_id,
        &source,
        destination,
        amount,
        source_value,
        OutflowKind::TransferInternal,
        LotSource::TransferInternal,
    )?;

    Ok(ExecOutcome {
        event: EngineEvent::TransferExecuted {
            request_id: request.request_id,
            source: source.certificate_id,
            destination,
            amount,
            premium_moved,
            legacy_portability: false,
        },
        touched: vec![source.certificate_id, destination],
    })
}

fn execute_portability_out(
    store: &mut LedgerStore,
    request: &Request,
    destination: CertificateId,
    amount: Option<f64>,
) -> Result<ExecOutcome, ExecError> {
    let source = require_certificate(store, request)?;
    let dest = store
        .certificate(destination)
        .cloned()
        .ok_or(UserError::DestinationNotFound(destination))?;

    check_endpoint_compatibility(&source, &dest)?;
    if store.allocation(destination).is_none() {
        return Err(UserError::MissingTargetAllocation(destination).into());
    }

    let source_value = valuation::total_value(store, source.certificate_id);
    let amount = amount.unwrap_or(source_value).min(source_value);
    if amount <= 0.0 {
        return Err(UserError::NonPositiveAmount(amount).into());
    }

    inherit_regime(store, &source, &dest);
    let premium_moved = transfer_value(
        store,
        request.request_id,
        &source,
        destination,
        amount,
        source_value,
        OutflowKind::PortabilityOut,
        LotSource::TransferExternal,
    )?;

    // Settle the paired marker request, if the owner filed one
    let completed_date = store.clock.date;
    for in_request in store.pending_portability_in_matching(destination, source.certificate_id) {
        store.complete_request(in_request, completed_date);
    }

    Ok(ExecOutcome {
        event: EngineEvent::TransferExecuted {
            request_id: request.request_id,
            source: source.certificate_id,
            destination,
            amount,
            premium_moved,
            legacy_portability: true,
        },
        touched: vec![source.certificate_id, destination],
    })
}

/// Plan types must match and elected regimes must agree.
fn check_endpoint_compatibility(source: &Certificate, dest: &Certificate) -> Result<(), UserError> {
    if source.plan_type != dest.plan_type {
        return Err(UserError::PlanTypeMismatch {
            source: source.certificate_id,
            destination: dest.certificate_id,
        });
    }
    if let (Some(s), Some(d)) = (source.tax_regime, dest.tax_regime)
        && s != d
    {
        return Err(UserError::TaxRegimeMismatch {
            source: source.certificate_id,
            destination: dest.certificate_id,
        });
    }
    Ok(())
}

/// An unset destination regime inherits the source's election.
fn inherit_regime(store: &mut LedgerStore, source: &Certificate, dest: &Certificate) {
    if let Some(regime) = source.tax_regime
        && dest.tax_regime.is_none()
        && let Some(cert) = store.certificate_mut(dest.certificate_id)
    {
        cert.tax_regime = Some(regime);
    }
}

/// The shared tax-neutral move: consume FIFO at the source, recreate the
/// lots at the destination with their original dates (the tax clocks move
/// with the money), translate units at the destination's own price, and
/// move the VGBL premium in proportion to the market value transferred.
#[allow(clippy::too_many_arguments)]
fn transfer_value(
    store: &mut LedgerStore,
    request_id: RequestId,
    source: &Certificate,
    destination: CertificateId,
    amount: f64,
    source_value: f64,
    outflow: OutflowKind,
    lot_source: LotSource,
) -> Result<f64, ExecError> {
    let source_id = source.certificate_id;
    let src_price = positive_unit_price(store, source_id)?;
    let units_to_transfer = amount / src_price;

    sell_holdings(store, source_id, amount)?;
    let consumed = lots::consume_fifo(store, source_id, units_to_transfer)?;
    audit_untaxed(store, outflow, request_id, &consumed, src_price);
    store.update_unit_supply(source_id, -units_to_transfer);

    // The destination prices the incoming block with its own unit price,
    // captured once before any of the recreated lots land.
    let dest_price = positive_unit_price(store, destination)?;
    let total_dest_units = amount / dest_price;
    let total_consumed_units: f64 = consumed.iter().map(|l| l.units_consumed).sum();

    for lot in &consumed {
        let fraction = if total_consumed_units > 1e-9 {
            lot.units_consumed / total_consumed_units
        } else {
            1.0 / consumed.len().max(1) as f64
        };
        lots::issue_lot_with_units(
            store,
            destination,
            lot.date,
            lot_source,
            lot.amount_consumed,
            lot.amount_consumed,
            lot.amount_consumed,
            total_dest_units * fraction,
            dest_price,
        );
    }

    let mut premium_moved = 0.0;
    if source.plan_type == PlanType::Vgbl && source_value > 0.0 {
        let premium_fraction = (source.premium_remaining / source_value).min(1.0);
        premium_moved = amount * premium_fraction;
        store.update_premium_remaining(source_id, -premium_moved);
        store.update_premium_remaining(destination, premium_moved);
    }

    buy_per_allocation(store, destination, amount)?;
    Ok(premium_moved)
}
