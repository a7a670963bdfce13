//! Lot accounting: FIFO consumption, issuance, and supply reconciliation
//!
//! Lots are consumed by *units*, oldest first. Cost basis follows the
//! units: each take shrinks `remaining_amount` by the same fraction it
//! shrinks `units_remaining`, so the two counters reach zero together and
//! a lot's basis never outlives its units.

use jiff::civil::Date;

use crate::error::InvariantError;
use crate::model::{CertificateId, Lot, LotId, LotSource};
use crate::store::LedgerStore;

/// Units below this after a take are snapped to zero (with the cost basis
/// snapped alongside) so residual-dust lots never accumulate.
pub const UNIT_SNAP_EPS: f64 = 1e-9;

/// Asking for more than this many units beyond what all lots hold is an
/// engine defect, not rounding noise.
pub const CONSUME_TOLERANCE: f64 = 1e-6;

/// Drift beyond this between the cached unit supply and the lot sum gets
/// rewritten by `reconcile`.
pub const RECONCILE_EPS: f64 = 1e-6;

/// One lot's share of a FIFO consumption.
#[derive(Debug, Clone)]
pub struct ConsumedLot {
    pub lot_id: LotId,
    pub date: Date,
    pub source: LotSource,
    pub units_consumed: f64,
    /// Cost basis consumed alongside the units.
    pub amount_consumed: f64,
}

/// Consume `units_to_consume` from a certificate's lots in `(date, id)`
/// order, taking minimally from each until satisfied.
///
/// Fails with an [`InvariantError`] when the request exceeds the total
/// available units beyond tolerance. Callers are expected to have clamped
/// to the certificate's value first, so running dry here means the unit
/// supply and the lots disagree.
pub fn consume_fifo(
    store: &mut LedgerStore,
    certificate_id: CertificateId,
    units_to_consume: f64,
) -> Result<Vec<ConsumedLot>, InvariantError> {
    let mut remaining = units_to_consume;
    let mut consumed = Vec::new();

    for lot in store.lots_fifo(certificate_id) {
        if remaining <= UNIT_SNAP_EPS {
            break;
        }
        let available = lot.units_remaining;
        if available <= UNIT_SNAP_EPS {
            continue;
        }

        let take = available.min(remaining);
        let fraction = take / available;
        let amount_taken = lot.remaining_amount * fraction;

        let entry = store
            .lot_mut(certificate_id, lot.lot_id)
            .expect("lot listed by lots_fifo exists");
        entry.units_remaining -= take;
        entry.remaining_amount = (entry.remaining_amount - amount_taken).max(0.0);
        if entry.units_remaining <= UNIT_SNAP_EPS {
            entry.units_remaining = 0.0;
            entry.remaining_amount = 0.0;
        }

        consumed.push(ConsumedLot {
            lot_id: lot.lot_id,
            date: lot.date,
            source: lot.source,
            units_consumed: take,
            amount_consumed: amount_taken,
        });
        remaining -= take;
    }

    if remaining > CONSUME_TOLERANCE {
        let available = units_to_consume - remaining;
        return Err(InvariantError::InsufficientUnits {
            certificate_id,
            requested: units_to_consume,
            available,
        });
    }

    Ok(consumed)
}

/// Issue a lot priced at `unit_price` (captured by the caller *before* the
/// money was added): `units = net / unit_price`. Increments the
/// certificate's unit supply. Returns the lot id and units issued.
#[allow(clippy::too_many_arguments)]
pub fn issue_lot(
    store: &mut LedgerStore,
    certificate_id: CertificateId,
    date: Date,
    source: LotSource,
    gross: f64,
    net: f64,
    cost_basis: f64,
    unit_price: f64,
) -> Result<(LotId, f64), InvariantError> {
    if unit_price <= 0.0 {
        return Err(InvariantError::NonPositiveUnitPrice {
            certificate_id,
            unit_price,
        });
    }
    let units = net / unit_price;
    let lot_id = issue_lot_with_units(
        store,
        certificate_id,
        date,
        source,
        gross,
        net,
        cost_basis,
        units,
        unit_price,
    );
    Ok((lot_id, units))
}

/// Issue a lot with explicit units. Used by transfers, where destination
/// units are a fraction of one jointly-priced block rather than
/// `net / price` per lot.
#[allow(clippy::too_many_arguments)]
pub fn issue_lot_with_units(
    store: &mut LedgerStore,
    certificate_id: CertificateId,
    date: Date,
    source: LotSource,
    gross: f64,
    net: f64,
    cost_basis: f64,
    units: f64,
    issue_unit_price: f64,
) -> LotId {
    let lot_id = store.push_lot(Lot {
        lot_id: LotId(0), // assigned by the store
        certificate_id,
        date,
        source,
        gross_amount: gross,
        net_amount: net,
        remaining_amount: cost_basis,
        units_total: units,
        units_remaining: units,
        issue_unit_price,
    });
    store.update_unit_supply(certificate_id, units);
    lot_id
}

/// Recompute the unit supply from the lots and rewrite the cached counter
/// if it drifted beyond [`RECONCILE_EPS`]. Returns `(old, new)`.
///
/// The cached aggregate must never permanently diverge from its lots; an
/// executor bug shows up here as a rewrite, which the scheduler reports.
pub fn reconcile(store: &mut LedgerStore, certificate_id: CertificateId) -> (f64, f64) {
    let old = store
        .certificate(certificate_id)
        .map(|c| c.unit_supply)
        .unwrap_or(0.0);
    let new: f64 = store
        .lots_fifo(certificate_id)
        .iter()
        .map(|l| l.units_remaining)
        .sum();
    if (old - new).abs() > RECONCILE_EPS
        && let Some(cert) = store.certificate_mut(certificate_id)
    {
        cert.unit_supply = new;
    }
    (old, new)
}
