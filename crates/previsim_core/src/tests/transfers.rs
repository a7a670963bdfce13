//! Certificate-to-certificate moves: internal transfers, external
//! portability in both directions, and the legacy portability pairing.

use jiff::civil::date;

use crate::model::{
    EngineEvent, FundId, PlanType, RequestKind, RequestStatus, TaxRegime, UserId,
};
use crate::scheduler::evolve;
use crate::store::LedgerStore;
use crate::valuation;

use super::support::{assert_conserved, flat_fund, seed_contribution, setup_cert};

/// Internal transfer moves lots FIFO with their original dates, translates
/// units at the destination's price, and moves the VGBL premium in
/// proportion to the value transferred.
#[test]
fn test_internal_transfer_preserves_lot_dates_and_premium() {
    let mut store = LedgerStore::default();
    store.insert_fund(flat_fund(1, 1.0));
    store.insert_fund(flat_fund(2, 1.0));
    let user = UserId(1);
    let source = setup_cert(&mut store, user, PlanType::Vgbl, FundId(1));
    let dest = setup_cert(&mut store, user, PlanType::Vgbl, FundId(2));
    seed_contribution(&mut store, source, FundId(1), date(2023, 5, 1), 600.0);
    seed_contribution(&mut store, source, FundId(1), date(2025, 5, 1), 400.0);

    store.submit_request(
        user,
        Some(source),
        RequestKind::TransferInternal {
            destination: dest,
            amount: 700.0,
        },
    );
    let log = evolve(&mut store, 1);

    assert!(
        log[0]
            .events
            .iter()
            .any(|e| matches!(e, EngineEvent::TransferExecuted { legacy_portability: false, .. }))
    );

    // Source: the older lot is gone, the newer lost 100 units
    let source_lots = store.lots_fifo(source);
    assert_eq!(source_lots[0].units_remaining, 0.0);
    assert!((source_lots[1].units_remaining - 300.0).abs() < 1e-6);

    // Destination: two recreated lots with the original dates and the
    // consumed cost basis
    let dest_lots = store.lots_fifo(dest);
    assert_eq!(dest_lots.len(), 2);
    assert_eq!(dest_lots[0].date, date(2023, 5, 1));
    assert_eq!(dest_lots[1].date, date(2025, 5, 1));
    assert!((dest_lots[0].remaining_amount - 600.0).abs() < 1e-6);
    assert!((dest_lots[1].remaining_amount - 100.0).abs() < 1e-6);

    // Premium moved 700 * (1000/1000)
    assert!((store.certificate(source).unwrap().premium_remaining - 300.0).abs() < 1e-6);
    assert!((store.certificate(dest).unwrap().premium_remaining - 700.0).abs() < 1e-6);

    // Value moved into the destination's allocation
    assert!((valuation::total_value(&store, dest) - 700.0).abs() < 1e-6);
    assert!((valuation::total_value(&store, source) - 300.0).abs() < 1e-6);
    assert_conserved(&store, source);
    assert_conserved(&store, dest);
}

#[test]
fn test_transfer_rejects_plan_type_mismatch() {
    let mut store = LedgerStore::default();
    store.insert_fund(flat_fund(1, 1.0));
    let user = UserId(1);
    let source = setup_cert(&mut store, user, PlanType::Vgbl, FundId(1));
    let dest = setup_cert(&mut store, user, PlanType::Pgbl, FundId(1));
    seed_contribution(&mut store, source, FundId(1), date(2025, 1, 1), 100.0);

    let req = store.submit_request(
        user,
        Some(source),
        RequestKind::TransferInternal {
            destination: dest,
            amount: 50.0,
        },
    );
    evolve(&mut store, 1);

    let request = store.request(req).unwrap();
    assert_eq!(request.status, RequestStatus::Failed);
    assert!(request.status_reason.as_ref().unwrap().contains("plan type"));
    assert!((valuation::total_value(&store, source) - 100.0).abs() < 1e-6);
}

#[test]
fn test_transfer_rejects_regime_mismatch_but_inherits_when_unset() {
    let mut store = LedgerStore::default();
    store.insert_fund(flat_fund(1, 1.0));
    let user = UserId(1);
    let source = setup_cert(&mut store, user, PlanType::Pgbl, FundId(1));
    let dest = setup_cert(&mut store, user, PlanType::Pgbl, FundId(1));
    seed_contribution(&mut store, source, FundId(1), date(2025, 1, 1), 100.0);
    store.certificate_mut(source).unwrap().tax_regime = Some(TaxRegime::Regressive);

    // Conflicting elections: refused
    store.certificate_mut(dest).unwrap().tax_regime = Some(TaxRegime::Progressive);
    let req = store.submit_request(
        user,
        Some(source),
        RequestKind::TransferInternal {
            destination: dest,
            amount: 50.0,
        },
    );
    evolve(&mut store, 1);
    assert_eq!(store.request(req).unwrap().status, RequestStatus::Failed);

    // Unset destination: inherits the source's election
    store.certificate_mut(dest).unwrap().tax_regime = None;
    store.submit_request(
        user,
        Some(source),
        RequestKind::TransferInternal {
            destination: dest,
            amount: 50.0,
        },
    );
    evolve(&mut store, 1);
    assert_eq!(
        store.certificate(dest).unwrap().tax_regime,
        Some(TaxRegime::Regressive)
    );
}

/// Both endpoints of an internal transfer must belong to the requester.
#[test]
fn test_internal_transfer_requires_destination_ownership() {
    let mut store = LedgerStore::default();
    store.insert_fund(flat_fund(1, 1.0));
    let user = UserId(1);
    let other = UserId(2);
    let source = setup_cert(&mut store, user, PlanType::Pgbl, FundId(1));
    let dest = setup_cert(&mut store, other, PlanType::Pgbl, FundId(1));
    seed_contribution(&mut store, source, FundId(1), date(2025, 1, 1), 100.0);

    let req = store.submit_request(
        user,
        Some(source),
        RequestKind::TransferInternal {
            destination: dest,
            amount: 50.0,
        },
    );
    evolve(&mut store, 1);

    assert_eq!(store.request(req).unwrap().status, RequestStatus::Failed);
    assert!(store.lots_fifo(dest).is_empty());
}

/// Legacy portability defaults to the full source value and settles the
/// paired `portability_in` marker on the destination.
#[test]
fn test_portability_completes_paired_marker() {
    let mut store = LedgerStore::default();
    store.insert_fund(flat_fund(1, 1.0));
    let user = UserId(1);
    let source = setup_cert(&mut store, user, PlanType::Pgbl, FundId(1));
    let dest = setup_cert(&mut store, user, PlanType::Pgbl, FundId(1));
    seed_contribution(&mut store, source, FundId(1), date(2024, 1, 1), 500.0);

    let in_req = store.submit_request(
        user,
        Some(dest),
        RequestKind::PortabilityIn { source },
    );
    let out_req = store.submit_request(
        user,
        Some(source),
        RequestKind::PortabilityOut {
            destination: dest,
            amount: None,
        },
    );
    evolve(&mut store, 1);

    assert_eq!(store.request(out_req).unwrap().status, RequestStatus::Completed);
    assert_eq!(store.request(in_req).unwrap().status, RequestStatus::Completed);
    assert!((valuation::total_value(&store, dest) - 500.0).abs() < 1e-6);
    assert_eq!(store.certificate(source).unwrap().unit_supply, 0.0);
}

/// A lone `portability_in` marker survives the drain untouched.
#[test]
fn test_portability_in_marker_is_not_drained() {
    let mut store = LedgerStore::default();
    store.insert_fund(flat_fund(1, 1.0));
    let user = UserId(1);
    let dest = setup_cert(&mut store, user, PlanType::Pgbl, FundId(1));
    let orphan_source = setup_cert(&mut store, user, PlanType::Pgbl, FundId(1));

    let in_req = store.submit_request(
        user,
        Some(dest),
        RequestKind::PortabilityIn {
            source: orphan_source,
        },
    );
    evolve(&mut store, 2);
    assert_eq!(store.request(in_req).unwrap().status, RequestStatus::Pending);
}

/// External port-out: value leaves the simulation. Supply and premium
/// shrink and nothing is credited anywhere.
#[test]
fn test_external_out_removes_value_from_simulation() {
    let mut store = LedgerStore::default();
    store.insert_fund(flat_fund(1, 1.0));
    let user = UserId(1);
    let cert = setup_cert(&mut store, user, PlanType::Vgbl, FundId(1));
    seed_contribution(&mut store, cert, FundId(1), date(2024, 1, 1), 1_000.0);

    store.submit_request(
        user,
        Some(cert),
        RequestKind::TransferExternalOut {
            institution: "Acme Previdência".to_string(),
            amount: 400.0,
        },
    );
    evolve(&mut store, 1);

    assert!((store.certificate(cert).unwrap().unit_supply - 600.0).abs() < 1e-6);
    assert!((store.certificate(cert).unwrap().premium_remaining - 600.0).abs() < 1e-6);
    assert!((valuation::total_value(&store, cert) - 600.0).abs() < 1e-6);
    assert_eq!(store.brokerage_cash(user), 0.0);
    assert_conserved(&store, cert);
}

/// External port-in: backdated tranche lots per the configured schedule,
/// all priced at one pre-captured unit price, premium reduced by the
/// embedded-gain fraction.
#[test]
fn test_external_in_creates_backdated_tranches() {
    let mut store = LedgerStore::default();
    store.insert_fund(flat_fund(1, 1.0));
    let user = UserId(1);
    let cert = setup_cert(&mut store, user, PlanType::Vgbl, FundId(1));

    store.submit_request(
        user,
        Some(cert),
        RequestKind::TransferExternalIn {
            institution: "Acme Previdência".to_string(),
            amount: 1_000.0,
        },
    );
    evolve(&mut store, 1);

    // Execution date 2026-02-01; default schedule 30%/1y, 30%/5y, 40%/11y
    let lots = store.lots_fifo(cert);
    assert_eq!(lots.len(), 3);
    assert_eq!(lots[0].date, date(2015, 2, 1));
    assert_eq!(lots[1].date, date(2021, 2, 1));
    assert_eq!(lots[2].date, date(2025, 2, 1));
    assert!((lots[2].gross_amount - 300.0).abs() < 1e-6);
    assert!((lots[0].gross_amount - 400.0).abs() < 1e-6);

    // Cost basis carries only the premium fraction (default 0.80)
    assert!((lots[0].remaining_amount - 320.0).abs() < 1e-6);
    let premium = store.certificate(cert).unwrap().premium_remaining;
    assert!((premium - 800.0).abs() < 1e-6, "premium {premium}");

    // Full amount invested per the allocation
    assert!((valuation::total_value(&store, cert) - 1_000.0).abs() < 1e-6);
    assert_conserved(&store, cert);

    // Aged tranches already sit in lower regressive brackets
    let estimate = crate::taxes::estimate_withdrawal(&store, cert, 1_000.0).unwrap();
    let lines = estimate.regressive.unwrap().lines;
    assert_eq!(lines[0].rate, 0.10); // 11 years back
    assert_eq!(lines[1].rate, 0.25); // 5 years back
    assert_eq!(lines[2].rate, 0.35); // 1 year back
}

/// Port-in without a target allocation is refused up front: money cannot
/// be invested without a routing table.
#[test]
fn test_inflows_require_target_allocation() {
    let mut store = LedgerStore::default();
    store.insert_fund(flat_fund(1, 1.0));
    let user = UserId(1);
    let cert = store.create_certificate(user, PlanType::Vgbl, store.clock.date);
    store.set_brokerage_cash(user, 1_000.0);

    let contribution = store.submit_request(
        user,
        Some(cert),
        RequestKind::Contribution {
            amount: 500.0,
            tax_regime: None,
        },
    );
    let port_in = store.submit_request(
        user,
        Some(cert),
        RequestKind::TransferExternalIn {
            institution: "Acme".to_string(),
            amount: 500.0,
        },
    );
    evolve(&mut store, 1);

    assert_eq!(
        store.request(contribution).unwrap().status,
        RequestStatus::Failed
    );
    assert_eq!(store.request(port_in).unwrap().status, RequestStatus::Failed);
    assert_eq!(store.brokerage_cash(user), 1_000.0);
    assert!(store.lots_fifo(cert).is_empty());
}
