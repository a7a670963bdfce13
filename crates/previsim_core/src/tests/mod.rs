//! Integration tests for the previsim engine
//!
//! Tests are organized by topic:
//! - `accounting` - unit pricing, FIFO consumption, conservation
//! - `taxes` - regime isolation, bracket boundaries, excise enforcement
//! - `transfers` - internal/external moves and legacy portability
//! - `scheduler` - monthly evolution, ordering, per-request atomicity

mod accounting;
mod transfers;

pub(crate) mod support {
    use jiff::civil::Date;

    use crate::lots;
    use crate::model::{
        AllocationSet, CertificateId, Fund, FundId, LotSource, PlanType, TargetAllocation, UserId,
    };
    use crate::store::LedgerStore;
    use crate::valuation;

    /// A fund whose NAV never moves (explicit 0% return series so the
    /// scheduler still logs it as alive).
    pub fn flat_fund(id: u32, nav: f64) -> Fund {
        Fund::new(FundId(id), format!("Fund {id}"), nav).with_returns(vec![0.0; 12])
    }

    pub fn growth_fund(id: u32, nav: f64, monthly_return: f64) -> Fund {
        Fund::new(FundId(id), format!("Fund {id}"), nav)
            .with_returns(vec![monthly_return; 12])
    }

    /// Certificate with a 100% allocation into one fund.
    pub fn setup_cert(
        store: &mut LedgerStore,
        user: UserId,
        plan_type: PlanType,
        fund: FundId,
    ) -> CertificateId {
        let cert = store.create_certificate(user, plan_type, store.clock.date);
        let allocation = AllocationSet::new(vec![TargetAllocation {
            fund_id: fund,
            pct: 100.0,
        }])
        .unwrap();
        store.set_allocation(cert, allocation);
        cert
    }

    /// Seed a contribution lot directly (bypassing the request queue) so
    /// tests can build backdated histories: lot at the current unit
    /// price, holdings bought at the current NAV, premium tracked for
    /// VGBL.
    pub fn seed_contribution(
        store: &mut LedgerStore,
        cert: CertificateId,
        fund: FundId,
        date: Date,
        amount: f64,
    ) {
        let unit_price = valuation::unit_price(store, cert);
        lots::issue_lot(
            store,
            cert,
            date,
            LotSource::Contribution,
            amount,
            amount,
            amount,
            unit_price,
        )
        .unwrap();
        if store.certificate(cert).unwrap().plan_type == PlanType::Vgbl {
            store.update_premium_remaining(cert, amount);
        }
        let nav = store.fund(fund).unwrap().current_nav;
        let existing = store.holding_units(cert, fund);
        store.set_holding(cert, fund, existing + amount / nav);
    }

    /// Σ lot units must equal the cached supply after every request.
    pub fn assert_conserved(store: &LedgerStore, cert: CertificateId) {
        let supply = store.certificate(cert).unwrap().unit_supply;
        let from_lots: f64 = store
            .lots_fifo(cert)
            .iter()
            .map(|l| l.units_remaining)
            .sum();
        assert!(
            (supply - from_lots).abs() < 1e-6,
            "unit supply {supply} diverged from lot sum {from_lots} for {cert:?}"
        );
    }
}
