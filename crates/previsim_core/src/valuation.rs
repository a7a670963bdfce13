//! Certificate valuation
//!
//! A certificate's value is the sum of its fund holdings at current NAV.
//! Dividing by the unit supply gives the certificate's own unit price, a
//! pooled NAV that is independent of which underlying funds it holds.
//! Lots are issued and redeemed at this price, which is what makes
//! FIFO-by-units economically correct across a shifting fund mix.

use crate::model::CertificateId;
use crate::store::LedgerStore;

/// Price at which the first lot of an empty certificate is issued.
pub const BOOTSTRAP_UNIT_PRICE: f64 = 1.0;

/// Unit supplies below this are treated as an empty certificate.
pub const SUPPLY_EPS: f64 = 1e-9;

/// Total market value: Σ holdings units × fund NAV. Zero if no holdings.
pub fn total_value(store: &LedgerStore, certificate_id: CertificateId) -> f64 {
    store
        .holdings(certificate_id)
        .iter()
        .map(|(fund_id, units)| {
            let nav = store.fund(*fund_id).map(|f| f.current_nav).unwrap_or(0.0);
            units * nav
        })
        .sum()
}

/// Certificate unit price: `total_value / unit_supply`, or the bootstrap
/// price of 1.0 while the certificate has no units outstanding.
pub fn unit_price(store: &LedgerStore, certificate_id: CertificateId) -> f64 {
    let supply = store
        .certificate(certificate_id)
        .map(|c| c.unit_supply)
        .unwrap_or(0.0);
    if supply <= SUPPLY_EPS {
        return BOOTSTRAP_UNIT_PRICE;
    }
    total_value(store, certificate_id) / supply
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Fund, FundId, PlanType, UserId};

    #[test]
    fn test_total_value_sums_across_funds() {
        let mut store = LedgerStore::default();
        store.insert_fund(Fund::new(FundId(1), "A", 2.0));
        store.insert_fund(Fund::new(FundId(2), "B", 5.0));
        let cert = store.create_certificate(UserId(1), PlanType::Pgbl, store.clock.date);
        store.set_holding(cert, FundId(1), 10.0); // 20.00
        store.set_holding(cert, FundId(2), 4.0); // 20.00
        assert!((total_value(&store, cert) - 40.0).abs() < 1e-9);
    }

    #[test]
    fn test_unit_price_bootstraps_to_one() {
        let mut store = LedgerStore::default();
        let cert = store.create_certificate(UserId(1), PlanType::Vgbl, store.clock.date);
        assert_eq!(unit_price(&store, cert), BOOTSTRAP_UNIT_PRICE);
    }

    #[test]
    fn test_unit_price_is_value_over_supply() {
        let mut store = LedgerStore::default();
        store.insert_fund(Fund::new(FundId(1), "A", 3.0));
        let cert = store.create_certificate(UserId(1), PlanType::Pgbl, store.clock.date);
        store.set_holding(cert, FundId(1), 100.0); // value 300
        store.certificate_mut(cert).unwrap().unit_supply = 150.0;
        assert!((unit_price(&store, cert) - 2.0).abs() < 1e-12);
    }
}
