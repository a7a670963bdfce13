//! Scenario files: the driver's serde-shaped view of a ledger store
//!
//! A scenario describes the starting world: funds with their return
//! series, users with brokerage cash, certificates with target
//! allocations, and an optional initial batch of pending requests. The
//! engine's own types carry the serde impls; this module only adds the
//! `Vec`-shaped wrapping a hand-written JSON file wants.

use jiff::civil::Date;
use serde::Deserialize;

use previsim_core::LedgerStore;
use previsim_core::model::{
    AllocationSet, Certificate, CertificateId, EngineConfig, Fund, FundId, Phase, PlanType,
    RequestKind, TaxRegime, UserId,
};

#[derive(Debug, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub config: EngineConfig,
    /// Clock start; defaults to the engine's 2026-01-01 origin.
    #[serde(default)]
    pub start_date: Option<Date>,
    pub funds: Vec<FundSpec>,
    #[serde(default)]
    pub users: Vec<UserSpec>,
    #[serde(default)]
    pub certificates: Vec<CertificateSpec>,
    #[serde(default)]
    pub requests: Vec<RequestSpec>,
}

#[derive(Debug, Deserialize)]
pub struct FundSpec {
    pub id: u32,
    pub name: String,
    pub initial_nav: f64,
    #[serde(default)]
    pub monthly_returns: Vec<f64>,
}

#[derive(Debug, Deserialize)]
pub struct UserSpec {
    pub id: u32,
    #[serde(default)]
    pub brokerage_cash: f64,
    /// Declared non-deductible contributions at other issuers, per year.
    #[serde(default)]
    pub declared_external: Vec<(i16, f64)>,
}

#[derive(Debug, Deserialize)]
pub struct CertificateSpec {
    pub id: u32,
    pub user_id: u32,
    pub plan_type: PlanType,
    #[serde(default)]
    pub tax_regime: Option<TaxRegime>,
    #[serde(default)]
    pub allocation: Option<AllocationSet>,
}

#[derive(Debug, Deserialize)]
pub struct RequestSpec {
    pub user_id: u32,
    #[serde(default)]
    pub certificate_id: Option<u32>,
    #[serde(flatten)]
    pub kind: RequestKind,
}

impl Scenario {
    pub fn build(self) -> color_eyre::Result<LedgerStore> {
        self.config.validate()?;
        let mut store = LedgerStore::new(self.config);
        if let Some(start_date) = self.start_date {
            store.clock.date = start_date;
        }

        for fund in self.funds {
            store.insert_fund(
                Fund::new(FundId(fund.id), fund.name, fund.initial_nav)
                    .with_returns(fund.monthly_returns),
            );
        }

        for user in self.users {
            let user_id = UserId(user.id);
            store.set_brokerage_cash(user_id, user.brokerage_cash);
            for (year, amount) in user.declared_external {
                store.set_declared_external(user_id, year, amount);
            }
        }

        let created_date = store.clock.date;
        for spec in self.certificates {
            let certificate_id = CertificateId(spec.id);
            let mut certificate = Certificate::new(
                certificate_id,
                UserId(spec.user_id),
                spec.plan_type,
                created_date,
            );
            certificate.tax_regime = spec.tax_regime;
            certificate.phase = Phase::Accumulating;
            store.insert_certificate(certificate);
            if let Some(allocation) = spec.allocation {
                store.set_allocation(certificate_id, allocation);
            }
        }

        for spec in self.requests {
            store.submit_request(
                UserId(spec.user_id),
                spec.certificate_id.map(CertificateId),
                spec.kind,
            );
        }

        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCENARIO: &str = r#"{
        "funds": [
            {"id": 1, "name": "Multimercado", "initial_nav": 1.0, "monthly_returns": [0.01]}
        ],
        "users": [{"id": 1, "brokerage_cash": 5000.0}],
        "certificates": [
            {"id": 1, "user_id": 1, "plan_type": "Vgbl",
             "allocation": [{"fund_id": 1, "pct": 100.0}]}
        ],
        "requests": [
            {"user_id": 1, "certificate_id": 1, "type": "Contribution",
             "amount": 1000.0, "tax_regime": null}
        ]
    }"#;

    #[test]
    fn test_scenario_round_trip_builds_store() {
        let scenario: Scenario = serde_json::from_str(SCENARIO).unwrap();
        let mut store = scenario.build().unwrap();
        assert!(store.fund(FundId(1)).is_some());
        assert_eq!(store.brokerage_cash(UserId(1)), 5000.0);

        let log = previsim_core::evolve(&mut store, 1);
        assert_eq!(log.len(), 1);
        assert_eq!(store.brokerage_cash(UserId(1)), 4000.0);
    }

    #[test]
    fn test_invalid_allocation_rejected_at_parse_time() {
        let bad = SCENARIO.replace("\"pct\": 100.0", "\"pct\": 90.0");
        assert!(serde_json::from_str::<Scenario>(&bad).is_err());
    }
}
