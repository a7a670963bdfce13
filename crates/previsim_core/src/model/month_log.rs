//! Structured per-month event log
//!
//! Every month the scheduler processes produces one `MonthLog`: the fund
//! NAV deltas followed by one entry per executed or failed request. The
//! log is the engine's only output channel; front ends render it, tests
//! assert on it.

use std::fmt;

use jiff::civil::Date;
use serde::{Deserialize, Serialize};

use super::certificate::TaxRegime;
use super::ids::{CertificateId, FundId, RequestId, UserId};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EngineEvent {
    NavUpdated {
        fund_id: FundId,
        name: String,
        old_nav: f64,
        new_nav: f64,
        monthly_return: f64,
    },
    ContributionExecuted {
        request_id: RequestId,
        certificate_id: CertificateId,
        gross: f64,
        excise_tax: f64,
        net_invested: f64,
        units_issued: f64,
        unit_price: f64,
    },
    WithdrawalExecuted {
        request_id: RequestId,
        certificate_id: CertificateId,
        gross: f64,
        tax: f64,
        net: f64,
        regime: TaxRegime,
        /// Advisory marginal-bracket estimate under the progressive
        /// regime; the flat withholding is what was actually collected.
        estimated_final_tax: Option<f64>,
    },
    FundSwapExecuted {
        request_id: RequestId,
        certificate_id: CertificateId,
        reallocated: f64,
    },
    TransferExecuted {
        request_id: RequestId,
        source: CertificateId,
        destination: CertificateId,
        amount: f64,
        premium_moved: f64,
        legacy_portability: bool,
    },
    ExternalTransferOutExecuted {
        request_id: RequestId,
        certificate_id: CertificateId,
        amount: f64,
        institution: String,
    },
    ExternalTransferInExecuted {
        request_id: RequestId,
        certificate_id: CertificateId,
        amount: f64,
        institution: String,
        /// `(lot date, tranche amount)` per backdated lot created.
        tranches: Vec<(Date, f64)>,
    },
    BrokerageWithdrawalExecuted {
        request_id: RequestId,
        user_id: UserId,
        amount: f64,
    },
    RequestFailed {
        request_id: RequestId,
        kind: String,
        reason: String,
        /// True when the failure was an engine defect, not bad input.
        defect: bool,
    },
    /// The cached unit supply diverged from the lots and was rewritten.
    /// Presence of this event signals an executor bug worth alerting on.
    SupplyReconciled {
        certificate_id: CertificateId,
        old_supply: f64,
        new_supply: f64,
    },
}

impl fmt::Display for EngineEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineEvent::NavUpdated {
                name,
                old_nav,
                new_nav,
                monthly_return,
                ..
            } => write!(
                f,
                "Fund '{name}': NAV {old_nav:.4} -> {new_nav:.4} ({:+.2}%)",
                monthly_return * 100.0
            ),
            EngineEvent::ContributionExecuted {
                certificate_id,
                gross,
                excise_tax,
                net_invested,
                units_issued,
                unit_price,
                ..
            } => {
                write!(
                    f,
                    "Contribution to certificate #{}: R${gross:.2} invested",
                    certificate_id.0
                )?;
                if *excise_tax > 0.0 {
                    write!(f, ", IOF R${excise_tax:.2}, net R${net_invested:.2}")?;
                }
                write!(
                    f,
                    ", {units_issued:.4} units issued at R${unit_price:.4}/unit"
                )
            }
            EngineEvent::WithdrawalExecuted {
                certificate_id,
                gross,
                tax,
                net,
                ..
            } => write!(
                f,
                "Withdrawal from certificate #{}: gross R${gross:.2}, tax R${tax:.2}, net R${net:.2} -> brokerage",
                certificate_id.0
            ),
            EngineEvent::FundSwapExecuted {
                certificate_id,
                reallocated,
                ..
            } => write!(
                f,
                "Fund swap completed for certificate #{} (R${reallocated:.2} reallocated)",
                certificate_id.0
            ),
            EngineEvent::TransferExecuted {
                source,
                destination,
                amount,
                legacy_portability,
                ..
            } => {
                let label = if *legacy_portability {
                    "Portability"
                } else {
                    "Internal transfer"
                };
                write!(
                    f,
                    "{label}: R${amount:.2} from certificate #{} to #{} (lots moved FIFO, dates preserved)",
                    source.0, destination.0
                )
            }
            EngineEvent::ExternalTransferOutExecuted {
                certificate_id,
                amount,
                institution,
                ..
            } => write!(
                f,
                "External transfer-out: R${amount:.2} from certificate #{} to {institution}",
                certificate_id.0
            ),
            EngineEvent::ExternalTransferInExecuted {
                certificate_id,
                amount,
                institution,
                tranches,
                ..
            } => write!(
                f,
                "External transfer-in: R${amount:.2} to certificate #{} from {institution} ({} backdated lots)",
                certificate_id.0,
                tranches.len()
            ),
            EngineEvent::BrokerageWithdrawalExecuted {
                user_id, amount, ..
            } => write!(
                f,
                "Brokerage withdrawal: R${amount:.2} removed from user #{}'s account",
                user_id.0
            ),
            EngineEvent::RequestFailed {
                request_id,
                kind,
                reason,
                defect,
            } => {
                let marker = if *defect { " [DEFECT]" } else { "" };
                write!(f, "Request #{} ({kind}) FAILED{marker}: {reason}", request_id.0)
            }
            EngineEvent::SupplyReconciled {
                certificate_id,
                old_supply,
                new_supply,
            } => write!(
                f,
                "Certificate #{}: unit supply reconciled {old_supply} -> {new_supply}",
                certificate_id.0
            ),
        }
    }
}

/// Everything that happened in one simulated month.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonthLog {
    pub month: u32,
    pub date: Date,
    pub events: Vec<EngineEvent>,
}
