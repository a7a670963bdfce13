//! User-submitted requests and their lifecycle
//!
//! A request is decoded into a typed variant when it is created, not parsed
//! from an opaque payload at execution time. The status machine is
//! `pending → completed | failed | rejected | cancelled`; all four terminal
//! states are final.

use jiff::civil::Date;
use serde::{Deserialize, Serialize};

use super::allocation::AllocationSet;
use super::certificate::TaxRegime;
use super::ids::{CertificateId, RequestId, UserId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RequestKind {
    /// Invest brokerage cash into a certificate.
    Contribution {
        amount: f64,
        /// Optional regime election, applied only if none is set yet.
        tax_regime: Option<TaxRegime>,
    },
    /// Redeem value from a certificate into brokerage cash.
    Withdrawal {
        amount: f64,
        tax_regime: Option<TaxRegime>,
    },
    /// Tax-neutral reallocation of holdings; touches no lots.
    FundSwap { new_allocations: AllocationSet },
    /// Move value between two certificates of the same user.
    TransferInternal {
        destination: CertificateId,
        amount: f64,
    },
    /// Port value out of the simulation to another institution.
    TransferExternalOut {
        institution: String,
        amount: f64,
    },
    /// Port value into the simulation from another institution.
    TransferExternalIn {
        institution: String,
        amount: f64,
    },
    /// Legacy portability between certificates. `None` amount means the
    /// full source value.
    PortabilityOut {
        destination: CertificateId,
        amount: Option<f64>,
    },
    /// Passive marker paired with a `PortabilityOut`; completed when the
    /// matching out-leg executes, never drained directly.
    PortabilityIn { source: CertificateId },
    /// Remove cash from the brokerage account; the money leaves the
    /// simulation.
    BrokerageWithdrawal { amount: f64 },
}

impl RequestKind {
    /// Short label used in event-log lines.
    pub fn label(&self) -> &'static str {
        match self {
            RequestKind::Contribution { .. } => "contribution",
            RequestKind::Withdrawal { .. } => "withdrawal",
            RequestKind::FundSwap { .. } => "fund_swap",
            RequestKind::TransferInternal { .. } => "transfer_internal",
            RequestKind::TransferExternalOut { .. } => "transfer_external_out",
            RequestKind::TransferExternalIn { .. } => "transfer_external_in",
            RequestKind::PortabilityOut { .. } => "portability_out",
            RequestKind::PortabilityIn { .. } => "portability_in",
            RequestKind::BrokerageWithdrawal { .. } => "brokerage_withdrawal",
        }
    }

    /// Whether the scheduler executes this kind directly.
    pub fn is_executable(&self) -> bool {
        !matches!(self, RequestKind::PortabilityIn { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestStatus {
    Pending,
    Completed,
    Failed,
    Rejected,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub request_id: RequestId,
    pub user_id: UserId,
    pub certificate_id: Option<CertificateId>,
    pub kind: RequestKind,
    pub status: RequestStatus,
    pub created_date: Date,
    pub completed_date: Option<Date>,
    /// Human-readable reason recorded on `failed` and `rejected`.
    pub status_reason: Option<String>,
}

impl Request {
    pub fn is_pending(&self) -> bool {
        self.status == RequestStatus::Pending
    }
}
