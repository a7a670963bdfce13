//! Write-only audit rows
//!
//! Appended by the executors, read by reporting layers, never consulted by
//! the engine logic itself.

use jiff::civil::Date;
use serde::{Deserialize, Serialize};

use super::ids::{CertificateId, LotId, RequestId};

/// Which outflow consumed a lot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutflowKind {
    Withdrawal,
    TransferInternal,
    TransferExternalOut,
    PortabilityOut,
}

/// One lot's contribution to one executed outflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LotAllocation {
    pub outflow: OutflowKind,
    pub request_id: RequestId,
    pub lot_id: LotId,
    pub units_consumed: f64,
    /// Cost basis consumed alongside the units.
    pub amount_consumed: f64,
    /// Market value of the consumed units at the captured unit price.
    pub gross_value: f64,
    pub days_held: i32,
    pub tax_rate: f64,
    pub taxable_base: f64,
    pub tax_amount: f64,
}

/// One executed withdrawal, gross to net.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawalRecord {
    pub certificate_id: CertificateId,
    pub request_id: RequestId,
    pub gross_amount: f64,
    pub tax_withheld: f64,
    pub net_amount: f64,
    pub date: Date,
}
