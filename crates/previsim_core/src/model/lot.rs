//! Cost-basis lots: the unit of FIFO tax aging
//!
//! A lot is a dated, partially-consumable slice of contributed capital.
//! Consumption shrinks `units_remaining` and `remaining_amount` jointly
//! (cost basis follows units); both counters hit exact zero together.

use jiff::civil::Date;
use serde::{Deserialize, Serialize};

use super::ids::{CertificateId, LotId};

/// Where a lot's capital came from. Only direct contributions count toward
/// the excise-tax base; transfers and portabilities are exempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LotSource {
    Contribution,
    TransferInternal,
    TransferExternal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lot {
    pub lot_id: LotId,
    pub certificate_id: CertificateId,
    /// Issue date. Transfers preserve the original date so tax aging
    /// survives the move; external port-ins are backdated per schedule.
    pub date: Date,
    pub source: LotSource,
    pub gross_amount: f64,
    /// Amount actually invested after any excise withholding.
    pub net_amount: f64,
    /// Shrinking cost-basis counter, <= gross_amount, monotone non-increasing.
    pub remaining_amount: f64,
    pub units_total: f64,
    /// Shrinking unit counter, <= units_total, monotone non-increasing.
    pub units_remaining: f64,
    /// Certificate unit price at issue, captured before the money was added.
    pub issue_unit_price: f64,
}

impl Lot {
    pub fn is_exhausted(&self) -> bool {
        self.units_remaining <= 0.0 && self.remaining_amount <= 0.0
    }
}
