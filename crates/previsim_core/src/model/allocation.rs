//! Target allocations: how new money is routed into funds
//!
//! Percentages are validated when the set is constructed, never at read
//! time: an `AllocationSet` that exists is guaranteed to sum to 100
//! within tolerance, and buys normalize it to exact fractions so stored
//! drift never leaks into holdings.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

use super::ids::FundId;

/// Tolerance on the percentage sum at the write boundary.
pub const ALLOCATION_SUM_TOLERANCE: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TargetAllocation {
    pub fund_id: FundId,
    pub pct: f64,
}

/// A validated set of target allocations for one certificate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<TargetAllocation>", into = "Vec<TargetAllocation>")]
pub struct AllocationSet {
    entries: Vec<TargetAllocation>,
}

impl AllocationSet {
    /// Build a validated set. Entries with zero percentage are dropped;
    /// the survivors must each lie in (0, 100] and sum to 100 ± 0.01.
    pub fn new(entries: Vec<TargetAllocation>) -> Result<Self, ConfigError> {
        let entries: Vec<TargetAllocation> =
            entries.into_iter().filter(|a| a.pct != 0.0).collect();
        if entries.is_empty() {
            return Err(ConfigError::EmptyAllocation);
        }
        for entry in &entries {
            if !(entry.pct > 0.0 && entry.pct <= 100.0) {
                return Err(ConfigError::PercentageOutOfRange(entry.pct));
            }
        }
        let sum: f64 = entries.iter().map(|a| a.pct).sum();
        if (sum - 100.0).abs() > ALLOCATION_SUM_TOLERANCE {
            return Err(ConfigError::AllocationSumNot100(sum));
        }
        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[TargetAllocation] {
        &self.entries
    }

    /// Fractions normalized to sum exactly 1.0, absorbing any stored drift
    /// within the write tolerance.
    pub fn normalized(&self) -> Vec<(FundId, f64)> {
        let sum: f64 = self.entries.iter().map(|a| a.pct).sum();
        self.entries
            .iter()
            .map(|a| (a.fund_id, a.pct / sum))
            .collect()
    }
}

impl TryFrom<Vec<TargetAllocation>> for AllocationSet {
    type Error = ConfigError;

    fn try_from(entries: Vec<TargetAllocation>) -> Result<Self, Self::Error> {
        AllocationSet::new(entries)
    }
}

impl From<AllocationSet> for Vec<TargetAllocation> {
    fn from(set: AllocationSet) -> Self {
        set.entries
    }
}
