//! Investment funds and their NAV evolution
//!
//! A fund's NAV moves only when the scheduler advances a month. The monthly
//! return series repeats cyclically, so a 12-entry series describes a
//! stationary yearly pattern that can drive an arbitrarily long simulation.

use serde::{Deserialize, Serialize};

use super::ids::FundId;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fund {
    pub fund_id: FundId,
    pub name: String,
    pub initial_nav: f64,
    pub current_nav: f64,
    /// Monthly return series, cycled by the scheduler. May be empty, in
    /// which case the NAV never moves.
    pub monthly_returns: Vec<f64>,
}

impl Fund {
    pub fn new(fund_id: FundId, name: impl Into<String>, initial_nav: f64) -> Self {
        Self {
            fund_id,
            name: name.into(),
            initial_nav,
            current_nav: initial_nav,
            monthly_returns: Vec::new(),
        }
    }

    pub fn with_returns(mut self, monthly_returns: Vec<f64>) -> Self {
        self.monthly_returns = monthly_returns;
        self
    }

    /// Return for a given simulation month (1-based), cycling the series.
    pub fn return_for_month(&self, month: u32) -> Option<f64> {
        if self.monthly_returns.is_empty() {
            return None;
        }
        let idx = ((month.saturating_sub(1)) as usize) % self.monthly_returns.len();
        Some(self.monthly_returns[idx])
    }

    /// Compound one month of returns into the NAV. Returns `(old, new, rate)`
    /// or `None` when the fund has no return series.
    pub fn step_nav(&mut self, month: u32) -> Option<(f64, f64, f64)> {
        let rate = self.return_for_month(month)?;
        let old = self.current_nav;
        self.current_nav = old * (1.0 + rate);
        Some((old, self.current_nav, rate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_returns_cycle() {
        let fund =
            Fund::new(FundId(1), "Cycler", 1.0).with_returns(vec![0.01, 0.02, 0.03]);
        assert_eq!(fund.return_for_month(1), Some(0.01));
        assert_eq!(fund.return_for_month(3), Some(0.03));
        assert_eq!(fund.return_for_month(4), Some(0.01));
        assert_eq!(fund.return_for_month(7), Some(0.03));
    }

    #[test]
    fn test_nav_compounds() {
        let mut fund = Fund::new(FundId(1), "Growth", 2.0).with_returns(vec![0.10]);
        let (old, new, rate) = fund.step_nav(1).unwrap();
        assert_eq!(old, 2.0);
        assert!((new - 2.2).abs() < 1e-12);
        assert_eq!(rate, 0.10);
        let (_, new2, _) = fund.step_nav(2).unwrap();
        assert!((new2 - 2.42).abs() < 1e-12);
    }

    #[test]
    fn test_no_series_no_movement() {
        let mut fund = Fund::new(FundId(1), "Flat", 1.5);
        assert!(fund.step_nav(1).is_none());
        assert_eq!(fund.current_nav, 1.5);
    }
}
