//! Engine configuration: tax tables, thresholds, and port-in schedules
//!
//! Brackets and thresholds are configuration, not hard-coded law. Defaults
//! reproduce the 2026 Brazilian rules the simulation models.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// One regressive bracket: the rate applies while the holding period is at
/// most `max_years` whole calendar years.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegressiveBracket {
    pub max_years: i16,
    pub rate: f64,
}

/// One progressive (IRPF monthly) bracket with its linear deduction term.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProgressiveBracket {
    pub up_to: f64,
    pub rate: f64,
    pub deduction: f64,
}

/// Withdrawal tax tables for both regimes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxTables {
    /// Ordered by `max_years` ascending.
    pub regressive_brackets: Vec<RegressiveBracket>,
    /// Rate once every regressive bracket is outgrown.
    pub regressive_floor_rate: f64,
    /// Ordered by `up_to` ascending; last entry uses `f64::INFINITY`.
    pub progressive_brackets: Vec<ProgressiveBracket>,
    /// Flat withholding applied at source under the progressive regime.
    pub withholding_rate: f64,
}

impl Default for TaxTables {
    fn default() -> Self {
        Self {
            regressive_brackets: vec![
                RegressiveBracket { max_years: 2, rate: 0.35 },
                RegressiveBracket { max_years: 4, rate: 0.30 },
                RegressiveBracket { max_years: 6, rate: 0.25 },
                RegressiveBracket { max_years: 8, rate: 0.20 },
                RegressiveBracket { max_years: 10, rate: 0.15 },
            ],
            regressive_floor_rate: 0.10,
            progressive_brackets: vec![
                ProgressiveBracket { up_to: 2_259.20, rate: 0.0, deduction: 0.0 },
                ProgressiveBracket { up_to: 2_826.65, rate: 0.075, deduction: 169.44 },
                ProgressiveBracket { up_to: 3_751.05, rate: 0.15, deduction: 381.44 },
                ProgressiveBracket { up_to: 4_664.68, rate: 0.225, deduction: 662.77 },
                ProgressiveBracket { up_to: f64::INFINITY, rate: 0.275, deduction: 896.00 },
            ],
            withholding_rate: 0.15,
        }
    }
}

/// Excise (IOF) tax on annual non-deductible contribution volume above a
/// threshold. Thresholds can be overridden per calendar year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExciseTaxConfig {
    pub default_threshold: f64,
    pub thresholds_by_year: HashMap<i16, f64>,
    pub rate: f64,
}

impl ExciseTaxConfig {
    pub fn threshold_for_year(&self, year: i16) -> f64 {
        self.thresholds_by_year
            .get(&year)
            .copied()
            .unwrap_or(self.default_threshold)
    }
}

impl Default for ExciseTaxConfig {
    fn default() -> Self {
        Self {
            default_threshold: 600_000.0,
            thresholds_by_year: HashMap::new(),
            rate: 0.05,
        }
    }
}

/// One backdated tranche of an external port-in: `pct` of the ported value
/// becomes a lot dated `years_ago` whole calendar years before the port.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PortInTranche {
    pub pct: f64,
    pub years_ago: i16,
}

/// A validated external port-in schedule; tranche percentages must sum to
/// 100 within the allocation tolerance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<PortInTranche>", into = "Vec<PortInTranche>")]
pub struct PortInSchedule {
    tranches: Vec<PortInTranche>,
}

impl PortInSchedule {
    pub fn new(tranches: Vec<PortInTranche>) -> Result<Self, ConfigError> {
        let tranches: Vec<PortInTranche> =
            tranches.into_iter().filter(|t| t.pct != 0.0).collect();
        if tranches.is_empty() {
            return Err(ConfigError::EmptyAllocation);
        }
        for tranche in &tranches {
            if !(tranche.pct > 0.0 && tranche.pct <= 100.0) {
                return Err(ConfigError::PercentageOutOfRange(tranche.pct));
            }
        }
        let sum: f64 = tranches.iter().map(|t| t.pct).sum();
        if (sum - 100.0).abs() > super::allocation::ALLOCATION_SUM_TOLERANCE {
            return Err(ConfigError::ScheduleSumNot100(sum));
        }
        Ok(Self { tranches })
    }

    pub fn tranches(&self) -> &[PortInTranche] {
        &self.tranches
    }
}

impl Default for PortInSchedule {
    fn default() -> Self {
        Self {
            tranches: vec![
                PortInTranche { pct: 30.0, years_ago: 1 },
                PortInTranche { pct: 30.0, years_ago: 5 },
                PortInTranche { pct: 40.0, years_ago: 11 },
            ],
        }
    }
}

impl TryFrom<Vec<PortInTranche>> for PortInSchedule {
    type Error = ConfigError;

    fn try_from(tranches: Vec<PortInTranche>) -> Result<Self, Self::Error> {
        PortInSchedule::new(tranches)
    }
}

impl From<PortInSchedule> for Vec<PortInTranche> {
    fn from(schedule: PortInSchedule) -> Self {
        schedule.tranches
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub tax_tables: TaxTables,
    pub excise: ExciseTaxConfig,
    pub portin_schedule: PortInSchedule,
    /// Share of externally ported-in value treated as cost basis; the
    /// remainder is assumed to be embedded, already-taxable gain.
    pub portin_premium_fraction: f64,
}

impl EngineConfig {
    /// Validate the free-form fraction field; the percentage-shaped pieces
    /// validate themselves at construction.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.portin_premium_fraction) {
            return Err(ConfigError::FractionOutOfRange(self.portin_premium_fraction));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tax_tables: TaxTables::default(),
            excise: ExciseTaxConfig::default(),
            portin_schedule: PortInSchedule::default(),
            portin_premium_fraction: 0.80,
        }
    }
}
