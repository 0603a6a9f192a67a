use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::ModelError;
use crate::types::Rate;
use crate::ModelResult;

/// How the revolver / interest / cash loop is resolved within a period.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircularityMode {
    /// One deterministic pass: interest from beginning-of-period balances,
    /// interest income on cash recognised one period later.
    #[default]
    SinglePass,
    /// Re-run the period until net interest moves by less than `tolerance`.
    Iterative {
        max_iterations: u32,
        tolerance: Decimal,
    },
}

impl CircularityMode {
    /// Strict mode with the standard bounds (3 iterations, 1e-6).
    pub fn iterative() -> Self {
        Self::iterative_with(3)
    }

    pub fn iterative_with(max_iterations: u32) -> Self {
        CircularityMode::Iterative {
            max_iterations,
            tolerance: dec!(0.000001),
        }
    }
}

/// Engine settings that are not part of the company's assumptions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Absolute tolerance (currency units) for the balance and cash checks
    pub tolerance: Decimal,
    pub circularity: CircularityMode,
    /// Longest projection horizon accepted
    pub max_projection_years: usize,
    /// Treat a cash flow / balance sheet cash disagreement as fatal
    pub fail_on_cash_flow_mismatch: bool,
    pub days_in_year: u32,
    /// Period-0 gross PP&E as a multiple of net PP&E
    pub gross_ppe_multiple: Decimal,
    /// Share of historical paid-in equity assigned to APIC at period 0
    pub apic_share_of_equity: Rate,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            tolerance: dec!(0.01),
            circularity: CircularityMode::SinglePass,
            max_projection_years: 10,
            fail_on_cash_flow_mismatch: true,
            days_in_year: 365,
            gross_ppe_multiple: dec!(1.5),
            apic_share_of_equity: dec!(0.40),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> ModelResult<()> {
        if self.tolerance <= Decimal::ZERO {
            return Err(config_error("tolerance", "Tolerance must be positive"));
        }
        if self.max_projection_years == 0 {
            return Err(config_error(
                "max_projection_years",
                "Horizon must allow at least one projected year",
            ));
        }
        if self.days_in_year == 0 {
            return Err(config_error("days_in_year", "Day count must be positive"));
        }
        if self.gross_ppe_multiple < Decimal::ONE {
            return Err(config_error(
                "gross_ppe_multiple",
                "Gross PP&E cannot be smaller than net PP&E",
            ));
        }
        if self.apic_share_of_equity < Decimal::ZERO || self.apic_share_of_equity > Decimal::ONE {
            return Err(config_error(
                "apic_share_of_equity",
                "Share must be between 0 and 1",
            ));
        }
        if let CircularityMode::Iterative {
            max_iterations,
            tolerance,
        } = self.circularity
        {
            if max_iterations == 0 {
                return Err(config_error(
                    "circularity.max_iterations",
                    "Iterative mode needs at least one iteration",
                ));
            }
            if tolerance <= Decimal::ZERO {
                return Err(config_error(
                    "circularity.tolerance",
                    "Convergence tolerance must be positive",
                ));
            }
        }
        Ok(())
    }
}

fn config_error(field: &str, reason: &str) -> ModelError {
    ModelError::InvalidInput {
        field: format!("config.{field}"),
        reason: reason.into(),
    }
}
