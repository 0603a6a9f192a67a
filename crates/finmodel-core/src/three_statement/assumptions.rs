use std::ops::Deref;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::error::ModelError;
use crate::types::{Money, Rate};
use crate::ModelResult;

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// Everything needed to run an integrated three-statement projection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assumptions {
    pub historical: HistoricalFinancials,
    pub operating: OperatingDrivers,
    pub working_capital: WorkingCapitalDrivers,
    pub debt: DebtTerms,
    pub tax: TaxPolicy,
    pub equity: EquityPolicy,
    /// Number of projected years (N); schedules carry N + 1 periods
    pub projection_years: usize,
}

/// Actuals for the last reported year (period 0).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoricalFinancials {
    pub revenue: Money,
    /// COGS as % of revenue
    pub cogs_margin: Rate,
    pub sga: Money,
    pub rnd: Money,
    pub depreciation_amortization: Money,
    pub interest_expense: Money,
    pub net_income: Money,
    pub total_assets: Money,
    /// Term debt plus any drawn revolver
    pub total_debt: Money,
    pub cash: Money,
    pub total_equity: Money,
    pub shares_outstanding: Decimal,
    pub ppe_net: Money,
    #[serde(default)]
    pub intangibles: Money,
    #[serde(default)]
    pub goodwill: Money,
    #[serde(default)]
    pub other_long_term_assets: Money,
    #[serde(default)]
    pub other_long_term_liabilities: Money,
    #[serde(default)]
    pub common_stock: Money,
}

/// A ratio that moves linearly from `base` (period 0) to `target` (period N).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GlidePath {
    pub base: Rate,
    pub target: Rate,
}

impl GlidePath {
    /// `base + (target - base) * period / horizon`
    pub fn at(&self, period: usize, horizon: usize) -> Rate {
        if horizon == 0 {
            return self.base;
        }
        self.base
            + (self.target - self.base) * Decimal::from(period as u64)
                / Decimal::from(horizon as u64)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperatingDrivers {
    /// Growth rate per projected year
    pub revenue_growth_rates: Vec<Rate>,
    pub gross_margin: GlidePath,
    pub sga_pct: GlidePath,
    /// R&D as % of revenue
    pub rnd_pct: Rate,
    /// D&A as % of revenue
    pub da_pct: Rate,
    /// Capex as % of revenue, per projected year
    pub capex_pct: Vec<Rate>,
    /// Stock-based compensation as % of revenue
    pub stock_comp_pct: Rate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkingCapitalDrivers {
    pub dso_days: u32,
    pub dio_days: u32,
    pub dpo_days: u32,
    pub prepaid_pct_revenue: Rate,
    pub other_current_assets_pct_revenue: Rate,
    /// Accrued liabilities as % of operating expenses (SG&A + R&D)
    pub accrued_pct_opex: Rate,
    pub other_current_liabilities_pct_revenue: Rate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebtTerms {
    pub term_debt_balance: Money,
    pub term_debt_rate: Rate,
    /// Flat principal repayment per year
    pub annual_amortization: Money,
    pub revolver_size: Money,
    pub revolver_rate: Rate,
    /// Fee on the undrawn revolver commitment
    pub commitment_fee_rate: Rate,
    pub minimum_cash: Money,
    pub interest_on_cash_rate: Rate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaxPolicy {
    pub tax_rate: Rate,
    #[serde(default)]
    pub nol_carryforward: Money,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DividendPolicy {
    /// Fixed dividend per share
    PerShare(Money),
    /// Share of positive net income
    PayoutRatio(Rate),
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EquityPolicy {
    pub dividend_policy: DividendPolicy,
    #[serde(default)]
    pub annual_buyback: Money,
}

// ---------------------------------------------------------------------------
// Validated wrapper
// ---------------------------------------------------------------------------

/// Assumptions that passed every range and consistency check. The engine only
/// accepts this type, so validation happens exactly once at the boundary.
#[derive(Debug, Clone)]
pub struct ValidatedAssumptions {
    inner: Assumptions,
    opening_revolver: Money,
}

impl ValidatedAssumptions {
    pub fn new(assumptions: Assumptions, config: &EngineConfig) -> ModelResult<Self> {
        validate_assumptions(&assumptions, config)?;
        let h = &assumptions.historical;
        let d = &assumptions.debt;
        if h.total_debt < d.term_debt_balance {
            return Err(ModelError::FinancialImpossibility(format!(
                "Term debt of {} exceeds the historical total debt of {}",
                d.term_debt_balance, h.total_debt
            )));
        }
        let opening_revolver = h.total_debt - d.term_debt_balance;
        if opening_revolver > d.revolver_size {
            return Err(ModelError::FinancialImpossibility(format!(
                "Historical debt implies a drawn revolver of {opening_revolver}, above the facility size of {}",
                d.revolver_size
            )));
        }
        Ok(ValidatedAssumptions {
            inner: assumptions,
            opening_revolver,
        })
    }

    /// Revolver drawn at period 0: historical debt in excess of term debt.
    pub fn opening_revolver(&self) -> Money {
        self.opening_revolver
    }

    pub fn horizon(&self) -> usize {
        self.inner.projection_years
    }

    pub fn into_inner(self) -> Assumptions {
        self.inner
    }
}

impl Deref for ValidatedAssumptions {
    type Target = Assumptions;

    fn deref(&self) -> &Assumptions {
        &self.inner
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

pub fn validate_assumptions(a: &Assumptions, config: &EngineConfig) -> ModelResult<()> {
    config.validate()?;

    let n = a.projection_years;
    if n == 0 {
        return Err(invalid(
            "projection_years",
            "Must project at least one year".into(),
        ));
    }
    if n > config.max_projection_years {
        return Err(invalid(
            "projection_years",
            format!(
                "Horizon of {n} years exceeds the configured maximum of {}",
                config.max_projection_years
            ),
        ));
    }
    validate_length(
        "operating.revenue_growth_rates",
        a.operating.revenue_growth_rates.len(),
        n,
    )?;
    validate_length("operating.capex_pct", a.operating.capex_pct.len(), n)?;

    let h = &a.historical;
    if h.shares_outstanding <= Decimal::ZERO {
        return Err(invalid(
            "historical.shares_outstanding",
            format!("Share count must be positive, got {}", h.shares_outstanding),
        ));
    }
    if h.total_assets <= Decimal::ZERO {
        return Err(invalid(
            "historical.total_assets",
            format!("Total assets must be positive, got {}", h.total_assets),
        ));
    }
    validate_rate("historical.cogs_margin", h.cogs_margin)?;
    for (field, value) in [
        ("historical.revenue", h.revenue),
        ("historical.sga", h.sga),
        ("historical.rnd", h.rnd),
        ("historical.depreciation_amortization", h.depreciation_amortization),
        ("historical.interest_expense", h.interest_expense),
        ("historical.total_debt", h.total_debt),
        ("historical.cash", h.cash),
        ("historical.ppe_net", h.ppe_net),
        ("historical.intangibles", h.intangibles),
        ("historical.goodwill", h.goodwill),
        ("historical.other_long_term_assets", h.other_long_term_assets),
        (
            "historical.other_long_term_liabilities",
            h.other_long_term_liabilities,
        ),
        ("historical.common_stock", h.common_stock),
    ] {
        validate_non_negative(field, value)?;
    }

    let op = &a.operating;
    for (i, g) in op.revenue_growth_rates.iter().enumerate() {
        if *g <= -Decimal::ONE {
            return Err(invalid(
                "operating.revenue_growth_rates",
                format!("Year {} growth must be greater than -100%, got {g}", i + 1),
            ));
        }
    }
    for (i, c) in op.capex_pct.iter().enumerate() {
        validate_rate(&format!("operating.capex_pct[{i}]"), *c)?;
    }
    validate_rate("operating.gross_margin.base", op.gross_margin.base)?;
    validate_rate("operating.gross_margin.target", op.gross_margin.target)?;
    validate_rate("operating.sga_pct.base", op.sga_pct.base)?;
    validate_rate("operating.sga_pct.target", op.sga_pct.target)?;
    validate_rate("operating.rnd_pct", op.rnd_pct)?;
    validate_rate("operating.da_pct", op.da_pct)?;
    validate_rate("operating.stock_comp_pct", op.stock_comp_pct)?;

    let wc = &a.working_capital;
    validate_rate("working_capital.prepaid_pct_revenue", wc.prepaid_pct_revenue)?;
    validate_rate(
        "working_capital.other_current_assets_pct_revenue",
        wc.other_current_assets_pct_revenue,
    )?;
    validate_rate("working_capital.accrued_pct_opex", wc.accrued_pct_opex)?;
    validate_rate(
        "working_capital.other_current_liabilities_pct_revenue",
        wc.other_current_liabilities_pct_revenue,
    )?;

    let d = &a.debt;
    for (field, value) in [
        ("debt.term_debt_balance", d.term_debt_balance),
        ("debt.annual_amortization", d.annual_amortization),
        ("debt.revolver_size", d.revolver_size),
        ("debt.minimum_cash", d.minimum_cash),
    ] {
        validate_non_negative(field, value)?;
    }
    validate_rate("debt.term_debt_rate", d.term_debt_rate)?;
    validate_rate("debt.revolver_rate", d.revolver_rate)?;
    validate_rate("debt.commitment_fee_rate", d.commitment_fee_rate)?;
    validate_rate("debt.interest_on_cash_rate", d.interest_on_cash_rate)?;

    validate_rate("tax.tax_rate", a.tax.tax_rate)?;
    validate_non_negative("tax.nol_carryforward", a.tax.nol_carryforward)?;

    match a.equity.dividend_policy {
        DividendPolicy::PerShare(dps) => {
            validate_non_negative("equity.dividend_policy.per_share", dps)?
        }
        DividendPolicy::PayoutRatio(ratio) => {
            validate_rate("equity.dividend_policy.payout_ratio", ratio)?
        }
        DividendPolicy::None => {}
    }
    validate_non_negative("equity.annual_buyback", a.equity.annual_buyback)?;

    Ok(())
}

fn validate_length(field: &str, len: usize, expected: usize) -> ModelResult<()> {
    if len != expected {
        return Err(invalid(
            field,
            format!("Expected one entry per projected year ({expected}), got {len}"),
        ));
    }
    Ok(())
}

fn validate_rate(field: &str, value: Rate) -> ModelResult<()> {
    if value < Decimal::ZERO || value > Decimal::ONE {
        return Err(invalid(
            field,
            format!("Rate must be between 0 and 1, got {value}"),
        ));
    }
    Ok(())
}

fn validate_non_negative(field: &str, value: Money) -> ModelResult<()> {
    if value < Decimal::ZERO {
        return Err(invalid(
            field,
            format!("Value must be non-negative, got {value}"),
        ));
    }
    Ok(())
}

fn invalid(field: &str, reason: String) -> ModelError {
    ModelError::InvalidInput {
        field: field.into(),
        reason,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
