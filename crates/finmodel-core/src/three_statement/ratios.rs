use rust_decimal::{Decimal, MathematicalOps};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use super::balance_sheet::{BalanceSheetPeriod, ReconciliationReport};
use super::cash_flow::CashFlowPeriod;
use super::equity::EquityPeriod;
use super::income_statement::IncomeStatementPeriod;
use crate::types::{period_label, safe_divide, Money, Multiple, Rate};

// ---------------------------------------------------------------------------
// Per-period ratios
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatioPeriod {
    pub period: usize,
    pub label: String,
    // Profitability
    pub gross_margin: Rate,
    pub ebitda_margin: Rate,
    pub ebit_margin: Rate,
    pub net_margin: Rate,
    pub roe: Rate,
    pub roa: Rate,
    pub roic: Rate,
    // Liquidity
    pub current_ratio: Multiple,
    pub quick_ratio: Multiple,
    pub cash_ratio: Multiple,
    // Leverage
    pub debt_to_equity: Multiple,
    pub debt_to_ebitda: Multiple,
    pub net_debt_to_ebitda: Multiple,
    pub interest_coverage: Multiple,
    // Efficiency
    pub asset_turnover: Multiple,
    pub realized_dso: Decimal,
    pub realized_dio: Decimal,
    pub realized_dpo: Decimal,
    // Growth
    pub revenue_growth: Rate,
    pub ebitda_growth: Rate,
    pub net_income_growth: Rate,
    // Per share
    pub eps: Money,
    pub book_value_per_share: Money,
    pub dividends_per_share: Money,
    pub fcf_per_share: Money,
}

pub struct RatioSources<'s> {
    pub income_statement: &'s [IncomeStatementPeriod],
    pub balance_sheet: &'s [BalanceSheetPeriod],
    pub cash_flow: &'s [CashFlowPeriod],
    pub equity: &'s [EquityPeriod],
}

/// Returns on average balances (period 0 uses its own balance); every zero
/// denominator yields 0.
pub fn compute_ratios(
    sources: &RatioSources<'_>,
    tax_rate: Rate,
    days_in_year: u32,
) -> Vec<RatioPeriod> {
    let days = Decimal::from(days_in_year);
    let bs_all = sources.balance_sheet;
    let is_all = sources.income_statement;

    (0..bs_all.len())
        .map(|i| {
            let is = &is_all[i];
            let bs = &bs_all[i];
            let prev_bs = if i == 0 { bs } else { &bs_all[i - 1] };
            let prev_is = if i == 0 { None } else { Some(&is_all[i - 1]) };
            let cf = &sources.cash_flow[i];
            let eq = &sources.equity[i];
            let shares = is.shares_outstanding;

            let debt = total_debt(bs);
            let avg_equity = (bs.total_equity + prev_bs.total_equity) / dec!(2);
            let avg_assets = (bs.total_assets + prev_bs.total_assets) / dec!(2);
            let avg_invested =
                (invested_capital(bs) + invested_capital(prev_bs)) / dec!(2);
            let nopat = is.ebit * (Decimal::ONE - tax_rate);

            RatioPeriod {
                period: i,
                label: period_label(i),
                gross_margin: is.gross_margin,
                ebitda_margin: is.ebitda_margin,
                ebit_margin: is.ebit_margin,
                net_margin: is.net_margin,
                roe: safe_divide(is.net_income, avg_equity),
                roa: safe_divide(is.net_income, avg_assets),
                roic: safe_divide(nopat, avg_invested),
                current_ratio: safe_divide(bs.total_current_assets, bs.total_current_liabilities),
                quick_ratio: safe_divide(
                    bs.cash + bs.accounts_receivable,
                    bs.total_current_liabilities,
                ),
                cash_ratio: safe_divide(bs.cash, bs.total_current_liabilities),
                debt_to_equity: safe_divide(debt, bs.total_equity),
                debt_to_ebitda: safe_divide(debt, is.ebitda),
                net_debt_to_ebitda: safe_divide(debt - bs.cash, is.ebitda),
                interest_coverage: safe_divide(is.ebit, is.interest_expense),
                asset_turnover: safe_divide(is.revenue, avg_assets),
                realized_dso: safe_divide(bs.accounts_receivable, is.revenue) * days,
                realized_dio: safe_divide(bs.inventory, is.cogs) * days,
                realized_dpo: safe_divide(bs.accounts_payable, is.cogs) * days,
                revenue_growth: growth(prev_is.map(|p| p.revenue), is.revenue),
                ebitda_growth: growth(prev_is.map(|p| p.ebitda), is.ebitda),
                net_income_growth: growth(prev_is.map(|p| p.net_income), is.net_income),
                eps: is.eps,
                book_value_per_share: safe_divide(bs.total_equity, shares),
                dividends_per_share: safe_divide(eq.dividends, shares),
                fcf_per_share: safe_divide(cf.free_cash_flow, shares),
            }
        })
        .collect()
}

pub fn total_debt(bs: &BalanceSheetPeriod) -> Money {
    bs.current_portion_of_debt + bs.long_term_debt + bs.revolver
}

fn invested_capital(bs: &BalanceSheetPeriod) -> Money {
    total_debt(bs) + bs.total_equity - bs.cash
}

/// Period-over-period change relative to the size of the prior value.
fn growth(prior: Option<Money>, current: Money) -> Rate {
    match prior {
        Some(p) => safe_divide(current - p, p.abs()),
        None => Decimal::ZERO,
    }
}

// ---------------------------------------------------------------------------
// Summary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectionSummary {
    pub projection_years: usize,
    pub revenue_cagr: Rate,
    pub ebitda_cagr: Rate,
    pub net_income_cagr: Rate,
    pub eps_cagr: Rate,
    pub avg_ebitda_margin: Rate,
    pub avg_net_margin: Rate,
    pub ending_debt_to_ebitda: Multiple,
    pub ending_net_debt_to_ebitda: Multiple,
    pub ending_interest_coverage: Multiple,
    pub cumulative_fcf: Money,
    pub is_balanced: bool,
    pub cash_flow_reconciled: bool,
    pub max_imbalance: Money,
    pub total_cash_plug: Money,
    pub historical_anchor_adjustment: Money,
    pub opening_equity_adjustment: Money,
}

pub fn build_summary(
    income_statement: &[IncomeStatementPeriod],
    ratios: &[RatioPeriod],
    cash_flow: &[CashFlowPeriod],
    reconciliation: &ReconciliationReport,
    cash_flow_reconciled: bool,
) -> ProjectionSummary {
    let years = income_statement.len().saturating_sub(1);
    let n = i32::try_from(years).unwrap_or(i32::MAX);
    let first = income_statement.first();
    let last = income_statement.last();
    let cagr = |f: fn(&IncomeStatementPeriod) -> Money| match (first, last) {
        (Some(a), Some(b)) => compute_cagr(f(a), f(b), n),
        _ => Decimal::ZERO,
    };

    let projected = income_statement.iter().skip(1);
    let years_dec = Decimal::from(years as u64);
    let avg_ebitda_margin = safe_divide(
        projected.clone().map(|p| p.ebitda_margin).sum::<Decimal>(),
        years_dec,
    );
    let avg_net_margin = safe_divide(projected.map(|p| p.net_margin).sum::<Decimal>(), years_dec);

    let ending = ratios.last();

    ProjectionSummary {
        projection_years: years,
        revenue_cagr: cagr(|p| p.revenue),
        ebitda_cagr: cagr(|p| p.ebitda),
        net_income_cagr: cagr(|p| p.net_income),
        eps_cagr: cagr(|p| p.eps),
        avg_ebitda_margin,
        avg_net_margin,
        ending_debt_to_ebitda: ending.map_or(Decimal::ZERO, |r| r.debt_to_ebitda),
        ending_net_debt_to_ebitda: ending.map_or(Decimal::ZERO, |r| r.net_debt_to_ebitda),
        ending_interest_coverage: ending.map_or(Decimal::ZERO, |r| r.interest_coverage),
        cumulative_fcf: cash_flow.iter().map(|c| c.free_cash_flow).sum(),
        is_balanced: reconciliation.is_balanced,
        cash_flow_reconciled,
        max_imbalance: reconciliation.max_imbalance,
        total_cash_plug: reconciliation.total_cash_plug,
        historical_anchor_adjustment: reconciliation.historical_anchor_adjustment,
        opening_equity_adjustment: reconciliation.opening_equity_adjustment,
    }
}

/// Compound annual growth rate: `(ending / beginning)^(1/n) - 1`.
/// Zero when either end is non-positive or the ratio is not representable.
pub fn compute_cagr(beginning: Money, ending: Money, n: i32) -> Rate {
    if beginning <= Decimal::ZERO || ending <= Decimal::ZERO || n <= 0 {
        return Decimal::ZERO;
    }
    let Some(ratio) = ending.checked_div(beginning) else {
        return Decimal::ZERO;
    };
    let n_dec = Decimal::from(n);

    // Log-space root as the initial guess, then refine with Newton's method
    // on x^n = ratio. Every power is checked so extreme ratios cannot overflow.
    let mut x = ratio
        .checked_ln()
        .and_then(|ln| (ln / n_dec).checked_exp())
        .unwrap_or_else(|| Decimal::ONE + (ratio - Decimal::ONE) / n_dec);

    for _ in 0..30 {
        let Some(x_pow_nm1) = checked_pow(x, n - 1) else {
            break;
        };
        let Some(x_pow_n) = x_pow_nm1.checked_mul(x) else {
            break;
        };
        let Some(step) = n_dec
            .checked_mul(x_pow_nm1)
            .filter(|d| !d.is_zero())
            .and_then(|denom| (x_pow_n - ratio).checked_div(denom))
        else {
            break;
        };

        x -= step;
        if x <= Decimal::ZERO {
            x = dec!(0.001);
        }
        if step.abs() < dec!(0.0000000000001) {
            break;
        }
    }

    x - Decimal::ONE
}

/// `base^exp`, or `None` once the product leaves the representable range.
fn checked_pow(base: Decimal, exp: i32) -> Option<Decimal> {
    (0..exp).try_fold(Decimal::ONE, |acc, _| acc.checked_mul(base))
}
