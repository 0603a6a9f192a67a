use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::assumptions::Assumptions;
use super::debt::NetInterest;
use crate::types::{period_label, safe_divide, Money, Rate};

/// Income statement for a single period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncomeStatementPeriod {
    pub period: usize,
    pub label: String,
    pub revenue: Money,
    pub revenue_growth: Rate,
    pub cogs: Money,
    pub gross_profit: Money,
    pub gross_margin: Rate,
    pub sga: Money,
    pub sga_pct: Rate,
    pub rnd: Money,
    pub ebitda: Money,
    pub ebitda_margin: Rate,
    pub depreciation_amortization: Money,
    pub ebit: Money,
    pub ebit_margin: Rate,
    pub interest_expense: Money,
    pub interest_income: Money,
    pub net_interest: Money,
    pub ebt: Money,
    pub taxable_income: Money,
    pub taxes: Money,
    pub effective_tax_rate: Rate,
    pub net_income: Money,
    pub net_margin: Rate,
    pub nol_beginning: Money,
    pub nol_used: Money,
    pub nol_ending: Money,
    pub stock_comp: Money,
    pub shares_outstanding: Decimal,
    pub eps: Money,
}

/// Everything above the interest line for one period.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OperatingLines {
    pub revenue: Money,
    pub revenue_growth: Rate,
    pub cogs: Money,
    pub gross_profit: Money,
    pub gross_margin: Rate,
    pub sga: Money,
    pub sga_pct: Rate,
    pub rnd: Money,
    pub ebitda: Money,
    pub depreciation_amortization: Money,
    pub ebit: Money,
    /// Non-cash, embedded in operating expenses
    pub stock_comp: Money,
}

impl OperatingLines {
    pub fn opex(&self) -> Money {
        self.sga + self.rnd
    }
}

/// Result of taxing one period's pre-tax income against the NOL pool.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TaxOutcome {
    pub taxable_income: Money,
    pub tax: Money,
    pub nol_used: Money,
    pub nol_remaining: Money,
}

/// The single D&A driver shared by the income statement and the PP&E
/// schedule: historical D&A at period 0, `revenue × da_pct` afterwards.
pub fn depreciation_for_period(a: &Assumptions, period: usize, revenue: Money) -> Money {
    if period == 0 {
        a.historical.depreciation_amortization
    } else {
        revenue * a.operating.da_pct
    }
}

/// Consume NOLs dollar-for-dollar against positive EBT before levying tax.
/// Losses neither create nor consume NOLs.
pub fn apply_tax(ebt: Money, nol_beginning: Money, tax_rate: Rate) -> TaxOutcome {
    if ebt <= Decimal::ZERO {
        return TaxOutcome {
            taxable_income: Decimal::ZERO,
            tax: Decimal::ZERO,
            nol_used: Decimal::ZERO,
            nol_remaining: nol_beginning,
        };
    }
    let taxable_income = (ebt - nol_beginning).max(Decimal::ZERO);
    let nol_remaining = (nol_beginning - ebt).max(Decimal::ZERO);
    TaxOutcome {
        taxable_income,
        tax: taxable_income * tax_rate,
        nol_used: nol_beginning - nol_remaining,
        nol_remaining,
    }
}

/// Operating lines for `period`. Period 0 reports historical actuals;
/// later periods grow revenue and walk margins along their glide paths.
pub fn project_operating(a: &Assumptions, period: usize, prior_revenue: Money) -> OperatingLines {
    let h = &a.historical;
    let op = &a.operating;
    let n = a.projection_years;

    if period == 0 {
        let revenue = h.revenue;
        let cogs = revenue * h.cogs_margin;
        let gross_profit = revenue - cogs;
        let ebitda = gross_profit - h.sga - h.rnd;
        let depreciation_amortization = depreciation_for_period(a, 0, revenue);
        return OperatingLines {
            revenue,
            revenue_growth: Decimal::ZERO,
            cogs,
            gross_profit,
            gross_margin: safe_divide(gross_profit, revenue),
            sga: h.sga,
            sga_pct: safe_divide(h.sga, revenue),
            rnd: h.rnd,
            ebitda,
            depreciation_amortization,
            ebit: ebitda - depreciation_amortization,
            stock_comp: Decimal::ZERO,
        };
    }

    let growth = op.revenue_growth_rates[period - 1];
    let revenue = prior_revenue * (Decimal::ONE + growth);
    let gross_margin = op.gross_margin.at(period, n);
    let sga_pct = op.sga_pct.at(period, n);

    let gross_profit = revenue * gross_margin;
    let cogs = revenue * (Decimal::ONE - gross_margin);
    let sga = revenue * sga_pct;
    let rnd = revenue * op.rnd_pct;
    let ebitda = gross_profit - sga - rnd;
    let depreciation_amortization = depreciation_for_period(a, period, revenue);

    OperatingLines {
        revenue,
        revenue_growth: growth,
        cogs,
        gross_profit,
        gross_margin,
        sga,
        sga_pct,
        rnd,
        ebitda,
        depreciation_amortization,
        ebit: ebitda - depreciation_amortization,
        stock_comp: revenue * op.stock_comp_pct,
    }
}

/// Close out a projected period once net interest is known.
pub fn finalize_period(
    period: usize,
    ops: &OperatingLines,
    interest: &NetInterest,
    nol_beginning: Money,
    tax: &TaxOutcome,
    shares: Decimal,
) -> IncomeStatementPeriod {
    let ebt = ops.ebit - interest.net();
    let net_income = ebt - tax.tax;
    build_row(
        period,
        ops,
        interest.expense(),
        interest.interest_income,
        ebt,
        tax.taxable_income,
        tax.tax,
        net_income,
        (nol_beginning, tax.nol_used, tax.nol_remaining),
        shares,
    )
}

/// Period 0: historical interest and net income, tax implied as EBT − NI.
pub fn historical_period(a: &Assumptions, ops: &OperatingLines) -> IncomeStatementPeriod {
    let h = &a.historical;
    let ebt = ops.ebit - h.interest_expense;
    let taxes = ebt - h.net_income;
    let nol = a.tax.nol_carryforward;
    build_row(
        0,
        ops,
        h.interest_expense,
        Decimal::ZERO,
        ebt,
        ebt.max(Decimal::ZERO),
        taxes,
        h.net_income,
        (nol, Decimal::ZERO, nol),
        h.shares_outstanding,
    )
}

#[allow(clippy::too_many_arguments)]
fn build_row(
    period: usize,
    ops: &OperatingLines,
    interest_expense: Money,
    interest_income: Money,
    ebt: Money,
    taxable_income: Money,
    taxes: Money,
    net_income: Money,
    (nol_beginning, nol_used, nol_ending): (Money, Money, Money),
    shares: Decimal,
) -> IncomeStatementPeriod {
    let effective_tax_rate = if ebt > Decimal::ZERO {
        taxes / ebt
    } else {
        Decimal::ZERO
    };
    IncomeStatementPeriod {
        period,
        label: period_label(period),
        revenue: ops.revenue,
        revenue_growth: ops.revenue_growth,
        cogs: ops.cogs,
        gross_profit: ops.gross_profit,
        gross_margin: ops.gross_margin,
        sga: ops.sga,
        sga_pct: ops.sga_pct,
        rnd: ops.rnd,
        ebitda: ops.ebitda,
        ebitda_margin: safe_divide(ops.ebitda, ops.revenue),
        depreciation_amortization: ops.depreciation_amortization,
        ebit: ops.ebit,
        ebit_margin: safe_divide(ops.ebit, ops.revenue),
        interest_expense,
        interest_income,
        net_interest: interest_expense - interest_income,
        ebt,
        taxable_income,
        taxes,
        effective_tax_rate,
        net_income,
        net_margin: safe_divide(net_income, ops.revenue),
        nol_beginning,
        nol_used,
        nol_ending,
        stock_comp: ops.stock_comp,
        shares_outstanding: shares,
        eps: net_income / shares,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::three_statement::assumptions::tests::sample_assumptions;
    use rust_decimal_macros::dec;

    #[test]
    fn test_nol_consumed_before_tax() {
        // EBT 30 against NOL 50: no tax, 20 of NOL left
        let first = apply_tax(dec!(30), dec!(50), dec!(0.25));
        assert_eq!(first.tax, Decimal::ZERO);
        assert_eq!(first.taxable_income, Decimal::ZERO);
        assert_eq!(first.nol_used, dec!(30));
        assert_eq!(first.nol_remaining, dec!(20));

        // EBT 40 against the remaining 20: taxable 20
        let second = apply_tax(dec!(40), first.nol_remaining, dec!(0.25));
        assert_eq!(second.taxable_income, dec!(20));
        assert_eq!(second.tax, dec!(5));
        assert_eq!(second.nol_remaining, Decimal::ZERO);
    }

    #[test]
    fn test_loss_leaves_nol_untouched() {
        let outcome = apply_tax(dec!(-15), dec!(50), dec!(0.25));
        assert_eq!(outcome.tax, Decimal::ZERO);
        assert_eq!(outcome.nol_remaining, dec!(50));
        assert_eq!(outcome.nol_used, Decimal::ZERO);
    }

    #[test]
    fn test_no_nol_full_tax() {
        let outcome = apply_tax(dec!(100), Decimal::ZERO, dec!(0.21));
        assert_eq!(outcome.tax, dec!(21));
        assert_eq!(outcome.taxable_income, dec!(100));
    }

    #[test]
    fn test_historical_operating_lines() {
        let a = sample_assumptions();
        let ops = project_operating(&a, 0, Decimal::ZERO);
        assert_eq!(ops.revenue, dec!(1000));
        assert_eq!(ops.cogs, dec!(650));
        assert_eq!(ops.gross_profit, dec!(350));
        // 350 - 200 - 30
        assert_eq!(ops.ebitda, dec!(120));
        assert_eq!(ops.depreciation_amortization, dec!(40));
        assert_eq!(ops.ebit, dec!(80));
    }

    #[test]
    fn test_year1_revenue_and_margins() {
        let a = sample_assumptions();
        let ops = project_operating(&a, 1, dec!(1000));
        // 1000 * 1.08
        assert_eq!(ops.revenue, dec!(1080));
        // 0.35 + 0.03 * 1/5
        assert_eq!(ops.gross_margin, dec!(0.356));
        // 0.20 - 0.02 * 1/5
        assert_eq!(ops.sga_pct, dec!(0.196));
        assert_eq!(ops.cogs, dec!(1080) * dec!(0.644));
        assert_eq!(ops.rnd, dec!(32.4));
        assert_eq!(ops.depreciation_amortization, dec!(43.2));
        assert_eq!(ops.stock_comp, dec!(10.8));
    }

    #[test]
    fn test_final_year_hits_targets() {
        let a = sample_assumptions();
        let ops = project_operating(&a, 5, dec!(1200));
        assert_eq!(ops.gross_margin, dec!(0.38));
        assert_eq!(ops.sga_pct, dec!(0.18));
    }

    #[test]
    fn test_da_driver_shared() {
        let a = sample_assumptions();
        assert_eq!(depreciation_for_period(&a, 0, dec!(5000)), dec!(40));
        assert_eq!(depreciation_for_period(&a, 2, dec!(1000)), dec!(40));
    }

    #[test]
    fn test_finalize_period_eps() {
        let a = sample_assumptions();
        let ops = project_operating(&a, 1, dec!(1000));
        let interest = NetInterest {
            term_interest: dec!(10),
            revolver_interest: Decimal::ZERO,
            commitment_fee: Decimal::ZERO,
            interest_income: dec!(2),
        };
        let ebt = ops.ebit - dec!(8);
        let tax = apply_tax(ebt, Decimal::ZERO, dec!(0.25));
        let row = finalize_period(1, &ops, &interest, Decimal::ZERO, &tax, dec!(100));

        assert_eq!(row.label, "Year 1");
        assert_eq!(row.net_interest, dec!(8));
        assert_eq!(row.ebt, ebt);
        assert_eq!(row.net_income, ebt * dec!(0.75));
        assert_eq!(row.eps, row.net_income / dec!(100));
        assert_eq!(row.effective_tax_rate, dec!(0.25));
    }

    #[test]
    fn test_historical_period_implied_tax() {
        let a = sample_assumptions();
        let ops = project_operating(&a, 0, Decimal::ZERO);
        let row = historical_period(&a, &ops);
        assert_eq!(row.label, "Historical");
        // EBIT 80 - interest 12 = 68; NI 60 => tax 8
        assert_eq!(row.ebt, dec!(68));
        assert_eq!(row.taxes, dec!(8));
        assert_eq!(row.net_income, dec!(60));
        assert_eq!(row.eps, dec!(0.6));
    }
}
