use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::balance_sheet::BalanceSheetPeriod;
use super::debt::DebtPeriod;
use super::equity::EquityPeriod;
use super::income_statement::IncomeStatementPeriod;
use super::ppe::PpePeriod;
use super::working_capital::WorkingCapitalPeriod;
use crate::diagnostics::{Diagnostic, DiagnosticCode, Recorder, Severity};
use crate::error::ModelError;
use crate::types::{period_label, Money};
use crate::ModelResult;

/// Indirect-method cash flow statement for a single period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CashFlowPeriod {
    pub period: usize,
    pub label: String,
    // Operating
    pub net_income: Money,
    pub depreciation_amortization: Money,
    pub stock_comp: Money,
    /// Increase in operating current assets (a use of cash when positive)
    pub change_in_operating_current_assets: Money,
    /// Increase in operating current liabilities (a source of cash when positive)
    pub change_in_operating_current_liabilities: Money,
    pub cash_from_operations: Money,
    // Investing
    pub capex: Money,
    pub cash_from_investing: Money,
    // Financing
    pub term_debt_repayment: Money,
    pub revolver_net_change: Money,
    pub dividends: Money,
    pub buybacks: Money,
    pub cash_from_financing: Money,
    pub net_cash_change: Money,
    pub beginning_cash: Money,
    pub ending_cash: Money,
    pub balance_sheet_cash: Money,
    /// `ending_cash - balance_sheet_cash`
    pub discrepancy: Money,
    pub free_cash_flow: Money,
    pub free_cash_flow_to_equity: Money,
}

/// The schedules a cash flow statement is derived from, all reconciled.
pub struct CashFlowSources<'s> {
    pub income_statement: &'s [IncomeStatementPeriod],
    pub working_capital: &'s [WorkingCapitalPeriod],
    pub ppe: &'s [PpePeriod],
    pub debt: &'s [DebtPeriod],
    pub equity: &'s [EquityPeriod],
    pub balance_sheet: &'s [BalanceSheetPeriod],
}

/// Build the statement from the reconciled schedules. Period 0 carries no
/// flows; every later period begins from the prior balance-sheet cash.
pub fn derive(sources: &CashFlowSources<'_>, historical_cash: Money) -> Vec<CashFlowPeriod> {
    let periods = sources.balance_sheet.len();
    let mut rows = Vec::with_capacity(periods);
    rows.push(opening(historical_cash, sources.balance_sheet.first()));

    for i in 1..periods {
        let is = &sources.income_statement[i];
        let wc = &sources.working_capital[i];
        let fixed = &sources.ppe[i];
        let debt = &sources.debt[i];
        let eq = &sources.equity[i];
        let bs = &sources.balance_sheet[i];

        let change_in_operating_current_assets = wc.change_in_receivables
            + wc.change_in_inventory
            + wc.change_in_prepaid
            + wc.change_in_other_current_assets;
        let change_in_operating_current_liabilities = wc.change_in_payables
            + wc.change_in_accrued
            + wc.change_in_other_current_liabilities;

        let cash_from_operations = is.net_income
            + is.depreciation_amortization
            + is.stock_comp
            - change_in_operating_current_assets
            + change_in_operating_current_liabilities;
        let cash_from_investing = -fixed.capex;
        let revolver_net_change = debt.revolver_net_change();
        let cash_from_financing =
            -debt.term_amortization + revolver_net_change - eq.buybacks - eq.dividends;
        let net_cash_change = cash_from_operations + cash_from_investing + cash_from_financing;

        let beginning_cash = sources.balance_sheet[i - 1].cash;
        let ending_cash = beginning_cash + net_cash_change;
        let free_cash_flow = cash_from_operations - fixed.capex;

        rows.push(CashFlowPeriod {
            period: i,
            label: period_label(i),
            net_income: is.net_income,
            depreciation_amortization: is.depreciation_amortization,
            stock_comp: is.stock_comp,
            change_in_operating_current_assets,
            change_in_operating_current_liabilities,
            cash_from_operations,
            capex: fixed.capex,
            cash_from_investing,
            term_debt_repayment: debt.term_amortization,
            revolver_net_change,
            dividends: eq.dividends,
            buybacks: eq.buybacks,
            cash_from_financing,
            net_cash_change,
            beginning_cash,
            ending_cash,
            balance_sheet_cash: bs.cash,
            discrepancy: ending_cash - bs.cash,
            free_cash_flow,
            free_cash_flow_to_equity: free_cash_flow - debt.term_amortization
                + revolver_net_change,
        });
    }
    rows
}

fn opening(historical_cash: Money, bs: Option<&BalanceSheetPeriod>) -> CashFlowPeriod {
    let balance_sheet_cash = bs.map_or(historical_cash, |b| b.cash);
    CashFlowPeriod {
        period: 0,
        label: period_label(0),
        net_income: Decimal::ZERO,
        depreciation_amortization: Decimal::ZERO,
        stock_comp: Decimal::ZERO,
        change_in_operating_current_assets: Decimal::ZERO,
        change_in_operating_current_liabilities: Decimal::ZERO,
        cash_from_operations: Decimal::ZERO,
        capex: Decimal::ZERO,
        cash_from_investing: Decimal::ZERO,
        term_debt_repayment: Decimal::ZERO,
        revolver_net_change: Decimal::ZERO,
        dividends: Decimal::ZERO,
        buybacks: Decimal::ZERO,
        cash_from_financing: Decimal::ZERO,
        net_cash_change: Decimal::ZERO,
        beginning_cash: historical_cash,
        ending_cash: historical_cash,
        balance_sheet_cash,
        discrepancy: historical_cash - balance_sheet_cash,
        free_cash_flow: Decimal::ZERO,
        free_cash_flow_to_equity: Decimal::ZERO,
    }
}

/// Compare each period's ending cash with the balance sheet. Returns whether
/// every period agrees; with `fail_on_mismatch` the first disagreement is an
/// error instead.
pub(crate) fn cross_check(
    rows: &[CashFlowPeriod],
    tolerance: Decimal,
    fail_on_mismatch: bool,
    recorder: &mut Recorder<'_>,
) -> ModelResult<bool> {
    let mut reconciled = true;
    for row in rows.iter().filter(|r| r.discrepancy.abs() > tolerance) {
        if fail_on_mismatch {
            return Err(ModelError::CashFlowMismatch {
                period: row.period,
                cash_flow_cash: row.ending_cash,
                balance_sheet_cash: row.balance_sheet_cash,
            });
        }
        reconciled = false;
        recorder.emit(
            Diagnostic::new(
                Severity::Error,
                DiagnosticCode::CashFlowMismatch,
                format!(
                    "Cash flow ending cash {} disagrees with balance sheet cash {}",
                    row.ending_cash, row.balance_sheet_cash
                ),
            )
            .in_period(row.period)
            .with_amount(row.discrepancy),
        );
    }
    Ok(reconciled)
}
