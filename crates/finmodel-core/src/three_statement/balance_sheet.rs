use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::assumptions::{DebtTerms, HistoricalFinancials};
use super::debt::DebtPeriod;
use super::equity::EquityPeriod;
use super::ppe::PpePeriod;
use super::working_capital::{shift_other_current_assets, WorkingCapitalPeriod};
use crate::diagnostics::{Diagnostic, DiagnosticCode, Recorder, Severity};
use crate::error::ModelError;
use crate::types::{period_label, Money};
use crate::ModelResult;

// ---------------------------------------------------------------------------
// Balance sheet
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceSheetPeriod {
    pub period: usize,
    pub label: String,
    // Assets
    pub cash: Money,
    pub accounts_receivable: Money,
    pub inventory: Money,
    pub prepaid_expenses: Money,
    pub other_current_assets: Money,
    pub total_current_assets: Money,
    pub ppe_net: Money,
    pub intangibles: Money,
    pub goodwill: Money,
    pub other_long_term_assets: Money,
    pub total_assets: Money,
    // Liabilities
    pub accounts_payable: Money,
    pub accrued_liabilities: Money,
    pub other_current_liabilities: Money,
    pub current_portion_of_debt: Money,
    pub total_current_liabilities: Money,
    pub long_term_debt: Money,
    pub revolver: Money,
    pub other_long_term_liabilities: Money,
    pub total_liabilities: Money,
    // Equity
    pub common_stock: Money,
    pub apic: Money,
    pub retained_earnings: Money,
    pub treasury_stock: Money,
    pub aoci: Money,
    pub total_equity: Money,
    pub total_liabilities_and_equity: Money,
    /// Cash added (or removed) by the reconciliation plug
    pub cash_plug: Money,
    /// `total_liabilities_and_equity - total_assets` after reconciliation
    pub imbalance: Money,
}

impl BalanceSheetPeriod {
    fn recompute_totals(&mut self) {
        self.total_current_assets = self.cash
            + self.accounts_receivable
            + self.inventory
            + self.prepaid_expenses
            + self.other_current_assets;
        self.total_assets = self.total_current_assets
            + self.ppe_net
            + self.intangibles
            + self.goodwill
            + self.other_long_term_assets;

        self.total_current_liabilities = self.accounts_payable
            + self.accrued_liabilities
            + self.other_current_liabilities
            + self.current_portion_of_debt;
        self.total_liabilities = self.total_current_liabilities
            + self.long_term_debt
            + self.revolver
            + self.other_long_term_liabilities;

        self.total_equity = self.common_stock + self.apic + self.retained_earnings
            - self.treasury_stock
            + self.aoci;
        self.total_liabilities_and_equity = self.total_liabilities + self.total_equity;
        self.imbalance = self.total_liabilities_and_equity - self.total_assets;
    }

    fn shift_other_current_assets(&mut self, amount: Money) {
        self.other_current_assets += amount;
        self.recompute_totals();
    }

    fn shift_retained_earnings(&mut self, amount: Money) {
        self.retained_earnings += amount;
        self.recompute_totals();
    }

    fn add_cash_plug(&mut self, amount: Money) {
        self.cash += amount;
        self.cash_plug += amount;
        self.recompute_totals();
    }
}

/// Lay out one period's balance sheet from the supporting schedules.
pub fn assemble(
    period: usize,
    historical: &HistoricalFinancials,
    terms: &DebtTerms,
    debt: &DebtPeriod,
    wc: &WorkingCapitalPeriod,
    ppe: &PpePeriod,
    equity: &EquityPeriod,
) -> BalanceSheetPeriod {
    let current_portion_of_debt = debt.current_portion(terms);
    let mut row = BalanceSheetPeriod {
        period,
        label: period_label(period),
        cash: debt.target_cash,
        accounts_receivable: wc.accounts_receivable,
        inventory: wc.inventory,
        prepaid_expenses: wc.prepaid_expenses,
        other_current_assets: wc.other_current_assets,
        total_current_assets: Decimal::ZERO,
        ppe_net: ppe.ending_net,
        intangibles: historical.intangibles,
        goodwill: historical.goodwill,
        other_long_term_assets: historical.other_long_term_assets,
        total_assets: Decimal::ZERO,
        accounts_payable: wc.accounts_payable,
        accrued_liabilities: wc.accrued_liabilities,
        other_current_liabilities: wc.other_current_liabilities,
        current_portion_of_debt,
        total_current_liabilities: Decimal::ZERO,
        long_term_debt: debt.term_ending - current_portion_of_debt,
        revolver: debt.revolver_ending,
        other_long_term_liabilities: historical.other_long_term_liabilities,
        total_liabilities: Decimal::ZERO,
        common_stock: equity.common_stock,
        apic: equity.apic,
        retained_earnings: equity.retained_earnings,
        treasury_stock: equity.treasury_stock,
        aoci: equity.aoci,
        total_equity: Decimal::ZERO,
        total_liabilities_and_equity: Decimal::ZERO,
        cash_plug: Decimal::ZERO,
        imbalance: Decimal::ZERO,
    };
    row.recompute_totals();
    row
}

// ---------------------------------------------------------------------------
// Reconciliation
// ---------------------------------------------------------------------------

/// Adjustments made by [`reconcile`] and the resulting balance status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationReport {
    /// Level added to other current assets in every period
    pub historical_anchor_adjustment: Money,
    /// Level added to retained earnings in every period
    pub opening_equity_adjustment: Money,
    /// Plug per period, zero where none was needed
    pub cash_plugs: Vec<Money>,
    pub total_cash_plug: Money,
    pub max_imbalance: Money,
    pub is_balanced: bool,
}

/// Mutable views of the schedules touched by reconciliation.
pub struct ReconcileTarget<'s> {
    pub balance_sheet: &'s mut [BalanceSheetPeriod],
    pub working_capital: &'s mut [WorkingCapitalPeriod],
    pub equity: &'s mut [EquityPeriod],
}

/// Four ordered steps:
///
/// 1. Anchor period-0 total assets to the reported figure through other
///    current assets, carried as a level in every period.
/// 2. Backsolve opening retained earnings so period 0 balances.
/// 3. Carry the same retained-earnings level through periods 1..N.
/// 4. Plug any residual imbalance into cash.
///
/// Fails if the anchor is missed or any period is still out of balance.
pub(crate) fn reconcile(
    target: ReconcileTarget<'_>,
    historical_total_assets: Money,
    tolerance: Decimal,
    recorder: &mut Recorder<'_>,
) -> ModelResult<ReconciliationReport> {
    let ReconcileTarget {
        balance_sheet,
        working_capital,
        equity,
    } = target;

    let Some(first) = balance_sheet.first() else {
        return Err(ModelError::InvalidInput {
            field: "balance_sheet".into(),
            reason: "No periods to reconcile".into(),
        });
    };

    // 1. Historical anchor
    let anchor = historical_total_assets - first.total_assets;
    if !anchor.is_zero() {
        for row in balance_sheet.iter_mut() {
            row.shift_other_current_assets(anchor);
        }
        shift_other_current_assets(working_capital, anchor);
        recorder.emit(
            Diagnostic::new(
                Severity::Info,
                DiagnosticCode::HistoricalAnchor,
                format!(
                    "Other current assets adjusted by {anchor} in every period to match reported total assets of {historical_total_assets}"
                ),
            )
            .with_amount(anchor),
        );
    }
    check_anchor(&balance_sheet[0], historical_total_assets, tolerance)?;

    // 2 + 3. Opening equity backsolve, propagated forward
    let opening = &balance_sheet[0];
    let equity_adjustment =
        (opening.total_assets - opening.total_liabilities) - opening.total_equity;
    if !equity_adjustment.is_zero() {
        for row in balance_sheet.iter_mut() {
            row.shift_retained_earnings(equity_adjustment);
        }
        for row in equity.iter_mut() {
            row.adjust_retained_earnings(equity_adjustment);
        }
        recorder.emit(
            Diagnostic::new(
                Severity::Info,
                DiagnosticCode::OpeningEquityBackfill,
                format!(
                    "Opening retained earnings adjusted by {equity_adjustment}; carried through all periods"
                ),
            )
            .with_amount(equity_adjustment),
        );
    }

    // 4. Universal plug
    let mut cash_plugs = Vec::with_capacity(balance_sheet.len());
    for row in balance_sheet.iter_mut() {
        let imbalance = row.imbalance;
        if imbalance.abs() > tolerance {
            row.add_cash_plug(imbalance);
            recorder.emit(
                Diagnostic::new(
                    Severity::Warning,
                    DiagnosticCode::CashPlug,
                    format!("Balance sheet off by {imbalance}; plugged to cash"),
                )
                .in_period(row.period)
                .with_amount(imbalance),
            );
        }
        cash_plugs.push(row.cash_plug);
    }

    // Post-conditions
    check_anchor(&balance_sheet[0], historical_total_assets, tolerance)?;
    let max_imbalance = balance_sheet
        .iter()
        .map(|r| r.imbalance.abs())
        .max()
        .unwrap_or(Decimal::ZERO);
    let offending: Vec<usize> = balance_sheet
        .iter()
        .filter(|r| r.imbalance.abs() > tolerance)
        .map(|r| r.period)
        .collect();
    if !offending.is_empty() {
        return Err(ModelError::InvariantViolation {
            check: "balance_sheet_balances".into(),
            periods: offending,
            max_imbalance,
        });
    }

    let total_cash_plug: Money = cash_plugs.iter().map(|p| p.abs()).sum();
    Ok(ReconciliationReport {
        historical_anchor_adjustment: anchor,
        opening_equity_adjustment: equity_adjustment,
        cash_plugs,
        total_cash_plug,
        max_imbalance,
        is_balanced: true,
    })
}

fn check_anchor(
    opening: &BalanceSheetPeriod,
    historical_total_assets: Money,
    tolerance: Decimal,
) -> ModelResult<()> {
    let miss = (opening.total_assets - historical_total_assets).abs();
    if miss > tolerance {
        return Err(ModelError::InvariantViolation {
            check: "historical_anchor".into(),
            periods: vec![0],
            max_imbalance: miss,
        });
    }
    Ok(())
}
