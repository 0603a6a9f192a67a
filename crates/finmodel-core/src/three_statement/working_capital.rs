use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::assumptions::WorkingCapitalDrivers;
use super::income_statement::OperatingLines;
use crate::types::{period_label, Money};

/// Operating working-capital balances and their period-over-period changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkingCapitalPeriod {
    pub period: usize,
    pub label: String,
    pub accounts_receivable: Money,
    pub inventory: Money,
    pub prepaid_expenses: Money,
    /// Driver-based balance plus the historical anchor adjustment
    pub other_current_assets: Money,
    pub accounts_payable: Money,
    pub accrued_liabilities: Money,
    pub other_current_liabilities: Money,
    pub change_in_receivables: Money,
    pub change_in_inventory: Money,
    pub change_in_prepaid: Money,
    pub change_in_other_current_assets: Money,
    pub change_in_payables: Money,
    pub change_in_accrued: Money,
    pub change_in_other_current_liabilities: Money,
    pub operating_current_assets: Money,
    pub operating_current_liabilities: Money,
    pub net_working_capital: Money,
    pub change_in_nwc: Money,
    pub dso_days: u32,
    pub dio_days: u32,
    pub dpo_days: u32,
    pub cash_conversion_cycle: i64,
}

impl WorkingCapitalPeriod {
    /// Cash effect of the period's working-capital movement (−ΔNWC).
    pub fn cash_flow_impact(&self) -> Money {
        -self.change_in_nwc
    }
}

/// Balances for `period`, driven by the same period's revenue, COGS and opex.
/// Deltas are taken against `prior`; period 0 has none.
pub fn project_balances(
    drivers: &WorkingCapitalDrivers,
    period: usize,
    ops: &OperatingLines,
    days_in_year: u32,
    prior: Option<&WorkingCapitalPeriod>,
) -> WorkingCapitalPeriod {
    let days = Decimal::from(days_in_year);
    let accounts_receivable = ops.revenue * Decimal::from(drivers.dso_days) / days;
    let inventory = ops.cogs * Decimal::from(drivers.dio_days) / days;
    let accounts_payable = ops.cogs * Decimal::from(drivers.dpo_days) / days;
    let prepaid_expenses = ops.revenue * drivers.prepaid_pct_revenue;
    let accrued_liabilities = ops.opex() * drivers.accrued_pct_opex;
    let other_current_liabilities = ops.revenue * drivers.other_current_liabilities_pct_revenue;
    let other_current_assets = ops.revenue * drivers.other_current_assets_pct_revenue;

    let delta = |current: Money, previous: fn(&WorkingCapitalPeriod) -> Money| {
        prior.map_or(Decimal::ZERO, |p| current - previous(p))
    };

    let operating_current_assets =
        accounts_receivable + inventory + prepaid_expenses + other_current_assets;
    let operating_current_liabilities =
        accounts_payable + accrued_liabilities + other_current_liabilities;
    let net_working_capital = operating_current_assets - operating_current_liabilities;

    WorkingCapitalPeriod {
        period,
        label: period_label(period),
        accounts_receivable,
        inventory,
        prepaid_expenses,
        other_current_assets,
        accounts_payable,
        accrued_liabilities,
        other_current_liabilities,
        change_in_receivables: delta(accounts_receivable, |p| p.accounts_receivable),
        change_in_inventory: delta(inventory, |p| p.inventory),
        change_in_prepaid: delta(prepaid_expenses, |p| p.prepaid_expenses),
        change_in_other_current_assets: delta(other_current_assets, |p| p.other_current_assets),
        change_in_payables: delta(accounts_payable, |p| p.accounts_payable),
        change_in_accrued: delta(accrued_liabilities, |p| p.accrued_liabilities),
        change_in_other_current_liabilities: delta(other_current_liabilities, |p| {
            p.other_current_liabilities
        }),
        operating_current_assets,
        operating_current_liabilities,
        net_working_capital,
        change_in_nwc: delta(net_working_capital, |p| p.net_working_capital),
        dso_days: drivers.dso_days,
        dio_days: drivers.dio_days,
        dpo_days: drivers.dpo_days,
        cash_conversion_cycle: i64::from(drivers.dso_days) + i64::from(drivers.dio_days)
            - i64::from(drivers.dpo_days),
    }
}

/// Add a constant level to other current assets in every period. Used by the
/// historical anchor; deltas are unchanged because every period moves together.
pub fn shift_other_current_assets(schedule: &mut [WorkingCapitalPeriod], amount: Money) {
    for row in schedule.iter_mut() {
        row.other_current_assets += amount;
        row.operating_current_assets += amount;
        row.net_working_capital += amount;
    }
}
