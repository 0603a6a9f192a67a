//! Term debt and revolver schedule.
//!
//! Term debt is acyclic. The revolver closes the loop between cash, interest
//! and earnings: the draw depends on the period's cash, cash depends on net
//! income, net income depends on interest, and interest depends on the
//! revolver. The default resolution is one deterministic pass per period
//! (interest from beginning balances, interest income on cash recognised one
//! period later). [`CircularityMode::Iterative`] re-runs the period on
//! average balances until net interest settles.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use super::assumptions::DebtTerms;
use super::balance_sheet::BalanceSheetPeriod;
use crate::config::CircularityMode;
use crate::diagnostics::{Diagnostic, DiagnosticCode, Recorder, Severity};
use crate::types::{period_label, Money};

/// Components of the period's interest line.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NetInterest {
    pub term_interest: Money,
    pub revolver_interest: Money,
    pub commitment_fee: Money,
    pub interest_income: Money,
}

impl NetInterest {
    /// Gross interest expense, including the commitment fee.
    pub fn expense(&self) -> Money {
        self.term_interest + self.revolver_interest + self.commitment_fee
    }

    pub fn net(&self) -> Money {
        self.expense() - self.interest_income
    }
}

/// Debt balances, interest and the revolver cash sweep for a single period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebtPeriod {
    pub period: usize,
    pub label: String,
    pub term_beginning: Money,
    pub term_amortization: Money,
    pub term_ending: Money,
    pub term_interest: Money,
    pub revolver_beginning: Money,
    pub revolver_draw: Money,
    pub revolver_paydown: Money,
    pub revolver_ending: Money,
    pub revolver_interest: Money,
    pub revolver_size: Money,
    pub revolver_available: Money,
    pub commitment_fee: Money,
    pub total_debt: Money,
    pub beginning_cash: Money,
    /// Cash before any revolver movement
    pub preliminary_cash: Money,
    pub minimum_cash: Money,
    /// Cash actually funded after the revolver draw or paydown
    pub funded_cash: Money,
    /// `max(funded_cash, minimum_cash)`
    pub target_cash: Money,
    /// Balance-sheet cash once reconciled; the next period begins here
    pub ending_cash: Money,
    /// Amount the minimum-cash floor asks for beyond what was funded
    pub cash_floor_shortfall: Money,
    pub interest_expense: Money,
    pub interest_income: Money,
    pub net_interest: Money,
    /// Interest earned on this period's average cash, recognised next period
    pub carried_interest_income: Money,
    pub iterations: u32,
}

impl DebtPeriod {
    pub fn revolver_net_change(&self) -> Money {
        self.revolver_draw - self.revolver_paydown
    }

    /// Next year's scheduled amortisation, shown as a current liability.
    pub fn current_portion(&self, terms: &DebtTerms) -> Money {
        terms.annual_amortization.min(self.term_ending)
    }
}

/// What the rest of the model reports back for a given interest line.
pub struct Settlement<E> {
    pub earnings: E,
    /// Operating, investing and equity cash flows, before any debt movement
    pub cash_before_debt: Money,
}

/// A fully resolved period: the debt row plus the caller's earnings computed
/// with exactly the interest reported on that row.
pub struct Resolution<E> {
    pub debt: DebtPeriod,
    pub interest: NetInterest,
    pub earnings: E,
}

/// End-of-period estimates used to average balances in iterative mode.
#[derive(Debug, Clone, Copy)]
struct Basis {
    revolver_ending: Money,
    funded_cash: Money,
}

/// Period 0: historical balances, no flows.
pub fn opening(terms: &DebtTerms, opening_revolver: Money, historical_cash: Money) -> DebtPeriod {
    DebtPeriod {
        period: 0,
        label: period_label(0),
        term_beginning: terms.term_debt_balance,
        term_amortization: Decimal::ZERO,
        term_ending: terms.term_debt_balance,
        term_interest: Decimal::ZERO,
        revolver_beginning: opening_revolver,
        revolver_draw: Decimal::ZERO,
        revolver_paydown: Decimal::ZERO,
        revolver_ending: opening_revolver,
        revolver_interest: Decimal::ZERO,
        revolver_size: terms.revolver_size,
        revolver_available: terms.revolver_size - opening_revolver,
        commitment_fee: Decimal::ZERO,
        total_debt: terms.term_debt_balance + opening_revolver,
        beginning_cash: historical_cash,
        preliminary_cash: historical_cash,
        minimum_cash: terms.minimum_cash,
        funded_cash: historical_cash,
        target_cash: historical_cash,
        ending_cash: historical_cash,
        cash_floor_shortfall: Decimal::ZERO,
        interest_expense: Decimal::ZERO,
        interest_income: Decimal::ZERO,
        net_interest: Decimal::ZERO,
        carried_interest_income: terms.interest_on_cash_rate * historical_cash,
        iterations: 0,
    }
}

/// Resolve one projected period. `settle` receives a candidate interest line
/// and returns the earnings and pre-debt cash flow it implies; it may be
/// called more than once in iterative mode and must be side-effect free.
pub(crate) fn resolve_period<E, F>(
    terms: &DebtTerms,
    prior: &DebtPeriod,
    period: usize,
    mode: CircularityMode,
    mut settle: F,
    recorder: &mut Recorder<'_>,
) -> Resolution<E>
where
    F: FnMut(&NetInterest) -> Settlement<E>,
{
    let resolution = match mode {
        CircularityMode::SinglePass => fund(terms, prior, period, None, &mut settle),
        CircularityMode::Iterative {
            max_iterations,
            tolerance,
        } => {
            let mut basis = Basis {
                revolver_ending: prior.revolver_ending,
                funded_cash: prior.funded_cash,
            };
            let mut iterations = 0;
            loop {
                iterations += 1;
                let mut candidate = fund(terms, prior, period, Some(basis), &mut settle);
                candidate.debt.iterations = iterations;
                let next = Basis {
                    revolver_ending: candidate.debt.revolver_ending,
                    funded_cash: candidate.debt.funded_cash,
                };
                let delta = (interest_on(terms, prior, Some(next)).net()
                    - candidate.interest.net())
                .abs();
                if delta < tolerance {
                    recorder.emit(
                        Diagnostic::new(
                            Severity::Debug,
                            DiagnosticCode::CircularityConverged,
                            format!("Interest converged after {iterations} iteration(s)"),
                        )
                        .in_period(period)
                        .with_amount(delta),
                    );
                    break candidate;
                }
                if iterations >= max_iterations {
                    recorder.emit(
                        Diagnostic::new(
                            Severity::Warning,
                            DiagnosticCode::CircularityNotConverged,
                            format!(
                                "Interest did not converge within {max_iterations} iteration(s); last change {delta}"
                            ),
                        )
                        .in_period(period)
                        .with_amount(delta),
                    );
                    break candidate;
                }
                basis = next;
            }
        }
    };

    report_funding(&resolution.debt, recorder);
    resolution
}

/// Interest for the period. Without a basis: revolver and commitment fee on
/// the beginning balance, interest income carried from the prior period.
/// With a basis: averages of beginning and estimated ending balances.
fn interest_on(terms: &DebtTerms, prior: &DebtPeriod, basis: Option<Basis>) -> NetInterest {
    let term_beginning = prior.term_ending;
    let term_ending = term_beginning - terms.annual_amortization.min(term_beginning);
    let revolver_beginning = prior.revolver_ending;

    let (revolver_balance, interest_income) = match basis {
        None => (revolver_beginning, prior.carried_interest_income),
        Some(b) => (
            (revolver_beginning + b.revolver_ending) / dec!(2),
            terms.interest_on_cash_rate * (prior.funded_cash + b.funded_cash) / dec!(2),
        ),
    };

    NetInterest {
        term_interest: terms.term_debt_rate * (term_beginning + term_ending) / dec!(2),
        revolver_interest: terms.revolver_rate * revolver_balance,
        commitment_fee: terms.commitment_fee_rate
            * (terms.revolver_size - revolver_balance).max(Decimal::ZERO),
        interest_income,
    }
}

fn fund<E, F>(
    terms: &DebtTerms,
    prior: &DebtPeriod,
    period: usize,
    basis: Option<Basis>,
    settle: &mut F,
) -> Resolution<E>
where
    F: FnMut(&NetInterest) -> Settlement<E>,
{
    let interest = interest_on(terms, prior, basis);
    let settlement = settle(&interest);

    let term_beginning = prior.term_ending;
    let term_amortization = terms.annual_amortization.min(term_beginning);
    let term_ending = term_beginning - term_amortization;

    let beginning_cash = prior.funded_cash;
    let preliminary_cash = beginning_cash + settlement.cash_before_debt - term_amortization;

    let revolver_beginning = prior.revolver_ending;
    let capacity = (terms.revolver_size - revolver_beginning).max(Decimal::ZERO);
    let (revolver_draw, revolver_paydown) = if preliminary_cash < terms.minimum_cash {
        ((terms.minimum_cash - preliminary_cash).min(capacity), Decimal::ZERO)
    } else if preliminary_cash > terms.minimum_cash && revolver_beginning > Decimal::ZERO {
        (
            Decimal::ZERO,
            (preliminary_cash - terms.minimum_cash).min(revolver_beginning),
        )
    } else {
        (Decimal::ZERO, Decimal::ZERO)
    };
    let revolver_ending = revolver_beginning + revolver_draw - revolver_paydown;

    let funded_cash = preliminary_cash + revolver_draw - revolver_paydown;
    let target_cash = funded_cash.max(terms.minimum_cash);
    let earned = terms.interest_on_cash_rate * (beginning_cash + funded_cash) / dec!(2);

    let debt = DebtPeriod {
        period,
        label: period_label(period),
        term_beginning,
        term_amortization,
        term_ending,
        term_interest: interest.term_interest,
        revolver_beginning,
        revolver_draw,
        revolver_paydown,
        revolver_ending,
        revolver_interest: interest.revolver_interest,
        revolver_size: terms.revolver_size,
        revolver_available: terms.revolver_size - revolver_ending,
        commitment_fee: interest.commitment_fee,
        total_debt: term_ending + revolver_ending,
        beginning_cash,
        preliminary_cash,
        minimum_cash: terms.minimum_cash,
        funded_cash,
        target_cash,
        ending_cash: target_cash,
        cash_floor_shortfall: target_cash - funded_cash,
        interest_expense: interest.expense(),
        interest_income: interest.interest_income,
        net_interest: interest.net(),
        carried_interest_income: if basis.is_none() {
            earned
        } else {
            Decimal::ZERO
        },
        iterations: 1,
    };

    Resolution {
        debt,
        interest,
        earnings: settlement.earnings,
    }
}

/// Carry reconciled balance-sheet cash back onto the schedule so each
/// period's ending cash is where the next one begins.
pub fn record_reconciled_cash(schedule: &mut [DebtPeriod], balance_sheet: &[BalanceSheetPeriod]) {
    for (row, bs) in schedule.iter_mut().zip(balance_sheet) {
        row.ending_cash = bs.cash;
    }
}

fn report_funding(debt: &DebtPeriod, recorder: &mut Recorder<'_>) {
    if debt.revolver_draw > Decimal::ZERO && debt.revolver_available.is_zero() {
        recorder.emit(
            Diagnostic::new(
                Severity::Warning,
                DiagnosticCode::RevolverCapacityReached,
                format!("revolver fully drawn at {}", debt.revolver_ending),
            )
            .in_period(debt.period)
            .with_amount(debt.revolver_ending),
        );
    }
    if debt.cash_floor_shortfall > Decimal::ZERO {
        recorder.emit(
            Diagnostic::new(
                Severity::Warning,
                DiagnosticCode::CashFloorShortfall,
                format!(
                    "funded cash {} is below the {} minimum; shortfall of {} left to the balance sheet plug",
                    debt.funded_cash, debt.minimum_cash, debt.cash_floor_shortfall
                ),
            )
            .in_period(debt.period)
            .with_amount(debt.cash_floor_shortfall),
        );
    }
}
