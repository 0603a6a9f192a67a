use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use super::assumptions::{Assumptions, ValidatedAssumptions};
use super::balance_sheet::{self, BalanceSheetPeriod, ReconcileTarget};
use super::cash_flow::{self, CashFlowPeriod, CashFlowSources};
use super::debt::{self, DebtPeriod, Settlement};
use super::equity::{self, EquityPeriod};
use super::income_statement::{
    apply_tax, finalize_period, historical_period, project_operating, IncomeStatementPeriod,
};
use super::ppe::{self, PpePeriod};
use super::ratios::{build_summary, compute_ratios, ProjectionSummary, RatioPeriod, RatioSources};
use super::working_capital::{project_balances, WorkingCapitalPeriod};
use crate::config::{CircularityMode, EngineConfig};
use crate::diagnostics::{
    Diagnostic, DiagnosticCode, DiagnosticsSink, LogSink, Recorder, Severity,
};
use crate::error::ModelError;
use crate::types::{with_metadata, ComputationOutput};
use crate::ModelResult;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

const LEVERAGE_WARNING: Decimal = dec!(6);
const COVERAGE_WARNING: Decimal = dec!(2);

// ---------------------------------------------------------------------------
// Request / output
// ---------------------------------------------------------------------------

/// Request document accepted by the CLI and the bindings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectionRequest {
    pub assumptions: Assumptions,
    #[serde(default)]
    pub config: EngineConfig,
}

/// Every schedule holds `projection_years + 1` rows; index 0 is historical.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectionOutput {
    pub income_statement: Vec<IncomeStatementPeriod>,
    pub balance_sheet: Vec<BalanceSheetPeriod>,
    pub cash_flow: Vec<CashFlowPeriod>,
    pub debt_schedule: Vec<DebtPeriod>,
    pub working_capital: Vec<WorkingCapitalPeriod>,
    pub ppe_schedule: Vec<PpePeriod>,
    pub equity_schedule: Vec<EquityPeriod>,
    pub ratios: Vec<RatioPeriod>,
    pub summary: ProjectionSummary,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Run the projection. Pure and deterministic: the same assumptions and
/// config always produce the same output.
pub fn run_projection(
    assumptions: &ValidatedAssumptions,
    config: &EngineConfig,
    sink: &dyn DiagnosticsSink,
) -> ModelResult<ProjectionOutput> {
    let mut recorder = Recorder::new(sink);
    project(assumptions, config, &mut recorder)
}

/// Validate a request, run it, and wrap the result in the standard envelope.
/// Diagnostics go to the `log` facade.
pub fn build_three_statement_model(
    request: &ProjectionRequest,
) -> ModelResult<ComputationOutput<ProjectionOutput>> {
    build_three_statement_model_with_sink(request, &LogSink)
}

pub fn build_three_statement_model_with_sink(
    request: &ProjectionRequest,
    sink: &dyn DiagnosticsSink,
) -> ModelResult<ComputationOutput<ProjectionOutput>> {
    let start = Instant::now();

    let validated = ValidatedAssumptions::new(request.assumptions.clone(), &request.config)?;
    let mut recorder = Recorder::new(sink);
    let output = project(&validated, &request.config, &mut recorder)?;
    let warnings = recorder.into_warnings();

    let elapsed = start.elapsed().as_micros() as u64;

    Ok(with_metadata(
        methodology(request.config.circularity),
        &request.assumptions,
        warnings,
        elapsed,
        output,
    ))
}

fn methodology(mode: CircularityMode) -> &'static str {
    match mode {
        CircularityMode::SinglePass => {
            "Integrated Three-Statement Projection with Single-Pass Revolver Resolution"
        }
        CircularityMode::Iterative { .. } => {
            "Integrated Three-Statement Projection with Iterative Interest Convergence"
        }
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

fn project(
    assumptions: &ValidatedAssumptions,
    config: &EngineConfig,
    recorder: &mut Recorder<'_>,
) -> ModelResult<ProjectionOutput> {
    config.validate()?;
    let n = assumptions.horizon();
    if n > config.max_projection_years {
        return Err(ModelError::InvalidInput {
            field: "projection_years".into(),
            reason: format!(
                "Horizon of {n} years exceeds the configured maximum of {}",
                config.max_projection_years
            ),
        });
    }
    let a: &Assumptions = assumptions;
    let h = &a.historical;
    let shares = h.shares_outstanding;
    let buyback = a.equity.annual_buyback;

    // Period 0
    let ops0 = project_operating(a, 0, Decimal::ZERO);
    let wc0 = project_balances(&a.working_capital, 0, &ops0, config.days_in_year, None);
    let ppe0 = ppe::opening(
        h.ppe_net,
        ops0.depreciation_amortization,
        config.gross_ppe_multiple,
    );
    let eq0 = equity::opening(
        h.total_equity,
        h.common_stock,
        config.apic_share_of_equity,
        h.net_income,
    );
    let debt0 = debt::opening(&a.debt, assumptions.opening_revolver(), h.cash);
    let bs0 = balance_sheet::assemble(0, h, &a.debt, &debt0, &wc0, &ppe0, &eq0);

    let mut income_statement = Vec::with_capacity(n + 1);
    let mut working_capital = Vec::with_capacity(n + 1);
    let mut ppe_schedule = Vec::with_capacity(n + 1);
    let mut equity_schedule = Vec::with_capacity(n + 1);
    let mut debt_schedule = Vec::with_capacity(n + 1);
    let mut balance_sheet = Vec::with_capacity(n + 1);
    income_statement.push(historical_period(a, &ops0));
    working_capital.push(wc0);
    ppe_schedule.push(ppe0);
    equity_schedule.push(eq0);
    debt_schedule.push(debt0);
    balance_sheet.push(bs0);

    // Projected periods, strictly in order
    for period in 1..=n {
        let prior = period - 1;
        let ops = project_operating(a, period, income_statement[prior].revenue);
        let wc = project_balances(
            &a.working_capital,
            period,
            &ops,
            config.days_in_year,
            Some(&working_capital[prior]),
        );
        let fixed = ppe::roll_forward(
            &ppe_schedule[prior],
            period,
            ops.revenue,
            a.operating.capex_pct[prior],
            ops.depreciation_amortization,
        );
        let nol_beginning = income_statement[prior].nol_ending;

        let resolution = debt::resolve_period(
            &a.debt,
            &debt_schedule[prior],
            period,
            config.circularity,
            |interest| {
                let ebt = ops.ebit - interest.net();
                let tax = apply_tax(ebt, nol_beginning, a.tax.tax_rate);
                let row = finalize_period(period, &ops, interest, nol_beginning, &tax, shares);
                let dividends =
                    equity::dividends_for(&a.equity.dividend_policy, row.net_income, shares);
                let cash_from_operations = row.net_income + ops.depreciation_amortization
                    + ops.stock_comp
                    + wc.cash_flow_impact();
                Settlement {
                    cash_before_debt: cash_from_operations - fixed.capex - dividends - buyback,
                    earnings: (row, dividends),
                }
            },
            recorder,
        );
        let (is_row, dividends) = resolution.earnings;

        if nol_beginning > Decimal::ZERO && is_row.nol_ending.is_zero() {
            recorder.emit(
                Diagnostic::new(
                    Severity::Info,
                    DiagnosticCode::NolExhausted,
                    "Tax loss carryforward fully used",
                )
                .in_period(period)
                .with_amount(is_row.nol_used),
            );
        }

        let eq = equity::roll_forward(
            &equity_schedule[prior],
            period,
            is_row.net_income,
            dividends,
            ops.stock_comp,
            buyback,
        );
        let bs =
            balance_sheet::assemble(period, h, &a.debt, &resolution.debt, &wc, &fixed, &eq);

        income_statement.push(is_row);
        working_capital.push(wc);
        ppe_schedule.push(fixed);
        equity_schedule.push(eq);
        debt_schedule.push(resolution.debt);
        balance_sheet.push(bs);
    }

    let reconciliation = balance_sheet::reconcile(
        ReconcileTarget {
            balance_sheet: &mut balance_sheet,
            working_capital: &mut working_capital,
            equity: &mut equity_schedule,
        },
        h.total_assets,
        config.tolerance,
        recorder,
    )?;
    debt::record_reconciled_cash(&mut debt_schedule, &balance_sheet);

    let cash_flow = cash_flow::derive(
        &CashFlowSources {
            income_statement: &income_statement,
            working_capital: &working_capital,
            ppe: &ppe_schedule,
            debt: &debt_schedule,
            equity: &equity_schedule,
            balance_sheet: &balance_sheet,
        },
        h.cash,
    );
    let cash_flow_reconciled = cash_flow::cross_check(
        &cash_flow,
        config.tolerance,
        config.fail_on_cash_flow_mismatch,
        recorder,
    )?;

    let ratios = compute_ratios(
        &RatioSources {
            income_statement: &income_statement,
            balance_sheet: &balance_sheet,
            cash_flow: &cash_flow,
            equity: &equity_schedule,
        },
        a.tax.tax_rate,
        config.days_in_year,
    );
    credit_warnings(&income_statement, &ratios, &cash_flow, recorder);

    let summary = build_summary(
        &income_statement,
        &ratios,
        &cash_flow,
        &reconciliation,
        cash_flow_reconciled,
    );

    Ok(ProjectionOutput {
        income_statement,
        balance_sheet,
        cash_flow,
        debt_schedule,
        working_capital,
        ppe_schedule,
        equity_schedule,
        ratios,
        summary,
    })
}

/// Leverage, coverage and free cash flow flags for projected years.
fn credit_warnings(
    income_statement: &[IncomeStatementPeriod],
    ratios: &[RatioPeriod],
    cash_flow: &[CashFlowPeriod],
    recorder: &mut Recorder<'_>,
) {
    for ((is, r), cf) in income_statement
        .iter()
        .zip(ratios)
        .zip(cash_flow)
        .skip(1)
    {
        if is.ebitda > Decimal::ZERO && r.debt_to_ebitda > LEVERAGE_WARNING {
            recorder.emit(
                Diagnostic::new(
                    Severity::Warning,
                    DiagnosticCode::HighLeverage,
                    format!(
                        "leverage ratio {:.1}x exceeds 6.0x threshold",
                        r.debt_to_ebitda
                    ),
                )
                .in_period(is.period)
                .with_amount(r.debt_to_ebitda),
            );
        }
        if is.interest_expense > Decimal::ZERO && r.interest_coverage < COVERAGE_WARNING {
            recorder.emit(
                Diagnostic::new(
                    Severity::Warning,
                    DiagnosticCode::LowInterestCoverage,
                    format!(
                        "interest coverage ratio {:.2}x below 2.0x minimum",
                        r.interest_coverage
                    ),
                )
                .in_period(is.period)
                .with_amount(r.interest_coverage),
            );
        }
        if cf.free_cash_flow < Decimal::ZERO {
            recorder.emit(
                Diagnostic::new(
                    Severity::Warning,
                    DiagnosticCode::NegativeFreeCashFlow,
                    format!("negative free cash flow ({})", cf.free_cash_flow),
                )
                .in_period(is.period)
                .with_amount(cf.free_cash_flow),
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::{CollectingSink, NullSink};
    use crate::three_statement::assumptions::tests::sample_assumptions;
    use crate::three_statement::assumptions::DividendPolicy;

    fn run(a: Assumptions) -> ProjectionOutput {
        let config = EngineConfig::default();
        let validated = ValidatedAssumptions::new(a, &config).unwrap();
        run_projection(&validated, &config, &NullSink).unwrap()
    }

    #[test]
    fn test_schedules_have_n_plus_one_rows() {
        let out = run(sample_assumptions());
        assert_eq!(out.income_statement.len(), 6);
        assert_eq!(out.balance_sheet.len(), 6);
        assert_eq!(out.cash_flow.len(), 6);
        assert_eq!(out.debt_schedule.len(), 6);
        assert_eq!(out.working_capital.len(), 6);
        assert_eq!(out.ppe_schedule.len(), 6);
        assert_eq!(out.equity_schedule.len(), 6);
        assert_eq!(out.ratios.len(), 6);
        assert_eq!(out.balance_sheet[0].label, "Historical");
        assert_eq!(out.balance_sheet[5].label, "Year 5");
    }

    #[test]
    fn test_balance_sheet_balances() {
        let out = run(sample_assumptions());
        for bs in &out.balance_sheet {
            let diff = (bs.total_assets - bs.total_liabilities - bs.total_equity).abs();
            assert!(
                diff < dec!(0.01),
                "Year {}: BS does not balance, diff = {}",
                bs.period,
                diff
            );
        }
        assert!(out.summary.is_balanced);
        assert_eq!(out.balance_sheet[0].total_assets, dec!(900));
    }

    #[test]
    fn test_consistent_model_needs_no_plug() {
        let out = run(sample_assumptions());
        assert!(
            out.summary.total_cash_plug < dec!(0.01),
            "unexpected plug {}",
            out.summary.total_cash_plug
        );
    }

    #[test]
    fn test_cash_flow_ties_to_balance_sheet() {
        let out = run(sample_assumptions());
        assert!(out.summary.cash_flow_reconciled);
        for i in 1..out.cash_flow.len() {
            assert_eq!(out.cash_flow[i].beginning_cash, out.cash_flow[i - 1].ending_cash);
            assert!(out.cash_flow[i].discrepancy.abs() < dec!(0.01));
        }
    }

    #[test]
    fn test_income_statement_ties_to_equity() {
        let out = run(sample_assumptions());
        for i in 1..out.equity_schedule.len() {
            assert_eq!(
                out.equity_schedule[i].net_income,
                out.income_statement[i].net_income
            );
            assert_eq!(
                out.equity_schedule[i].retained_earnings - out.equity_schedule[i - 1].retained_earnings,
                out.income_statement[i].net_income - out.equity_schedule[i].dividends
            );
        }
    }

    #[test]
    fn test_da_ties_between_statements() {
        let out = run(sample_assumptions());
        for i in 0..out.ppe_schedule.len() {
            assert_eq!(
                out.ppe_schedule[i].depreciation,
                out.income_statement[i].depreciation_amortization
            );
        }
    }

    #[test]
    fn test_interest_ties_to_debt_schedule() {
        let out = run(sample_assumptions());
        for i in 1..out.debt_schedule.len() {
            assert_eq!(
                out.income_statement[i].interest_expense,
                out.debt_schedule[i].interest_expense
            );
            assert_eq!(
                out.income_statement[i].interest_income,
                out.debt_schedule[i].interest_income
            );
        }
        // Period 1 earns on historical cash
        assert_eq!(out.income_statement[1].interest_income, dec!(1.6));
    }

    #[test]
    fn test_payout_dividends() {
        let out = run(sample_assumptions());
        let y1 = &out.equity_schedule[1];
        assert_eq!(y1.dividends, y1.net_income * dec!(0.20));
        assert_eq!(y1.buybacks, dec!(5));
    }

    #[test]
    fn test_revolver_draws_when_cash_is_short() {
        let mut a = sample_assumptions();
        a.historical.cash = dec!(50);
        a.equity.dividend_policy = DividendPolicy::PerShare(dec!(1.5));
        let out = run(a);

        assert!(out.debt_schedule.iter().any(|d| d.revolver_draw > Decimal::ZERO));
        for d in &out.debt_schedule {
            assert!(d.revolver_ending >= Decimal::ZERO);
            assert!(d.revolver_ending <= dec!(50));
        }
        assert!(out.summary.is_balanced);
        assert!(out.summary.cash_flow_reconciled);
    }

    #[test]
    fn test_exhausted_revolver_plugs_cash_floor() {
        let mut a = sample_assumptions();
        a.historical.cash = dec!(50);
        a.debt.revolver_size = dec!(5);
        a.equity.dividend_policy = DividendPolicy::PerShare(dec!(2));
        let config = EngineConfig::default();
        let validated = ValidatedAssumptions::new(a, &config).unwrap();
        let sink = CollectingSink::new();
        let out = run_projection(&validated, &config, &sink).unwrap();

        assert!(!sink.with_code(DiagnosticCode::CashFloorShortfall).is_empty());
        assert!(!sink.with_code(DiagnosticCode::CashPlug).is_empty());
        assert!(out.summary.total_cash_plug > Decimal::ZERO);
        assert!(out.summary.is_balanced);
        assert!(out.summary.cash_flow_reconciled);

        // The floor is a target; reported ending cash is what was funded
        let year_1 = &out.debt_schedule[1];
        assert_eq!(year_1.target_cash, dec!(50));
        assert!(year_1.ending_cash < year_1.target_cash);
        assert_eq!(year_1.ending_cash, out.balance_sheet[1].cash);
        for w in out.debt_schedule.windows(2) {
            assert!(
                (w[1].beginning_cash - w[0].ending_cash).abs() < dec!(0.01),
                "Year {}: debt schedule cash does not roll forward",
                w[1].period
            );
        }
    }

    #[test]
    fn test_horizon_rechecked_against_run_config() {
        let validated =
            ValidatedAssumptions::new(sample_assumptions(), &EngineConfig::default()).unwrap();
        let stricter = EngineConfig {
            max_projection_years: 3,
            ..EngineConfig::default()
        };
        match run_projection(&validated, &stricter, &NullSink).unwrap_err() {
            ModelError::InvalidInput { field, .. } => assert_eq!(field, "projection_years"),
            e => panic!("Expected InvalidInput, got {e:?}"),
        }
    }

    #[test]
    fn test_nol_shields_tax_then_runs_out() {
        let mut a = sample_assumptions();
        a.tax.nol_carryforward = dec!(100);
        let sink = CollectingSink::new();
        let config = EngineConfig::default();
        let validated = ValidatedAssumptions::new(a, &config).unwrap();
        let out = run_projection(&validated, &config, &sink).unwrap();

        assert_eq!(out.income_statement[1].taxes, Decimal::ZERO);
        for w in out.income_statement.windows(2) {
            assert!(w[1].nol_ending <= w[0].nol_ending);
            assert!(w[1].nol_ending >= Decimal::ZERO);
        }
        assert_eq!(sink.with_code(DiagnosticCode::NolExhausted).len(), 1);
    }

    #[test]
    fn test_iterative_mode_balances() {
        let mut config = EngineConfig::default();
        config.circularity = CircularityMode::iterative();
        let validated = ValidatedAssumptions::new(sample_assumptions(), &config).unwrap();
        let out = run_projection(&validated, &config, &NullSink).unwrap();

        assert!(out.summary.is_balanced);
        assert!(out.summary.cash_flow_reconciled);
        assert!(out.debt_schedule[1..].iter().all(|d| d.iterations >= 1));
        assert!(out.debt_schedule[1..]
            .iter()
            .all(|d| d.carried_interest_income.is_zero()));
    }

    #[test]
    fn test_envelope_metadata_and_warnings() {
        let mut a = sample_assumptions();
        a.historical.total_debt = dec!(1000);
        a.debt.term_debt_balance = dec!(1000);
        a.debt.annual_amortization = dec!(0);
        a.debt.term_debt_rate = dec!(0.12);
        let request = ProjectionRequest {
            assumptions: a,
            config: EngineConfig::default(),
        };
        let result = build_three_statement_model_with_sink(&request, &NullSink).unwrap();

        assert!(result.methodology.contains("Single-Pass"));
        assert!(result.warnings.iter().any(|w| w.contains("leverage")));
        assert!(result.warnings.iter().any(|w| w.contains("interest coverage")));
        assert!(result.warnings.iter().all(|w| w.starts_with("Year ")));
    }

    #[test]
    fn test_invalid_request_rejected() {
        let mut a = sample_assumptions();
        a.historical.shares_outstanding = Decimal::ZERO;
        let request = ProjectionRequest {
            assumptions: a,
            config: EngineConfig::default(),
        };
        match build_three_statement_model(&request).unwrap_err() {
            ModelError::InvalidInput { field, .. } => {
                assert_eq!(field, "historical.shares_outstanding")
            }
            e => panic!("Expected InvalidInput, got {e:?}"),
        }
    }

    #[test]
    fn test_request_config_defaults_when_omitted() {
        let json = serde_json::json!({ "assumptions": sample_assumptions() });
        let request: ProjectionRequest = serde_json::from_value(json).unwrap();
        assert_eq!(request.config.tolerance, dec!(0.01));
        assert_eq!(request.config.circularity, CircularityMode::SinglePass);
    }
}
