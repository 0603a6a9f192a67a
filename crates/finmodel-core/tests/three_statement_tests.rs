use finmodel_core::three_statement::assumptions::{
    Assumptions, DebtTerms, DividendPolicy, EquityPolicy, GlidePath, HistoricalFinancials,
    OperatingDrivers, TaxPolicy, WorkingCapitalDrivers,
};
use finmodel_core::three_statement::{
    build_three_statement_model, build_three_statement_model_with_sink, compute_cagr,
    run_projection, ProjectionOutput, ProjectionRequest, ValidatedAssumptions,
};
use finmodel_core::{
    CircularityMode, CollectingSink, DiagnosticCode, EngineConfig, ModelError, NullSink,
};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

// ===========================================================================
// Fixtures
// ===========================================================================

/// Revenue 1000, gross margin 35% -> 38%, SG&A 20% -> 18%, 25% tax,
/// 200 of term debt at 6%, a 50 revolver and a 50 cash floor.
fn industrial() -> Assumptions {
    Assumptions {
        historical: HistoricalFinancials {
            revenue: dec!(1000),
            cogs_margin: dec!(0.65),
            sga: dec!(200),
            rnd: dec!(30),
            depreciation_amortization: dec!(40),
            interest_expense: dec!(12),
            net_income: dec!(60),
            total_assets: dec!(900),
            total_debt: dec!(200),
            cash: dec!(80),
            total_equity: dec!(400),
            shares_outstanding: dec!(100),
            ppe_net: dec!(300),
            intangibles: dec!(50),
            goodwill: dec!(100),
            other_long_term_assets: dec!(20),
            other_long_term_liabilities: dec!(30),
            common_stock: dec!(10),
        },
        operating: OperatingDrivers {
            revenue_growth_rates: vec![dec!(0.08), dec!(0.07), dec!(0.06), dec!(0.05), dec!(0.05)],
            gross_margin: GlidePath {
                base: dec!(0.35),
                target: dec!(0.38),
            },
            sga_pct: GlidePath {
                base: dec!(0.20),
                target: dec!(0.18),
            },
            rnd_pct: dec!(0.03),
            da_pct: dec!(0.04),
            capex_pct: vec![dec!(0.05); 5],
            stock_comp_pct: dec!(0.01),
        },
        working_capital: WorkingCapitalDrivers {
            dso_days: 45,
            dio_days: 60,
            dpo_days: 40,
            prepaid_pct_revenue: dec!(0.01),
            other_current_assets_pct_revenue: dec!(0.02),
            accrued_pct_opex: dec!(0.10),
            other_current_liabilities_pct_revenue: dec!(0.01),
        },
        debt: DebtTerms {
            term_debt_balance: dec!(200),
            term_debt_rate: dec!(0.06),
            annual_amortization: dec!(20),
            revolver_size: dec!(50),
            revolver_rate: dec!(0.07),
            commitment_fee_rate: dec!(0.005),
            minimum_cash: dec!(50),
            interest_on_cash_rate: dec!(0.02),
        },
        tax: TaxPolicy {
            tax_rate: dec!(0.25),
            nol_carryforward: Decimal::ZERO,
        },
        equity: EquityPolicy {
            dividend_policy: DividendPolicy::PayoutRatio(dec!(0.30)),
            annual_buyback: dec!(5),
        },
        projection_years: 5,
    }
}

fn project(a: Assumptions, config: &EngineConfig) -> ProjectionOutput {
    let validated = ValidatedAssumptions::new(a, config).unwrap();
    run_projection(&validated, config, &NullSink).unwrap()
}

fn assert_invariants(out: &ProjectionOutput, historical_total_assets: Decimal, revolver_size: Decimal) {
    for bs in &out.balance_sheet {
        let diff = (bs.total_assets - (bs.total_liabilities + bs.total_equity)).abs();
        assert!(
            diff <= dec!(0.01),
            "Year {}: BS does not balance, diff = {}",
            bs.period,
            diff
        );
    }
    assert!(
        (out.balance_sheet[0].total_assets - historical_total_assets).abs() <= dec!(0.01),
        "Opening total assets {} do not match {}",
        out.balance_sheet[0].total_assets,
        historical_total_assets
    );
    for w in out.cash_flow.windows(2) {
        assert!(
            (w[1].beginning_cash - w[0].ending_cash).abs() <= dec!(0.01),
            "Year {}: cash flow does not roll forward",
            w[1].period
        );
    }
    for w in out.debt_schedule.windows(2) {
        assert!(
            (w[1].beginning_cash - w[0].ending_cash).abs() <= dec!(0.01),
            "Year {}: debt schedule cash does not roll forward",
            w[1].period
        );
    }
    for (d, bs) in out.debt_schedule.iter().zip(&out.balance_sheet) {
        assert_eq!(d.ending_cash, bs.cash, "Year {}: debt cash off the balance sheet", d.period);
    }
    for d in &out.debt_schedule {
        assert!(
            d.revolver_ending >= Decimal::ZERO && d.revolver_ending <= revolver_size,
            "Year {}: revolver {} outside [0, {}]",
            d.period,
            d.revolver_ending,
            revolver_size
        );
    }
    for w in out.income_statement.windows(2) {
        assert!(w[1].nol_ending <= w[0].nol_ending);
        assert!(w[1].nol_ending >= Decimal::ZERO);
    }
}

// ===========================================================================
// End-to-end
// ===========================================================================

#[test]
fn test_industrial_five_year_projection() {
    let request = ProjectionRequest {
        assumptions: industrial(),
        config: EngineConfig::default(),
    };
    let result = build_three_statement_model(&request).unwrap();
    let out = &result.result;

    assert!(out.summary.is_balanced);
    assert!(out.summary.cash_flow_reconciled);
    assert_eq!(out.summary.projection_years, 5);
    assert_invariants(out, dec!(900), dec!(50));

    // Year-5 EBITDA margin lies between the base-mix floor (35 - 20 - 3)
    // and the target gross margin
    let margin = out.income_statement[5].ebitda_margin;
    assert!(
        margin > dec!(0.12) && margin < dec!(0.38),
        "Year 5 EBITDA margin {margin} out of bounds"
    );
    assert_eq!(out.income_statement[5].gross_margin, dec!(0.38));
    assert_eq!(out.income_statement[5].sga_pct, dec!(0.18));
}

#[test]
fn test_revenue_compounds_from_history() {
    let out = project(industrial(), &EngineConfig::default());
    let mut expected = dec!(1000);
    for (i, g) in industrial().operating.revenue_growth_rates.iter().enumerate() {
        expected *= Decimal::ONE + g;
        assert_eq!(out.income_statement[i + 1].revenue, expected);
    }
}

#[test]
fn test_revenue_cagr_matches_closed_form() {
    let mut a = industrial();
    a.historical.revenue = dec!(100);
    a.operating.revenue_growth_rates = vec![dec!(0.10); 5];
    let out = project(a, &EngineConfig::default());

    assert_eq!(out.income_statement[5].revenue, dec!(161.051));
    assert!(
        (out.summary.revenue_cagr - dec!(0.10)).abs() < dec!(0.000001),
        "revenue CAGR {}",
        out.summary.revenue_cagr
    );
    assert!((compute_cagr(dec!(100), dec!(161.051), 5) - dec!(0.10)).abs() < dec!(0.000001));
}

#[test]
fn test_hypergrowth_decade_summarises_without_overflow() {
    let mut a = industrial();
    a.projection_years = 10;
    a.operating.revenue_growth_rates = vec![dec!(2); 10];
    a.operating.capex_pct = vec![dec!(0.05); 10];
    let request = ProjectionRequest {
        assumptions: a,
        config: EngineConfig::default(),
    };
    let result = build_three_statement_model(&request).unwrap();
    let out = &result.result;

    assert_eq!(out.income_statement[10].revenue, dec!(59049000));
    assert!(
        (out.summary.revenue_cagr - dec!(2)).abs() < dec!(0.000001),
        "revenue CAGR {}",
        out.summary.revenue_cagr
    );
    assert!(out.summary.ebitda_cagr > Decimal::ONE);
    assert_invariants(out, dec!(900), dec!(50));
}

#[test]
fn test_summary_aggregates() {
    let out = project(industrial(), &EngineConfig::default());
    let cumulative: Decimal = out.cash_flow.iter().map(|c| c.free_cash_flow).sum();
    assert_eq!(out.summary.cumulative_fcf, cumulative);

    let avg: Decimal = out.income_statement[1..]
        .iter()
        .map(|p| p.ebitda_margin)
        .sum::<Decimal>()
        / dec!(5);
    assert_eq!(out.summary.avg_ebitda_margin, avg);
    assert_eq!(
        out.summary.ending_debt_to_ebitda,
        out.ratios[5].debt_to_ebitda
    );
}

#[test]
fn test_fcf_and_fcfe_lines() {
    let out = project(industrial(), &EngineConfig::default());
    for cf in &out.cash_flow[1..] {
        assert_eq!(cf.free_cash_flow, cf.cash_from_operations - cf.capex);
        assert_eq!(
            cf.free_cash_flow_to_equity,
            cf.free_cash_flow - cf.term_debt_repayment + cf.revolver_net_change
        );
    }
}

// ===========================================================================
// Determinism and modes
// ===========================================================================

#[test]
fn test_projection_is_idempotent() {
    let config = EngineConfig::default();
    let validated = ValidatedAssumptions::new(industrial(), &config).unwrap();
    let first = run_projection(&validated, &config, &NullSink).unwrap();
    let second = run_projection(&validated, &config, &NullSink).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_iterative_mode_holds_invariants() {
    let config = EngineConfig {
        circularity: CircularityMode::Iterative {
            max_iterations: 10,
            tolerance: dec!(0.000001),
        },
        ..EngineConfig::default()
    };
    let out = project(industrial(), &config);
    assert!(out.summary.is_balanced);
    assert!(out.summary.cash_flow_reconciled);
    assert_invariants(&out, dec!(900), dec!(50));
}

#[test]
fn test_iterative_and_single_pass_agree_closely() {
    let single = project(industrial(), &EngineConfig::default());
    let iterative = project(
        industrial(),
        &EngineConfig {
            circularity: CircularityMode::iterative(),
            ..EngineConfig::default()
        },
    );
    for (s, i) in single.income_statement.iter().zip(&iterative.income_statement) {
        assert!(
            (s.net_income - i.net_income).abs() < dec!(1),
            "Year {}: single-pass {} vs iterative {}",
            s.period,
            s.net_income,
            i.net_income
        );
    }
}

// ===========================================================================
// Stress cases
// ===========================================================================

#[test]
fn test_revolver_capacity_and_cash_plug_reported() {
    let mut a = industrial();
    a.historical.cash = dec!(50);
    a.equity.dividend_policy = DividendPolicy::PerShare(dec!(2));
    let request = ProjectionRequest {
        assumptions: a,
        config: EngineConfig::default(),
    };
    let sink = CollectingSink::new();
    let result = build_three_statement_model_with_sink(&request, &sink).unwrap();
    let out = &result.result;

    assert!(!sink.with_code(DiagnosticCode::RevolverCapacityReached).is_empty());
    let plugs = sink.with_code(DiagnosticCode::CashPlug);
    assert!(!plugs.is_empty());
    let reported: Decimal = plugs.iter().filter_map(|d| d.amount).map(|a| a.abs()).sum();
    assert_eq!(reported, out.summary.total_cash_plug);
    let on_rows: Decimal = out.balance_sheet.iter().map(|b| b.cash_plug.abs()).sum();
    assert_eq!(on_rows, out.summary.total_cash_plug);
    assert!(result.warnings.iter().any(|w| w.contains("revolver fully drawn")));
    assert_invariants(out, dec!(900), dec!(50));
}

#[test]
fn test_loss_making_company_keeps_nol() {
    let mut a = industrial();
    a.operating.sga_pct = GlidePath {
        base: dec!(0.34),
        target: dec!(0.34),
    };
    a.tax.nol_carryforward = dec!(40);
    a.equity.dividend_policy = DividendPolicy::PayoutRatio(dec!(0.5));
    let out = project(a, &EngineConfig::default());

    for is in &out.income_statement[1..] {
        assert!(is.ebt < Decimal::ZERO);
        assert_eq!(is.taxes, Decimal::ZERO);
        assert_eq!(is.nol_ending, dec!(40));
    }
    // Payout applies to positive earnings only
    assert!(out.equity_schedule[1..].iter().all(|e| e.dividends.is_zero()));
    assert!(out.summary.is_balanced);
}

#[test]
fn test_historical_anchor_reported() {
    let mut a = industrial();
    a.historical.total_assets = dec!(1200);
    let sink = CollectingSink::new();
    let config = EngineConfig::default();
    let validated = ValidatedAssumptions::new(a, &config).unwrap();
    let out = run_projection(&validated, &config, &sink).unwrap();

    assert_eq!(out.balance_sheet[0].total_assets, dec!(1200));
    let anchors = sink.with_code(DiagnosticCode::HistoricalAnchor);
    assert_eq!(anchors.len(), 1);
    assert_eq!(
        anchors[0].amount,
        Some(out.summary.historical_anchor_adjustment)
    );
    assert!(out.summary.cash_flow_reconciled);
}

// ===========================================================================
// Validation
// ===========================================================================

#[test]
fn test_mismatched_growth_vector_rejected() {
    let mut a = industrial();
    a.operating.revenue_growth_rates.pop();
    let err = ValidatedAssumptions::new(a, &EngineConfig::default()).unwrap_err();
    match err {
        ModelError::InvalidInput { field, .. } => {
            assert_eq!(field, "operating.revenue_growth_rates")
        }
        e => panic!("Expected InvalidInput, got {e:?}"),
    }
}

#[test]
fn test_revolver_over_facility_is_impossible() {
    let mut a = industrial();
    a.historical.total_debt = dec!(300);
    let err = ValidatedAssumptions::new(a, &EngineConfig::default()).unwrap_err();
    assert!(matches!(err, ModelError::FinancialImpossibility(_)));
}

#[test]
fn test_request_round_trips_through_json() {
    let request = ProjectionRequest {
        assumptions: industrial(),
        config: EngineConfig::default(),
    };
    let json = serde_json::to_string(&request).unwrap();
    let parsed: ProjectionRequest = serde_json::from_str(&json).unwrap();
    let a = project(request.assumptions, &request.config);
    let b = project(parsed.assumptions, &parsed.config);
    assert_eq!(a, b);
}

// ===========================================================================
// Properties
// ===========================================================================

fn pct(points: i64) -> Decimal {
    Decimal::new(points, 2)
}

prop_compose! {
    fn arb_assumptions()(
        years in 1usize..=6,
        growth in -20i64..=40,
        gm_base in 20i64..=60,
        gm_step in -5i64..=5,
        sga in 5i64..=30,
        tax in 0i64..=40,
        cash in 0i64..=200,
        min_cash in 0i64..=100,
        revolver in 0i64..=200,
        payout in 0i64..=100,
        nol in 0i64..=200,
        total_assets in 500i64..=2000,
    ) -> Assumptions {
        let mut a = industrial();
        a.projection_years = years;
        a.operating.revenue_growth_rates = vec![pct(growth); years];
        a.operating.capex_pct = vec![dec!(0.05); years];
        a.operating.gross_margin = GlidePath { base: pct(gm_base), target: pct(gm_base + gm_step) };
        a.operating.sga_pct = GlidePath { base: pct(sga), target: pct(sga) };
        a.tax.tax_rate = pct(tax);
        a.tax.nol_carryforward = Decimal::from(nol);
        a.historical.cash = Decimal::from(cash);
        a.historical.total_assets = Decimal::from(total_assets);
        a.debt.minimum_cash = Decimal::from(min_cash);
        a.debt.revolver_size = Decimal::from(revolver);
        a.equity.dividend_policy = DividendPolicy::PayoutRatio(pct(payout));
        a
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_invariants_hold(a in arb_assumptions()) {
        let total_assets = a.historical.total_assets;
        let revolver_size = a.debt.revolver_size;
        let out = project(a, &EngineConfig::default());
        prop_assert!(out.summary.is_balanced);
        prop_assert!(out.summary.cash_flow_reconciled);
        assert_invariants(&out, total_assets, revolver_size);
    }

    #[test]
    fn prop_iterative_mode_never_fails(a in arb_assumptions()) {
        let config = EngineConfig {
            circularity: CircularityMode::iterative(),
            ..EngineConfig::default()
        };
        let validated = ValidatedAssumptions::new(a, &config).unwrap();
        let out = run_projection(&validated, &config, &NullSink);
        prop_assert!(out.is_ok());
    }
}
