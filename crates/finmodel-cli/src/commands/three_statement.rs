use clap::{Args, ValueEnum};
use log::info;
use serde_json::{json, Value};

use finmodel_core::three_statement::{
    build_three_statement_model, ProjectionRequest, ValidatedAssumptions,
};
use finmodel_core::{CircularityMode, EngineConfig};

use crate::input;

/// Arguments for the full three-statement projection
#[derive(Args)]
pub struct ProjectArgs {
    /// Path to a JSON or YAML request file (reads stdin when omitted)
    #[arg(long)]
    pub input: Option<String>,

    /// Path to an engine config file; replaces the request's `config` section
    #[arg(long)]
    pub config: Option<String>,

    /// Resolve the revolver / interest loop by bounded iteration
    #[arg(long)]
    pub iterate: bool,

    /// Iteration cap when --iterate is set
    #[arg(long, default_value_t = 3, requires = "iterate")]
    pub max_iterations: u32,

    /// Print a single schedule instead of the whole model
    #[arg(long, value_enum)]
    pub schedule: Option<Schedule>,
}

/// Arguments for assumption validation
#[derive(Args)]
pub struct ValidateArgs {
    /// Path to a JSON or YAML request file (reads stdin when omitted)
    #[arg(long)]
    pub input: Option<String>,

    /// Path to an engine config file; replaces the request's `config` section
    #[arg(long)]
    pub config: Option<String>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum Schedule {
    IncomeStatement,
    BalanceSheet,
    CashFlow,
    Debt,
    WorkingCapital,
    Ppe,
    Equity,
    Ratios,
    Summary,
}

impl Schedule {
    fn key(self) -> &'static str {
        match self {
            Schedule::IncomeStatement => "income_statement",
            Schedule::BalanceSheet => "balance_sheet",
            Schedule::CashFlow => "cash_flow",
            Schedule::Debt => "debt_schedule",
            Schedule::WorkingCapital => "working_capital",
            Schedule::Ppe => "ppe_schedule",
            Schedule::Equity => "equity_schedule",
            Schedule::Ratios => "ratios",
            Schedule::Summary => "summary",
        }
    }
}

pub fn run_project(args: ProjectArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let mut request = load_request(args.input.as_deref(), args.config.as_deref())?;
    if args.iterate {
        request.config.circularity = CircularityMode::iterative_with(args.max_iterations);
    }
    info!(
        "projecting {} years ({:?})",
        request.assumptions.projection_years, request.config.circularity
    );

    let result = build_three_statement_model(&request)?;
    let mut value = serde_json::to_value(result)?;

    if let Some(schedule) = args.schedule {
        let selected = value
            .get_mut("result")
            .and_then(|r| r.get_mut(schedule.key()))
            .map(Value::take)
            .ok_or_else(|| format!("schedule '{}' missing from output", schedule.key()))?;
        if let Some(result) = value.get_mut("result") {
            *result = selected;
        }
    }
    Ok(value)
}

pub fn run_validate(args: ValidateArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let request = load_request(args.input.as_deref(), args.config.as_deref())?;
    let years = request.assumptions.projection_years;
    let validated = ValidatedAssumptions::new(request.assumptions, &request.config)?;
    Ok(json!({
        "result": {
            "valid": true,
            "projection_years": years,
            "opening_revolver": validated.opening_revolver(),
        }
    }))
}

fn load_request(
    path: Option<&str>,
    config_path: Option<&str>,
) -> Result<ProjectionRequest, Box<dyn std::error::Error>> {
    let mut request: ProjectionRequest = if let Some(path) = path {
        input::file::read_document(path)?
    } else if let Some(data) = input::stdin::read_stdin()? {
        serde_json::from_value(data)?
    } else {
        return Err("--input <file.json|file.yaml> or stdin required for projection".into());
    };

    if let Some(path) = config_path {
        let config: EngineConfig = input::file::read_document(path)?;
        request.config = config;
    }
    Ok(request)
}
