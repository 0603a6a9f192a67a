//! Integrated income statement, balance sheet and cash flow projection.
//!
//! Schedules are built period by period from [`assumptions::Assumptions`],
//! reconciled so every balance sheet balances, and cross-checked against the
//! cash flow statement. Entry points live in [`model`].

pub mod assumptions;
pub mod balance_sheet;
pub mod cash_flow;
pub mod debt;
pub mod equity;
pub mod income_statement;
pub mod model;
pub mod ppe;
pub mod ratios;
pub mod working_capital;

pub use assumptions::{validate_assumptions, Assumptions, ValidatedAssumptions};
pub use model::{
    build_three_statement_model, build_three_statement_model_with_sink, run_projection,
    ProjectionOutput, ProjectionRequest,
};
pub use ratios::{compute_cagr, ProjectionSummary};
