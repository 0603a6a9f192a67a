use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Invalid input: {field} — {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("Financial impossibility: {0}")]
    FinancialImpossibility(String),

    #[error("Invariant violation: {check} failed in periods {periods:?} (max imbalance: {max_imbalance})")]
    InvariantViolation {
        check: String,
        periods: Vec<usize>,
        max_imbalance: Decimal,
    },

    #[error("Cash flow mismatch in period {period}: cash flow statement ends at {cash_flow_cash}, balance sheet carries {balance_sheet_cash}")]
    CashFlowMismatch {
        period: usize,
        cash_flow_cash: Decimal,
        balance_sheet_cash: Decimal,
    },

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<serde_json::Error> for ModelError {
    fn from(e: serde_json::Error) -> Self {
        ModelError::SerializationError(e.to_string())
    }
}
