pub mod config;
pub mod diagnostics;
pub mod error;
pub mod types;

#[cfg(feature = "three_statement")]
pub mod three_statement;

pub use config::{CircularityMode, EngineConfig};
pub use diagnostics::{
    CollectingSink, Diagnostic, DiagnosticCode, DiagnosticsSink, LogSink, NullSink, Severity,
};
pub use error::ModelError;
pub use types::*;

/// Standard result type for all projection operations
pub type ModelResult<T> = Result<T, ModelError>;
