//! Structured diagnostics emitted while a projection runs.
//!
//! The engine never prints. Every notable event (anchor adjustments, cash
//! plugs, revolver capacity limits, convergence results) is handed to a
//! caller-supplied [`DiagnosticsSink`]. [`LogSink`] forwards to the `log`
//! facade and is what the public entry points use by default.

use std::sync::Mutex;

use log::{debug, error, info, warn};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Debug,
    Info,
    Warning,
    Error,
}

/// Machine-readable event kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticCode {
    HistoricalAnchor,
    OpeningEquityBackfill,
    CashPlug,
    RevolverCapacityReached,
    CashFloorShortfall,
    NolExhausted,
    CircularityConverged,
    CircularityNotConverged,
    CashFlowMismatch,
    HighLeverage,
    LowInterestCoverage,
    NegativeFreeCashFlow,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: DiagnosticCode,
    /// Period index, when the event belongs to one period
    pub period: Option<usize>,
    pub message: String,
    /// Size of the adjustment or value that triggered the event
    pub amount: Option<Decimal>,
}

impl Diagnostic {
    pub fn new(severity: Severity, code: DiagnosticCode, message: impl Into<String>) -> Self {
        Diagnostic {
            severity,
            code,
            period: None,
            message: message.into(),
            amount: None,
        }
    }

    pub fn in_period(mut self, period: usize) -> Self {
        self.period = Some(period);
        self
    }

    pub fn with_amount(mut self, amount: Decimal) -> Self {
        self.amount = Some(amount);
        self
    }
}

/// Receiver for engine diagnostics. Implementations must be shareable across
/// threads so independent projections can run concurrently.
pub trait DiagnosticsSink: Send + Sync {
    fn record(&self, diagnostic: &Diagnostic);
}

/// Forwards diagnostics to the `log` facade under the `finmodel` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl DiagnosticsSink for LogSink {
    fn record(&self, d: &Diagnostic) {
        let period = d
            .period
            .map(|p| format!(" [period {p}]"))
            .unwrap_or_default();
        let amount = d.amount.map(|a| format!(" ({a})")).unwrap_or_default();
        match d.severity {
            Severity::Debug => debug!(target: "finmodel", "{:?}{period}: {}{amount}", d.code, d.message),
            Severity::Info => info!(target: "finmodel", "{:?}{period}: {}{amount}", d.code, d.message),
            Severity::Warning => warn!(target: "finmodel", "{:?}{period}: {}{amount}", d.code, d.message),
            Severity::Error => error!(target: "finmodel", "{:?}{period}: {}{amount}", d.code, d.message),
        }
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl DiagnosticsSink for NullSink {
    fn record(&self, _diagnostic: &Diagnostic) {}
}

/// Keeps every diagnostic in memory, in emission order.
#[derive(Debug, Default)]
pub struct CollectingSink {
    events: Mutex<Vec<Diagnostic>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Diagnostic> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn with_code(&self, code: DiagnosticCode) -> Vec<Diagnostic> {
        self.events()
            .into_iter()
            .filter(|d| d.code == code)
            .collect()
    }
}

impl DiagnosticsSink for CollectingSink {
    fn record(&self, diagnostic: &Diagnostic) {
        match self.events.lock() {
            Ok(mut events) => events.push(diagnostic.clone()),
            Err(poisoned) => poisoned.into_inner().push(diagnostic.clone()),
        }
    }
}

/// Fan-out used inside the engine: forwards to the caller's sink and keeps
/// warning-level messages for the output envelope.
pub(crate) struct Recorder<'a> {
    sink: &'a dyn DiagnosticsSink,
    warnings: Vec<String>,
}

impl<'a> Recorder<'a> {
    pub(crate) fn new(sink: &'a dyn DiagnosticsSink) -> Self {
        Recorder {
            sink,
            warnings: Vec::new(),
        }
    }

    pub(crate) fn emit(&mut self, diagnostic: Diagnostic) {
        if diagnostic.severity >= Severity::Warning {
            let prefix = diagnostic
                .period
                .map(|p| format!("Year {p}: "))
                .unwrap_or_default();
            self.warnings.push(format!("{prefix}{}", diagnostic.message));
        }
        self.sink.record(&diagnostic);
    }

    pub(crate) fn into_warnings(self) -> Vec<String> {
        self.warnings
    }
}
