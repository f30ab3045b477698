//! The test-unit execution contract.
//!
//! A unit runs against the worker's bound endpoint and reports through
//! the sink it is handed. Units signal failure through [`UnitError`];
//! only [`UnitError::Unreachable`] is fatal to the worker.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use rig_core::TransportError;

/// Failure message reported for units declared not executed after an
/// early abort.
pub const NOT_EXECUTED_FAILURE: &str = "unit was not executed";

pub type UnitResult<T> = Result<T, UnitError>;

/// Errors a test unit can raise.
#[derive(Debug, Error)]
pub enum UnitError {
    /// Ordinary failure: an assertion failure or a reporting-level
    /// runtime fault. Absorbed by the worker; the loop continues.
    #[error("unit failed: {0}")]
    Failed(String),

    /// The bound endpoint became unreachable mid-unit. Fatal: drives
    /// the worker's recovery-or-propagate protocol and is never
    /// silently swallowed.
    #[error("endpoint {serial} unreachable: {reason}")]
    Unreachable { serial: String, reason: String },

    /// The unit was misconfigured by its caller. Not retried.
    #[error("invalid unit configuration: {0}")]
    InvalidConfiguration(String),
}

impl From<TransportError> for UnitError {
    fn from(error: TransportError) -> Self {
        match error {
            TransportError::Unreachable(serial) => UnitError::Unreachable {
                serial,
                reason: "transport lost".to_string(),
            },
            other => UnitError::Failed(other.to_string()),
        }
    }
}

/// Receives run lifecycle callbacks from executing units.
pub trait ReportingSink: Send {
    fn run_started(&mut self, name: &str, unit_count: u32);
    fn run_failed(&mut self, message: &str);
    fn run_ended(&mut self, elapsed: Duration);
}

/// One executable unit of test work.
#[async_trait]
pub trait TestUnit: Send + Sync {
    /// Name used in diagnostics.
    fn name(&self) -> &str;

    /// Execute against the bound endpoint, reporting through `sink`.
    async fn run(&mut self, sink: &mut dyn ReportingSink) -> UnitResult<()>;

    /// Declare the work this unit would have covered as not executed,
    /// emitting synthetic failed-run records. Default: the unit has
    /// nothing to declare.
    fn report_not_executed(&self, sink: &mut dyn ReportingSink) {
        let _ = sink;
    }
}
