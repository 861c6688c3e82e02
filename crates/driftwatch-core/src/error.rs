use thiserror::Error;

use crate::report::DriftReport;

/// Core error type shared across driftwatch crates.
#[derive(Debug, Error)]
pub enum Error {
    /// The batch violates structural invariants (duplicate or ragged columns).
    #[error("invalid batch: {0}")]
    InvalidBatch(String),
}

/// Convenience alias for results returned by driftwatch crates.
pub type Result<T> = std::result::Result<T, Error>;

/// Raised by the strict-mode gate when drift is detected.
///
/// Carries the full report so callers can log or alert without
/// recomputing the comparison.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ValidationError {
    message: String,
    report: Box<DriftReport>,
}

impl ValidationError {
    pub(crate) fn strict_drift(report: DriftReport) -> Self {
        Self {
            message: format!(
                "Schema drift detected for {} in strict mode",
                report.table_name()
            ),
            report: Box::new(report),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// The report that triggered the failure.
    pub fn report(&self) -> &DriftReport {
        &self.report
    }

    pub fn into_report(self) -> DriftReport {
        *self.report
    }
}
