//! Calculator error types.
//!
//! Errors are categorized by where they surface:
//!
//! | Category | Variants | Recovery |
//! |----------|----------|----------|
//! | **Input** | `SyntaxError` | Fix the expression |
//! | **Transient** | `Busy`, `Timeout`, `BackendUnavailable` | Retry later |
//! | **Job failure** | `CircuitError`, `RegisterSizeError` | Fix circuit or bit width |
//! | **Config** | `Configuration` | Fix configuration |
//! | **Other** | `JobNotFound`, `Backend` | Resubmit |
//!
//! Nothing in this crate retries automatically.

use thiserror::Error;

/// Errors that can occur while computing an expression.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum CalcError {
    /// The expression could not be sequenced. No job was created.
    #[error("Syntax error: {0}")]
    SyntaxError(String),

    /// A computation is already in flight.
    #[error("Busy: a computation is already running")]
    Busy,

    /// The program was rejected as structurally invalid.
    #[error("Circuit error: {0}")]
    CircuitError(String),

    /// Register or qubit count does not fit the backend.
    #[error("Register size error: {0}")]
    RegisterSizeError(String),

    /// A synchronous wait exceeded its deadline. The backend may still finish.
    #[error("Timeout waiting for job {0}")]
    Timeout(String),

    /// The selected backend is not accepting jobs.
    #[error("Backend not available: {0}")]
    BackendUnavailable(String),

    /// Invalid configuration value.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The handle does not refer to the controller's current job.
    #[error("Job not found: {0}")]
    JobNotFound(String),

    /// Generic backend error.
    #[error("Backend error: {0}")]
    Backend(String),
}

impl CalcError {
    /// Returns `true` if the same request may succeed later without changes.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Busy | Self::Timeout(_) | Self::BackendUnavailable(_)
        )
    }

    /// Returns `true` for errors that terminate a submitted job.
    pub fn is_job_failure(&self) -> bool {
        matches!(self, Self::CircuitError(_) | Self::RegisterSizeError(_))
    }

    /// Fold a backend error reported at completion into a job failure.
    pub(crate) fn into_job_failure(self) -> Self {
        match self {
            Self::CircuitError(_) | Self::RegisterSizeError(_) => self,
            other => Self::CircuitError(other.to_string()),
        }
    }
}

/// Result type for calculator operations.
pub type CalcResult<T> = Result<T, CalcError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_errors() {
        assert!(CalcError::Busy.is_transient());
        assert!(CalcError::Timeout("job-1".into()).is_transient());
        assert!(CalcError::BackendUnavailable("offline".into()).is_transient());
        assert!(!CalcError::CircuitError("bad".into()).is_transient());
        assert!(!CalcError::SyntaxError("1+".into()).is_transient());
    }

    #[test]
    fn test_job_failure_classification() {
        let err = CalcError::Backend("socket closed".into()).into_job_failure();
        assert_eq!(
            err,
            CalcError::CircuitError("Backend error: socket closed".into())
        );

        let err = CalcError::RegisterSizeError("8 > 5".into()).into_job_failure();
        assert!(matches!(err, CalcError::RegisterSizeError(_)));
        assert!(err.is_job_failure());
    }

    #[test]
    fn test_error_display() {
        let err = CalcError::CircuitError("unsupported gate: ccx".into());
        assert_eq!(err.to_string(), "Circuit error: unsupported gate: ccx");
        assert_eq!(
            CalcError::Busy.to_string(),
            "Busy: a computation is already running"
        );
    }
}
