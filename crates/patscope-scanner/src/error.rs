use crate::orchestrator::RawContent;
use patscope_core::{ConfigError, CoreError, EngineAttempt, EngineId};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("all retrieval engines exhausted after {} attempts", .attempts.len())]
    Exhausted {
        attempts: Vec<EngineAttempt>,
        last_unvalidated: Option<RawContent>,
    },

    #[error("invalid extraction strategies: {0}")]
    Strategy(String),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("LLM error: {0}")]
    Llm(#[from] patscope_llm::LlmError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<CoreError> for ScanError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Validation(message) => ScanError::InvalidQuery(message),
            CoreError::Config(e) => ScanError::Config(e),
            CoreError::Io(e) => ScanError::Io(e),
        }
    }
}

impl ScanError {
    /// Short, stable category used as `error_kind` in reports.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            ScanError::InvalidQuery(_) => "invalid_query",
            ScanError::Exhausted { .. } => "exhausted_engines",
            ScanError::Strategy(_) => "invalid_strategies",
            ScanError::Config(_) => "config",
            ScanError::Llm(_) => "llm",
            ScanError::Io(_) => "io",
        }
    }

    /// Caller-facing error object.
    #[must_use]
    pub fn report(&self) -> ErrorReport {
        let per_engine_failures = match self {
            ScanError::Exhausted { attempts, .. } => attempts
                .iter()
                .filter(|a| !a.outcome.is_success())
                .map(EngineFailure::from)
                .collect(),
            _ => Vec::new(),
        };

        ErrorReport {
            error_kind: self.kind(),
            message: self.to_string(),
            per_engine_failures,
        }
    }
}

/// Serialized body returned to callers when a request fails.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorReport {
    pub error_kind: &'static str,
    pub message: String,
    pub per_engine_failures: Vec<EngineFailure>,
}

/// One failed engine invocation as reported to callers.
#[derive(Debug, Clone, Serialize)]
pub struct EngineFailure {
    pub engine: EngineId,
    pub cycle: u32,
    pub kind: &'static str,
    pub reason: String,
}

impl From<&EngineAttempt> for EngineFailure {
    fn from(attempt: &EngineAttempt) -> Self {
        Self {
            engine: attempt.engine,
            cycle: attempt.cycle,
            kind: attempt.outcome.kind(),
            reason: attempt.outcome.describe(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ScanError>;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use patscope_core::{AttemptOutcome, EngineFailureKind};

    fn attempt(engine: EngineId, cycle: u32, outcome: AttemptOutcome) -> EngineAttempt {
        EngineAttempt {
            engine,
            cycle,
            started_at: Utc::now(),
            elapsed_ms: 10,
            outcome,
        }
    }

    #[test]
    fn test_exhausted_report() {
        let err = ScanError::Exhausted {
            attempts: vec![
                attempt(
                    EngineId::Chromium,
                    1,
                    AttemptOutcome::Failure {
                        kind: EngineFailureKind::NavigationTimeout,
                        reason: "navigation timed out".to_string(),
                    },
                ),
                attempt(
                    EngineId::Http,
                    1,
                    AttemptOutcome::Rejected {
                        bytes: 512,
                        matched_markers: vec!["PCT".to_string()],
                    },
                ),
            ],
            last_unvalidated: None,
        };

        let report = err.report();
        assert_eq!(report.error_kind, "exhausted_engines");
        assert_eq!(report.message, "all retrieval engines exhausted after 2 attempts");
        assert_eq!(report.per_engine_failures.len(), 2);
        assert_eq!(report.per_engine_failures[0].kind, "navigation_timeout");
        assert_eq!(report.per_engine_failures[1].kind, "validation_failure");
        assert!(report.per_engine_failures[1].reason.contains("PCT"));

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["per_engine_failures"][0]["engine"], "chromium");
    }

    #[test]
    fn test_validation_error_maps_to_invalid_query() {
        let err = ScanError::from(CoreError::Validation("query must not be empty".to_string()));
        assert_eq!(err.kind(), "invalid_query");
        assert!(err.report().per_engine_failures.is_empty());
    }

    #[test]
    fn test_io_error_is_not_a_caller_error() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "strategies.toml");
        let err = ScanError::from(CoreError::Io(io));
        assert_eq!(err.kind(), "io");
        assert!(!matches!(err, ScanError::InvalidQuery(_)));
    }
}
