use patscope_core::{EngineFailureKind, EngineId};
use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{engine} failed to launch: {reason}")]
    Launch { engine: EngineId, reason: String },

    #[error("navigation to {url} timed out after {timeout:?}")]
    NavigationTimeout { url: String, timeout: Duration },

    #[error("selector '{selector}' did not appear within {timeout:?}")]
    SelectorTimeout { selector: String, timeout: Duration },

    #[error("navigation failed: {0}")]
    Navigation(String),

    #[error("HTTP {status} from {url}")]
    Http { status: u16, url: String },

    #[error("page content was empty")]
    EmptyContent,

    #[error("invalid search URL: {0}")]
    InvalidUrl(String),
}

impl EngineError {
    /// Failure category recorded in engine attempts.
    #[must_use]
    pub fn kind(&self) -> EngineFailureKind {
        match self {
            EngineError::Launch { .. } => EngineFailureKind::Launch,
            EngineError::NavigationTimeout { .. } => EngineFailureKind::NavigationTimeout,
            EngineError::SelectorTimeout { .. } => EngineFailureKind::SelectorTimeout,
            EngineError::Navigation(_) | EngineError::InvalidUrl(_) => {
                EngineFailureKind::Navigation
            }
            EngineError::Http { .. } => EngineFailureKind::Http,
            EngineError::EmptyContent => EngineFailureKind::EmptyContent,
        }
    }
}

impl From<patscope_core::ConfigError> for EngineError {
    fn from(err: patscope_core::ConfigError) -> Self {
        EngineError::InvalidUrl(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = EngineError::Navigation("net::ERR_NAME_NOT_RESOLVED".to_string());
        assert_eq!(err.to_string(), "navigation failed: net::ERR_NAME_NOT_RESOLVED");

        let err = EngineError::Launch {
            engine: EngineId::Chromium,
            reason: "no executable found".to_string(),
        };
        assert_eq!(err.to_string(), "chromium failed to launch: no executable found");
    }

    #[test]
    fn test_error_kind() {
        let err = EngineError::SelectorTimeout {
            selector: ".resultItem".to_string(),
            timeout: Duration::from_secs(15),
        };
        assert_eq!(err.kind(), EngineFailureKind::SelectorTimeout);
        assert!(err.to_string().contains(".resultItem"));

        let err = EngineError::Http {
            status: 503,
            url: "https://patentscope.wipo.int/".to_string(),
        };
        assert_eq!(err.kind(), EngineFailureKind::Http);
        assert_eq!(
            EngineError::InvalidUrl("x".to_string()).kind(),
            EngineFailureKind::Navigation
        );
    }
}
