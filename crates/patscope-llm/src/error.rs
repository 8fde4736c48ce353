//! Error types for the LLM subsystem.

use thiserror::Error;

/// Errors that can occur during LLM operations.
#[derive(Error, Debug)]
pub enum LlmError {
    /// Provider name in configuration is not recognised
    #[error("unknown LLM provider: {0}")]
    UnknownProvider(String),

    /// API error with status code
    #[error("API error ({provider}): status {status}, {message}")]
    ApiError {
        /// Provider name
        provider: String,
        /// HTTP status code
        status: u16,
        /// Error message
        message: String,
    },

    /// Request validation error
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Response parsing error
    #[error("failed to parse response from {provider}: {message}")]
    ParseError {
        /// Provider name
        provider: String,
        /// Error message
        message: String,
    },

    /// Request timed out
    #[error("request to {provider} timed out")]
    Timeout {
        /// Provider name
        provider: String,
    },

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}

impl LlmError {
    /// Map a transport error, keeping timeouts distinguishable.
    pub(crate) fn transport(provider: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout {
                provider: provider.to_string(),
            }
        } else {
            LlmError::Network(err)
        }
    }
}

/// Result type alias for LLM operations.
pub type Result<T> = std::result::Result<T, LlmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = LlmError::UnknownProvider("claude-local".to_string());
        assert_eq!(err.to_string(), "unknown LLM provider: claude-local");

        let err = LlmError::ApiError {
            provider: "groq".to_string(),
            status: 429,
            message: "Too Many Requests".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "API error (groq): status 429, Too Many Requests"
        );
    }

    #[test]
    fn test_timeout_display() {
        let err = LlmError::Timeout {
            provider: "ollama".to_string(),
        };
        assert!(err.to_string().contains("timed out"));
    }
}
