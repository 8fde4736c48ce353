//! Common utilities shared across LLM providers.

use crate::error::{LlmError, Result};
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default request timeout when none is configured.
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Build a standard HTTP client with common timeout settings.
///
/// # Arguments
/// * `timeout_secs` - Timeout in seconds (defaults to 60 if not specified)
///
/// # Errors
/// Returns error if the HTTP client cannot be created.
pub fn build_http_client(timeout_secs: Option<u64>) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(
            timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS),
        ))
        .build()
        .map_err(|e| LlmError::Internal(format!("failed to create HTTP client: {e}")))
}

/// Turn a non-2xx response into [`LlmError::ApiError`], passing others through.
pub async fn check_status(provider: &str, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let error_text = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    Err(LlmError::ApiError {
        provider: provider.to_string(),
        status: status.as_u16(),
        message: error_text,
    })
}

/// Strip trailing slashes so endpoint paths can be appended.
#[must_use]
pub fn normalize_base_url(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}

/// Common message structure for `OpenAI`-compatible APIs.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StandardMessage {
    /// The role of the message sender (e.g., "system", "user", "assistant")
    pub role: String,
    /// The text content of the message
    #[serde(default)]
    pub content: String,
}

/// Common usage statistics structure.
#[derive(Debug, Deserialize, Clone)]
pub struct StandardUsage {
    /// Number of tokens in the prompt/input
    pub prompt_tokens: u32,
    /// Number of tokens in the completion/output
    pub completion_tokens: u32,
}
