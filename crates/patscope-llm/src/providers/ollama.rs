//! Ollama local LLM provider implementation.

use super::common::{build_http_client, check_status, normalize_base_url};
use crate::error::{LlmError, Result};
use crate::provider::{CompletionRequest, CompletionResponse, LlmProvider, Role, Usage};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Default local Ollama endpoint.
pub const OLLAMA_BASE_URL: &str = "http://localhost:11434";
/// Default Ollama model.
pub const OLLAMA_DEFAULT_MODEL: &str = "llama3.1:8b";

/// Ollama local LLM provider using the non-streaming `/api/generate` call.
pub struct OllamaProvider {
    model: String,
    client: Client,
    base_url: String,
}

impl OllamaProvider {
    /// Create a new Ollama provider with default settings.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created.
    pub fn new() -> Result<Self> {
        Self::with_url(OLLAMA_BASE_URL, OLLAMA_DEFAULT_MODEL)
    }

    /// Create a new Ollama provider with custom URL and model.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created.
    pub fn with_url(base_url: &str, model: impl Into<String>) -> Result<Self> {
        Ok(Self {
            model: model.into(),
            client: build_http_client(Some(120))?,
            base_url: normalize_base_url(base_url),
        })
    }

    /// Replace the HTTP timeout.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created.
    pub fn with_timeout(mut self, timeout_secs: u64) -> Result<Self> {
        self.client = build_http_client(Some(timeout_secs))?;
        Ok(self)
    }

    /// Convert internal request to Ollama API format.
    fn to_api_request(&self, request: &CompletionRequest) -> OllamaRequest {
        let mut prompt_parts = Vec::new();

        for message in &request.messages {
            let prefix = match message.role {
                Role::User => "User:",
                Role::Assistant => "Assistant:",
                Role::System => "System:",
            };
            prompt_parts.push(format!("{prefix} {}", message.content));
        }
        prompt_parts.push("Assistant:".to_string());

        OllamaRequest {
            model: self.model.clone(),
            prompt: prompt_parts.join("\n\n"),
            system: request.system_prompt.clone(),
            stream: false,
            options: OllamaOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens.and_then(|t| i32::try_from(t).ok()),
                stop: if request.stop_sequences.is_empty() {
                    None
                } else {
                    Some(request.stop_sequences.clone())
                },
            },
        }
    }

    fn convert_api_response(response: OllamaResponse) -> CompletionResponse {
        let usage = match (response.prompt_eval_count, response.eval_count) {
            (Some(input_tokens), Some(output_tokens)) => Some(Usage {
                input_tokens,
                output_tokens,
            }),
            _ => None,
        };

        CompletionResponse {
            content: response.response,
            model: response.model,
            stop_reason: response.done.then(|| "stop".to_string()),
            usage,
        }
    }
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let api_request = self.to_api_request(&request);
        debug!(model = %self.model, "Sending Ollama generate request");

        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&api_request)
            .send()
            .await
            .map_err(|e| LlmError::transport("ollama", e))?;
        let response = check_status("ollama", response).await?;

        let api_response: OllamaResponse =
            response.json().await.map_err(|e| LlmError::ParseError {
                provider: "ollama".to_string(),
                message: format!("Failed to parse response: {e}"),
            })?;

        Ok(Self::convert_api_response(api_response))
    }

    fn provider_id(&self) -> &str {
        "ollama"
    }

    fn model(&self) -> &str {
        &self.model
    }
}

// Ollama API types

#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Default, Serialize)]
struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    #[serde(default)]
    model: String,
    response: String,
    #[serde(default)]
    done: bool,
    prompt_eval_count: Option<u32>,
    eval_count: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_creation() {
        let provider = OllamaProvider::new().expect("create provider");
        assert_eq!(provider.provider_id(), "ollama");
        assert_eq!(provider.model(), OLLAMA_DEFAULT_MODEL);
        assert_eq!(provider.base_url, OLLAMA_BASE_URL);
    }

    #[test]
    fn test_provider_with_custom_url() {
        let provider =
            OllamaProvider::with_url("http://custom:11434/", "qwen2.5:7b").expect("create provider");
        assert_eq!(provider.base_url, "http://custom:11434");
        assert_eq!(provider.model(), "qwen2.5:7b");
    }

    #[test]
    fn test_api_request_conversion() {
        let provider = OllamaProvider::new().expect("create provider");
        let request = CompletionRequest::new("List the patents")
            .with_system_prompt("Reply with JSON")
            .with_max_tokens(512)
            .with_temperature(0.0);

        let api_request = provider.to_api_request(&request);

        assert_eq!(api_request.system.as_deref(), Some("Reply with JSON"));
        assert!(api_request.prompt.starts_with("User: List the patents"));
        assert!(api_request.prompt.ends_with("Assistant:"));
        assert!(!api_request.stream);
        assert_eq!(api_request.options.num_predict, Some(512));
    }

    #[test]
    fn test_response_conversion() {
        let response = OllamaResponse {
            model: OLLAMA_DEFAULT_MODEL.to_string(),
            response: "[]".to_string(),
            done: true,
            prompt_eval_count: Some(12),
            eval_count: Some(3),
        };

        let converted = OllamaProvider::convert_api_response(response);
        assert_eq!(converted.content, "[]");
        assert_eq!(converted.stop_reason.as_deref(), Some("stop"));
        assert_eq!(converted.usage.map(|u| u.total_tokens()), Some(15));
    }
}
