//! `OpenAI`-compatible chat completions provider.
//!
//! Groq, `OpenAI` and LM Studio all accept the same `/chat/completions`
//! request; they differ only in base URL, default model and whether a bearer
//! token is required.

use super::common::{
    build_http_client, check_status, normalize_base_url, StandardMessage, StandardUsage,
};
use crate::error::{LlmError, Result};
use crate::provider::{CompletionRequest, CompletionResponse, LlmProvider, Usage};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Groq's `OpenAI`-compatible endpoint.
pub const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";
/// Default Groq model.
pub const GROQ_DEFAULT_MODEL: &str = "llama-3.1-8b-instant";
/// `OpenAI` endpoint.
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
/// Default `OpenAI` model.
pub const OPENAI_DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Provider for any server speaking the `OpenAI` chat completions API.
pub struct OpenAiProvider {
    provider_id: String,
    api_key: Option<String>,
    model: String,
    client: Client,
    base_url: String,
}

impl OpenAiProvider {
    /// Create an `OpenAI` provider with the given API key.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Self::compatible(
            "openai",
            OPENAI_BASE_URL,
            OPENAI_DEFAULT_MODEL,
            Some(api_key.into()),
        )
    }

    /// Create a Groq provider with the given API key.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created.
    pub fn groq(api_key: impl Into<String>) -> Result<Self> {
        Self::compatible(
            "groq",
            GROQ_BASE_URL,
            GROQ_DEFAULT_MODEL,
            Some(api_key.into()),
        )
    }

    /// Create a provider for an arbitrary compatible endpoint.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created.
    pub fn compatible(
        provider_id: impl Into<String>,
        base_url: &str,
        model: impl Into<String>,
        api_key: Option<String>,
    ) -> Result<Self> {
        Ok(Self {
            provider_id: provider_id.into(),
            api_key,
            model: model.into(),
            client: build_http_client(None)?,
            base_url: normalize_base_url(base_url),
        })
    }

    /// Use a different model.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Point the provider at a different endpoint.
    #[must_use]
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = normalize_base_url(base_url);
        self
    }

    /// Replace the HTTP timeout.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created.
    pub fn with_timeout(mut self, timeout_secs: u64) -> Result<Self> {
        self.client = build_http_client(Some(timeout_secs))?;
        Ok(self)
    }

    /// Convert internal request to `OpenAI` API format.
    fn to_api_request(&self, request: &CompletionRequest) -> OpenAiRequest {
        let mut messages: Vec<StandardMessage> = Vec::new();

        if let Some(system) = &request.system_prompt {
            messages.push(StandardMessage {
                role: "system".to_string(),
                content: system.clone(),
            });
        }

        for message in &request.messages {
            messages.push(StandardMessage {
                role: message.role.as_str().to_string(),
                content: message.content.clone(),
            });
        }

        OpenAiRequest {
            model: self.model.clone(),
            messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            stop: if request.stop_sequences.is_empty() {
                None
            } else {
                Some(request.stop_sequences.clone())
            },
        }
    }

    /// Convert `OpenAI` API response to internal format.
    fn convert_api_response(&self, response: OpenAiResponse) -> Result<CompletionResponse> {
        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::ParseError {
                provider: self.provider_id.clone(),
                message: "no choices in response".to_string(),
            })?;

        Ok(CompletionResponse {
            content: choice.message.content,
            model: response.model,
            stop_reason: choice.finish_reason,
            usage: response.usage.map(|u| Usage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
            }),
        })
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let api_request = self.to_api_request(&request);
        debug!(
            provider = %self.provider_id,
            model = %self.model,
            messages = api_request.messages.len(),
            "Sending chat completion"
        );

        let mut builder = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .json(&api_request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| LlmError::transport(&self.provider_id, e))?;
        let response = check_status(&self.provider_id, response).await?;

        let api_response: OpenAiResponse =
            response.json().await.map_err(|e| LlmError::ParseError {
                provider: self.provider_id.clone(),
                message: format!("Failed to parse response: {e}"),
            })?;

        self.convert_api_response(api_response)
    }

    fn provider_id(&self) -> &str {
        &self.provider_id
    }

    fn model(&self) -> &str {
        &self.model
    }
}

// OpenAI API types

#[derive(Debug, Serialize)]
struct OpenAiRequest {
    model: String,
    messages: Vec<StandardMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    #[serde(default)]
    model: String,
    choices: Vec<OpenAiChoice>,
    usage: Option<StandardUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: StandardMessage,
    finish_reason: Option<String>,
}
