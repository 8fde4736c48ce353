//! Build the configured provider from [`LlmConfig`].

use crate::error::{LlmError, Result};
use crate::provider::LlmProvider;
use crate::providers::{OllamaProvider, OpenAiProvider};
use patscope_core::LlmConfig;
use std::sync::Arc;
use tracing::{info, warn};

/// Create the provider named by `config.provider`.
///
/// Returns `Ok(None)` when the generative tier is disabled, when the provider
/// is `none`, or when a hosted provider has no API key. The scanner reports
/// that case as "unavailable" instead of failing at startup.
///
/// # Errors
/// Returns [`LlmError::UnknownProvider`] for an unrecognised provider name and
/// [`LlmError::InvalidRequest`] when `openai_compatible` has no `base_url`.
pub fn from_config(config: &LlmConfig) -> Result<Option<Arc<dyn LlmProvider>>> {
    if !config.enabled {
        info!("Generative fallback disabled by configuration");
        return Ok(None);
    }

    let provider = match config.provider.as_str() {
        "none" => return Ok(None),
        "groq" | "openai" => {
            let Some(api_key) = config.api_key.clone() else {
                warn!(
                    provider = %config.provider,
                    "No API key configured, generative fallback unavailable"
                );
                return Ok(None);
            };
            let mut provider = if config.provider == "groq" {
                OpenAiProvider::groq(api_key)?
            } else {
                OpenAiProvider::new(api_key)?
            };
            if let Some(base_url) = &config.base_url {
                provider = provider.with_base_url(base_url);
            }
            with_model(provider, config.model.as_deref()).with_timeout(config.timeout_secs)?
        }
        "openai_compatible" | "lmstudio" => {
            let base_url = config.base_url.as_deref().ok_or_else(|| {
                LlmError::InvalidRequest(format!(
                    "provider {} requires llm.base_url",
                    config.provider
                ))
            })?;
            let model = config.model.clone().unwrap_or_else(|| "local-model".to_string());
            OpenAiProvider::compatible(
                config.provider.clone(),
                base_url,
                model,
                config.api_key.clone(),
            )?
            .with_timeout(config.timeout_secs)?
        }
        "ollama" => {
            let base_url = config
                .base_url
                .as_deref()
                .unwrap_or(crate::providers::ollama::OLLAMA_BASE_URL);
            let model = config
                .model
                .as_deref()
                .unwrap_or(crate::providers::ollama::OLLAMA_DEFAULT_MODEL);
            let provider = OllamaProvider::with_url(base_url, model)?.with_timeout(config.timeout_secs)?;
            info!(provider = "ollama", model = %provider.model(), "LLM provider configured");
            return Ok(Some(Arc::new(provider)));
        }
        other => return Err(LlmError::UnknownProvider(other.to_string())),
    };

    info!(
        provider = %provider.provider_id(),
        model = %provider.model(),
        "LLM provider configured"
    );
    Ok(Some(Arc::new(provider)))
}

fn with_model(provider: OpenAiProvider, model: Option<&str>) -> OpenAiProvider {
    match model {
        Some(model) => provider.with_model(model),
        None => provider,
    }
}
