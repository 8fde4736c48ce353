//! The single entry point used by transport layers.
//!
//! `extract(query)` runs retrieval, then structured extraction, then the
//! generative tier when structured extraction finds nothing. Only exhausting
//! every engine without getting any usable page fails the call.

use crate::error::{Result, ScanError};
use crate::fallback::FallbackExtractor;
use crate::orchestrator::{RawContent, RetryOrchestrator, RetryPolicy, Retrieval};
use crate::parser::StructuredExtractor;
use crate::strategy::StrategySet;
use patscope_browser::build_engines;
use patscope_core::{
    AppConfig, ConfigError, EngineAttempt, ExtractionResult, ExtractionSource, Query,
};
use tracing::Instrument;
use url::Url;
use uuid::Uuid;

/// Retrieval plus both extraction tiers.
pub struct Pipeline {
    orchestrator: RetryOrchestrator,
    structured: StructuredExtractor,
    fallback: FallbackExtractor,
    fallback_on_unvalidated: bool,
}

impl Pipeline {
    /// Assemble a pipeline from its parts.
    #[must_use]
    pub fn new(
        orchestrator: RetryOrchestrator,
        structured: StructuredExtractor,
        fallback: FallbackExtractor,
    ) -> Self {
        Self {
            orchestrator,
            structured,
            fallback,
            fallback_on_unvalidated: true,
        }
    }

    /// Whether the generative tier runs on the last unvalidated page when
    /// every engine was exhausted. Enabled by default.
    #[must_use]
    pub fn with_fallback_on_unvalidated(mut self, enabled: bool) -> Self {
        self.fallback_on_unvalidated = enabled;
        self
    }

    /// Build engines, strategies and the LLM provider from configuration.
    ///
    /// # Errors
    /// Returns an error when the site URL is invalid, the strategies file
    /// cannot be loaded, or the LLM provider is misconfigured.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let base_url = Url::parse(&config.site.base_url).map_err(|e| ConfigError::InvalidValue {
            field: "site.base_url".to_string(),
            reason: e.to_string(),
        })?;

        let strategies = match &config.extraction.strategies_path {
            Some(path) => {
                tracing::info!(path = %path.display(), "Loading extraction strategies");
                StrategySet::load(path)?
            }
            None => StrategySet::builtin(),
        };

        let engines = build_engines(config);
        let orchestrator =
            RetryOrchestrator::new(engines, RetryPolicy::from_config(&config.retrieval));
        tracing::info!(
            engines = ?orchestrator.engine_ids(),
            max_cycles = orchestrator.policy().max_cycles,
            "Retrieval engines configured"
        );

        let provider = patscope_llm::from_config(&config.llm)?;
        let fallback = FallbackExtractor::from_config(provider, base_url.clone(), &config.llm);
        let structured = StructuredExtractor::new(strategies, base_url);
        tracing::info!(
            strategies = ?structured.strategies().iter().map(|s| s.name.as_str()).collect::<Vec<_>>(),
            generative_fallback = fallback.is_available(),
            "Extraction tiers configured"
        );

        Ok(Self::new(orchestrator, structured, fallback)
            .with_fallback_on_unvalidated(config.llm.fallback_on_unvalidated))
    }

    /// Extract records for `query`.
    ///
    /// # Errors
    /// Returns [`ScanError::InvalidQuery`] for an empty or oversized query and
    /// [`ScanError::Exhausted`] when no engine produced usable content.
    pub async fn extract(&self, query: &str) -> Result<ExtractionResult> {
        let query = Query::new(query)?;
        let span = tracing::info_span!("extract", request_id = %Uuid::new_v4(), query = %query);

        async {
            tracing::info!("Extraction started");
            let result = self.run(&query).await;
            match &result {
                Ok(r) => tracing::info!(
                    source = %r.source,
                    total_results = r.total_results,
                    attempts = r.attempts.len(),
                    "Extraction finished"
                ),
                Err(e) => tracing::error!(error = %e, "Extraction failed"),
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn run(&self, query: &Query) -> Result<ExtractionResult> {
        match self.orchestrator.run(query).await {
            Ok(Retrieval { content, attempts }) => {
                if let Some(found) = self.structured.extract(&content.body) {
                    return Ok(ExtractionResult::new(query, found.records, found.source)
                        .with_engine(content.engine)
                        .with_attempts(attempts));
                }

                tracing::info!(engine = %content.engine, "No structured rows, using generative fallback");
                Ok(self.generative(query, &content, attempts, None).await)
            }
            Err(ScanError::Exhausted {
                attempts,
                last_unvalidated: Some(content),
            }) if self.fallback_on_unvalidated => {
                tracing::warn!(
                    engine = %content.engine,
                    bytes = content.body.len(),
                    "No validated content, running generative fallback on last page"
                );
                let note = format!(
                    "content from {} did not pass validation; records are unverified",
                    content.engine
                );
                Ok(self.generative(query, &content, attempts, Some(note)).await)
            }
            Err(e) => Err(e),
        }
    }

    async fn generative(
        &self,
        query: &Query,
        content: &RawContent,
        attempts: Vec<EngineAttempt>,
        note: Option<String>,
    ) -> ExtractionResult {
        let outcome = self.fallback.extract(&content.body, query).await;
        let diagnostic = [note, outcome.diagnostic()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join("; ");

        let result = ExtractionResult::new(query, outcome.records, ExtractionSource::GenerativeFallback)
            .with_engine(content.engine)
            .with_attempts(attempts);
        if diagnostic.is_empty() {
            result
        } else {
            result.with_diagnostic(diagnostic)
        }
    }
}
