//! Generative fallback extraction.
//!
//! Used when validated content has no structured rows, or when no engine ever
//! produced validated content but some page came back. The page is reduced to
//! visible text, truncated, and sent to a text-completion provider with a
//! fixed instruction; the reply is searched for the first JSON array of
//! objects. Nothing here fails the request: every problem becomes a
//! [`GenerativeFallbackError`] attached to an empty record list.

use crate::parser::{collapse_whitespace, resolve_link, truncate_chars};
use patscope_core::{ExtractedRecord, LlmConfig, Query};
use patscope_llm::{CompletionRequest, LlmError, LlmProvider};
use scraper::{Html, Selector};
use serde_json::{Map, Value};
use std::sync::Arc;
use thiserror::Error;
use url::Url;

/// Instruction sent with every fallback request.
pub const SYSTEM_PROMPT: &str = "You extract patent search results from web page text. \
Reply with a JSON array only, no prose. Each element is an object with the keys \
title, publication_number, applicants, inventors, publication_date, abstract, \
legal_status, family, link. Use strings for every value and null when a value is \
not on the page. Omit entries without a title. Reply [] when the page lists no patents.";

/// Why the generative tier produced no records.
#[derive(Debug, Error)]
pub enum GenerativeFallbackError {
    #[error("no text-completion provider configured")]
    Unavailable,

    #[error("text-completion request failed: {0}")]
    Provider(#[from] LlmError),

    #[error("model response contained no JSON array of objects")]
    NoArrayFound,
}

/// Records from the generative tier, plus the error that emptied them if any.
#[derive(Debug)]
pub struct FallbackOutcome {
    pub records: Vec<ExtractedRecord>,
    pub error: Option<GenerativeFallbackError>,
}

impl FallbackOutcome {
    fn failed(error: GenerativeFallbackError) -> Self {
        Self {
            records: Vec::new(),
            error: Some(error),
        }
    }

    /// Diagnostic text for the extraction result.
    #[must_use]
    pub fn diagnostic(&self) -> Option<String> {
        self.error
            .as_ref()
            .map(|e| format!("generative fallback failed: {e}"))
    }
}

/// Asks a text-completion provider for records.
pub struct FallbackExtractor {
    provider: Option<Arc<dyn LlmProvider>>,
    base_url: Url,
    max_content_chars: usize,
    max_tokens: u32,
    temperature: f32,
}

impl FallbackExtractor {
    pub fn new(provider: Option<Arc<dyn LlmProvider>>, base_url: Url) -> Self {
        Self::from_config(provider, base_url, &LlmConfig::default())
    }

    /// Extractor using the limits in `config`.
    pub fn from_config(
        provider: Option<Arc<dyn LlmProvider>>,
        base_url: Url,
        config: &LlmConfig,
    ) -> Self {
        Self {
            provider,
            base_url,
            max_content_chars: config.max_content_chars,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        }
    }

    /// Whether a provider is configured.
    pub fn is_available(&self) -> bool {
        self.provider.is_some()
    }

    /// Build the completion request for `content`.
    pub fn build_request(&self, content: &str, query: &Query) -> CompletionRequest {
        let page = reduce_content(content, self.max_content_chars);
        CompletionRequest::new(format!(
            "Search term: {query}\n\nPage content:\n{page}"
        ))
        .with_system_prompt(SYSTEM_PROMPT)
        .with_max_tokens(self.max_tokens)
        .with_temperature(self.temperature)
    }

    /// Run the generative tier. Never fails; see [`FallbackOutcome::error`].
    pub async fn extract(&self, content: &str, query: &Query) -> FallbackOutcome {
        let Some(provider) = &self.provider else {
            tracing::warn!("Generative fallback requested but no provider is configured");
            return FallbackOutcome::failed(GenerativeFallbackError::Unavailable);
        };

        let request = self.build_request(content, query);
        tracing::info!(
            provider = %provider.provider_id(),
            model = %provider.model(),
            "Running generative fallback"
        );

        let response = match provider.complete(request).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(error = %e, "Generative fallback request failed");
                return FallbackOutcome::failed(e.into());
            }
        };

        match parse_records(&response.content, &self.base_url) {
            Some(records) => {
                tracing::info!(records = records.len(), "Generative fallback parsed records");
                FallbackOutcome {
                    records,
                    error: None,
                }
            }
            None => {
                tracing::warn!(
                    reply_chars = response.content.chars().count(),
                    "Generative fallback reply had no JSON array"
                );
                FallbackOutcome::failed(GenerativeFallbackError::NoArrayFound)
            }
        }
    }
}

/// Visible body text of `content`, truncated to `max_chars` characters.
///
/// Falls back to the raw content when it has no readable body text.
pub fn reduce_content(content: &str, max_chars: usize) -> String {
    let text = body_text(content);
    let reduced = if text.is_empty() { content } else { &text };
    truncate_chars(reduced, max_chars).to_string()
}

fn body_text(content: &str) -> String {
    let document = Html::parse_document(content);
    let Ok(body) = Selector::parse("body") else {
        return String::new();
    };
    let Some(body) = document.select(&body).next() else {
        return String::new();
    };

    let mut parts: Vec<&str> = Vec::new();
    for node in body.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node
            .parent()
            .and_then(|parent| parent.value().as_element().map(|el| el.name()))
            .is_some_and(|name| matches!(name, "script" | "style" | "noscript" | "template"));
        if !hidden {
            parts.push(text);
        }
    }
    collapse_whitespace(&parts.join(" "))
}

/// Records from the first JSON array of objects in `reply`.
///
/// Returns `None` when no such array exists. Objects without a title are
/// dropped and relative links are resolved against `base_url`.
pub fn parse_records(reply: &str, base_url: &Url) -> Option<Vec<ExtractedRecord>> {
    let items = first_object_array(reply)?;
    Some(
        items
            .iter()
            .filter_map(Value::as_object)
            .filter_map(|obj| record_from_object(obj, base_url))
            .collect(),
    )
}

fn first_object_array(reply: &str) -> Option<Vec<Value>> {
    reply.match_indices('[').find_map(|(idx, _)| {
        let mut values = serde_json::Deserializer::from_str(&reply[idx..]).into_iter::<Value>();
        match values.next() {
            Some(Ok(Value::Array(items))) if items.iter().all(Value::is_object) => Some(items),
            _ => None,
        }
    })
}

fn record_from_object(obj: &Map<String, Value>, base_url: &Url) -> Option<ExtractedRecord> {
    let field = |keys: &[&str]| keys.iter().find_map(|k| obj.get(*k).and_then(value_text));

    let mut record = ExtractedRecord::new(field(&["title"])?)?;
    record.identifier = field(&["publication_number", "publicationNumber", "identifier"]);
    record.applicants = field(&["applicants", "applicant"]);
    record.inventors = field(&["inventors", "inventor"]);
    record.publication_date = field(&["publication_date", "publicationDate"]);
    record.abstract_text = field(&["abstract"]);
    record.legal_status = field(&["legal_status", "legalStatus"]);
    record.family_id = field(&["family", "family_id"]);
    record.link = field(&["link", "url"]).map(|href| resolve_link(base_url, &href));
    Some(record)
}

fn value_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => collapse_whitespace(s),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => items
            .iter()
            .filter_map(value_text)
            .collect::<Vec<_>>()
            .join("; "),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use patscope_llm::CompletionResponse;
    use std::sync::Mutex;

    fn base() -> Url {
        Url::parse("https://patentscope.wipo.int").unwrap()
    }

    struct CannedProvider {
        reply: std::result::Result<String, u16>,
        seen: Mutex<Vec<CompletionRequest>>,
    }

    impl CannedProvider {
        fn replying(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(reply.to_string()),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn failing(status: u16) -> Arc<Self> {
            Arc::new(Self {
                reply: Err(status),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl LlmProvider for CannedProvider {
        async fn complete(
            &self,
            request: CompletionRequest,
        ) -> patscope_llm::Result<CompletionResponse> {
            self.seen.lock().unwrap().push(request);
            match &self.reply {
                Ok(content) => Ok(CompletionResponse {
                    content: content.clone(),
                    model: "canned".to_string(),
                    stop_reason: Some("stop".to_string()),
                    usage: None,
                }),
                Err(status) => Err(LlmError::ApiError {
                    provider: "canned".to_string(),
                    status: *status,
                    message: "unavailable".to_string(),
                }),
            }
        }

        fn provider_id(&self) -> &str {
            "canned"
        }

        fn model(&self) -> &str {
            "canned"
        }
    }

    #[test]
    fn test_parse_array_inside_prose() {
        let reply = r#"Sure! Here are the results [see below]:
            ```json
            [{"title": "Oral GLP-1", "publication_number": "WO2021001",
              "inventors": ["Alice", "Bob"], "family": 77, "link": "/detail?id=1"},
             {"publication_number": "WO2021002"},
             {"title": "  "}]
            ```"#;

        let records = parse_records(reply, &base()).expect("array");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].title, "Oral GLP-1");
        assert_eq!(records[0].inventors.as_deref(), Some("Alice; Bob"));
        assert_eq!(records[0].family_id.as_deref(), Some("77"));
        assert_eq!(
            records[0].link.as_deref(),
            Some("https://patentscope.wipo.int/detail?id=1")
        );
    }

    #[test]
    fn test_skips_arrays_of_non_objects() {
        let reply = r#"ids [1, 2, 3] then [{"title": "Tablet"}]"#;
        let records = parse_records(reply, &base()).expect("array");
        assert_eq!(records[0].title, "Tablet");
    }

    #[test]
    fn test_no_array() {
        assert!(parse_records("I could not find any patents.", &base()).is_none());
        assert!(parse_records("[broken json", &base()).is_none());
        assert!(parse_records(r#"{"title": "not in an array"}"#, &base()).is_none());
    }

    #[test]
    fn test_empty_array_is_valid() {
        assert_eq!(parse_records("[]", &base()), Some(Vec::new()));
    }

    #[test]
    fn test_reduce_content_strips_markup_and_scripts() {
        let html = "<html><head><title>T</title></head><body>\
                    <script>var x = 1;</script><h1>Search   Results</h1><p>WO1</p></body></html>";
        assert_eq!(reduce_content(html, 100), "Search Results WO1");
        assert_eq!(reduce_content(html, 6), "Search");
    }

    #[test]
    fn test_reduce_content_falls_back_to_raw() {
        assert_eq!(reduce_content("", 10), "");
        assert_eq!(reduce_content("<html><body></body></html>", 8), "<html><b");
    }

    #[tokio::test]
    async fn test_unavailable_without_provider() {
        let extractor = FallbackExtractor::new(None, base());
        let query = Query::new("insulin").unwrap();

        let outcome = extractor.extract("<p>x</p>", &query).await;
        assert!(outcome.records.is_empty());
        assert!(matches!(
            outcome.error,
            Some(GenerativeFallbackError::Unavailable)
        ));
        assert!(outcome.diagnostic().unwrap().contains("no text-completion provider"));
    }

    #[tokio::test]
    async fn test_request_shape() {
        let provider = CannedProvider::replying(r#"[{"title": "Pen injector"}]"#);
        let config = LlmConfig {
            max_content_chars: 12,
            ..LlmConfig::default()
        };
        let extractor = FallbackExtractor::from_config(Some(provider.clone()), base(), &config);
        let query = Query::new("insulin").unwrap();

        let outcome = extractor
            .extract("<body>Insulin pen injector devices</body>", &query)
            .await;
        assert_eq!(outcome.records[0].title, "Pen injector");
        assert!(outcome.error.is_none());

        let seen = provider.seen.lock().unwrap();
        let request = &seen[0];
        assert_eq!(request.system_prompt.as_deref(), Some(SYSTEM_PROMPT));
        assert_eq!(request.temperature, Some(0.0));
        assert_eq!(
            request.messages[0].content,
            "Search term: insulin\n\nPage content:\nInsulin pen "
        );
    }

    #[tokio::test]
    async fn test_provider_error_becomes_diagnostic() {
        let extractor = FallbackExtractor::new(Some(CannedProvider::failing(503)), base());
        let query = Query::new("insulin").unwrap();

        let outcome = extractor.extract("<p>x</p>", &query).await;
        assert!(outcome.records.is_empty());
        assert!(matches!(
            outcome.error,
            Some(GenerativeFallbackError::Provider(_))
        ));
    }
}
