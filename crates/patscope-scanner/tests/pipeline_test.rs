use async_trait::async_trait;
use patscope_browser::testing::{ScriptedEngine, Step};
use patscope_browser::RetrievalEngine;
use patscope_core::{AttemptOutcome, EngineFailureKind, EngineId, ExtractionSource};
use patscope_llm::{CompletionRequest, CompletionResponse, LlmProvider};
use patscope_scanner::{
    FallbackExtractor, Pipeline, RetryOrchestrator, RetryPolicy, ScanError, StrategySet,
    StructuredExtractor,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

const THREE_ROWS: &str = r#"<html><body>
<h1>Search Results</h1>
<div id="resultTable">
  <div class="resultItem"><span class="title">First patent</span><span class="pubNumber">WO1</span></div>
  <div class="resultItem"><span class="title">Second patent</span><span class="pubNumber">WO2</span></div>
  <div class="resultItem"><span class="title">Third patent</span><span class="pubNumber">WO3</span></div>
</div></body></html>"#;

const ONE_ROW: &str = r#"<html><body><h1>Search Results</h1><div id="resultTable">
  <div class="resultItem"><span class="title">Only patent</span></div>
</div></body></html>"#;

const NO_ROWS: &str = r#"<html><body><h1>Search Results</h1>
<div id="resultTable"><ul><li>Oral insulin WO2020/1</li></ul></div></body></html>"#;

const BLOCK_PAGE: &str = "<html><body>Access to patentscope.wipo.int is temporarily blocked</body></html>";

/// Provider returning a fixed reply and counting calls.
struct CannedProvider {
    reply: String,
    calls: AtomicUsize,
}

impl CannedProvider {
    fn new(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: reply.to_string(),
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmProvider for CannedProvider {
    async fn complete(&self, _request: CompletionRequest) -> patscope_llm::Result<CompletionResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(CompletionResponse {
            content: self.reply.clone(),
            model: "canned".to_string(),
            stop_reason: Some("stop".to_string()),
            usage: None,
        })
    }

    fn provider_id(&self) -> &str {
        "canned"
    }

    fn model(&self) -> &str {
        "canned"
    }
}

fn policy() -> RetryPolicy {
    RetryPolicy::with_timeouts(Duration::from_secs(45), Duration::from_secs(60))
}

fn pipeline(
    engines: Vec<Arc<ScriptedEngine>>,
    provider: Option<Arc<CannedProvider>>,
) -> Pipeline {
    let engines: Vec<Arc<dyn RetrievalEngine>> = engines
        .into_iter()
        .map(|e| e as Arc<dyn RetrievalEngine>)
        .collect();
    let base = Url::parse("https://patentscope.wipo.int").unwrap();

    Pipeline::new(
        RetryOrchestrator::new(engines, policy()),
        StructuredExtractor::new(StrategySet::builtin(), base.clone()),
        FallbackExtractor::new(provider.map(|p| p as Arc<dyn LlmProvider>), base),
    )
}

#[tokio::test(start_paused = true)]
async fn test_first_engine_valid_three_rows() {
    let first = Arc::new(ScriptedEngine::always(EngineId::Chromium, THREE_ROWS));
    let second = Arc::new(ScriptedEngine::always(EngineId::Http, THREE_ROWS));

    let result = pipeline(vec![first.clone(), second.clone()], None)
        .extract("semaglutide")
        .await
        .unwrap();

    assert_eq!(result.source, ExtractionSource::StructuredPrimary);
    assert_eq!(result.total_results, 3);
    let titles: Vec<&str> = result.records.iter().map(|r| r.title.as_str()).collect();
    assert_eq!(titles, vec!["First patent", "Second patent", "Third patent"]);
    assert_eq!(result.engine, Some(EngineId::Chromium));

    assert_eq!(first.calls(), 1);
    assert_eq!(second.calls(), 0);
    assert_eq!(result.attempts.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_second_engine_after_navigation_timeout() {
    let first = Arc::new(ScriptedEngine::failing(
        EngineId::Chromium,
        EngineFailureKind::NavigationTimeout,
    ));
    let second = Arc::new(ScriptedEngine::always(EngineId::HeadlessChrome, ONE_ROW));

    let result = pipeline(vec![first.clone(), second.clone()], None)
        .extract("insulin")
        .await
        .unwrap();

    assert_eq!(result.engine, Some(EngineId::HeadlessChrome));
    assert_eq!(result.total_results, 1);
    assert_eq!(result.records[0].title, "Only patent");

    let failures: Vec<_> = result
        .attempts
        .iter()
        .filter(|a| !a.outcome.is_success())
        .collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].engine, EngineId::Chromium);
    assert_eq!(failures[0].outcome.kind(), "navigation_timeout");
}

#[tokio::test(start_paused = true)]
async fn test_no_structured_rows_uses_generative_fallback() {
    let provider = CannedProvider::new(
        r#"Here you go: [{"title": "Oral insulin", "publication_number": "WO2020/1"}]"#,
    );
    let engine = Arc::new(ScriptedEngine::always(EngineId::Chromium, NO_ROWS));

    let result = pipeline(vec![engine], Some(provider.clone()))
        .extract("oral insulin")
        .await
        .unwrap();

    assert_eq!(result.source, ExtractionSource::GenerativeFallback);
    assert_eq!(result.total_results, 1);
    assert_eq!(result.records[0].identifier.as_deref(), Some("WO2020/1"));
    assert!(result.diagnostic.is_none());
    assert_eq!(provider.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_unparseable_model_reply_is_not_a_failure() {
    let provider = CannedProvider::new("Sorry, I cannot help with that.");
    let engine = Arc::new(ScriptedEngine::always(EngineId::Http, NO_ROWS));

    let result = pipeline(vec![engine], Some(provider))
        .extract("oral insulin")
        .await
        .unwrap();

    assert_eq!(result.source, ExtractionSource::GenerativeFallback);
    assert!(result.records.is_empty());
    assert_eq!(result.total_results, 0);
    assert!(result
        .diagnostic
        .as_deref()
        .unwrap()
        .contains("no JSON array"));

    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["source"], "generative_fallback");
    assert_eq!(json["results"], serde_json::json!([]));
}

#[tokio::test(start_paused = true)]
async fn test_missing_provider_still_returns_result() {
    let engine = Arc::new(ScriptedEngine::always(EngineId::Http, NO_ROWS));

    let result = pipeline(vec![engine], None).extract("metformin").await.unwrap();

    assert_eq!(result.source, ExtractionSource::GenerativeFallback);
    assert!(result.records.is_empty());
    assert!(result.diagnostic.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_every_engine_failing_exhausts_after_n_times_c_calls() {
    let engines = vec![
        Arc::new(ScriptedEngine::failing(EngineId::Chromium, EngineFailureKind::Launch)),
        Arc::new(ScriptedEngine::failing(
            EngineId::HeadlessChrome,
            EngineFailureKind::SelectorTimeout,
        )),
        Arc::new(ScriptedEngine::failing(EngineId::WebDriver, EngineFailureKind::Navigation)),
        Arc::new(ScriptedEngine::failing(EngineId::Http, EngineFailureKind::Http)),
    ];

    let start = tokio::time::Instant::now();
    let err = pipeline(engines.clone(), None)
        .extract("semaglutide")
        .await
        .unwrap_err();
    let elapsed = start.elapsed();

    for engine in &engines {
        assert_eq!(engine.calls(), 3);
    }

    match &err {
        ScanError::Exhausted {
            attempts,
            last_unvalidated,
        } => {
            assert_eq!(attempts.len(), 12);
            assert!(last_unvalidated.is_none());
            let order: Vec<(EngineId, u32)> = attempts.iter().map(|a| (a.engine, a.cycle)).collect();
            assert_eq!(order[0], (EngineId::Chromium, 1));
            assert_eq!(order[3], (EngineId::Http, 1));
            assert_eq!(order[4], (EngineId::Chromium, 2));
            assert_eq!(order[11], (EngineId::Http, 3));
        }
        other => panic!("expected exhaustion, got {other:?}"),
    }

    // Two backoffs between three cycles, none after the last.
    assert!(elapsed >= Duration::from_millis(4000), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_millis(4100), "elapsed {elapsed:?}");

    let report = err.report();
    assert_eq!(report.error_kind, "exhausted_engines");
    assert_eq!(report.per_engine_failures.len(), 12);
    assert_eq!(report.per_engine_failures[1].kind, "selector_timeout");
}

#[tokio::test(start_paused = true)]
async fn test_success_in_second_cycle_stops_immediately() {
    let flaky = Arc::new(
        ScriptedEngine::new(EngineId::Chromium)
            .then(Step::Fail(EngineFailureKind::Launch))
            .then(Step::Content(ONE_ROW.to_string())),
    );
    let backup = Arc::new(ScriptedEngine::failing(EngineId::Http, EngineFailureKind::Http));

    let result = pipeline(vec![flaky.clone(), backup.clone()], None)
        .extract("insulin")
        .await
        .unwrap();

    assert_eq!(result.engine, Some(EngineId::Chromium));
    assert_eq!(flaky.calls(), 2);
    assert_eq!(backup.calls(), 1);
    assert_eq!(result.attempts.len(), 3);
    assert_eq!(result.attempts[2].cycle, 2);
}

#[tokio::test(start_paused = true)]
async fn test_hanging_engine_is_timed_out() {
    let hanging = Arc::new(ScriptedEngine::new(EngineId::WebDriver).otherwise(Step::Hang));
    let next = Arc::new(ScriptedEngine::always(EngineId::Http, ONE_ROW));

    let result = pipeline(vec![hanging, next], None)
        .extract("insulin")
        .await
        .unwrap();

    assert_eq!(result.engine, Some(EngineId::Http));
    assert!(matches!(
        result.attempts[0].outcome,
        AttemptOutcome::Timeout { .. }
    ));
    assert!(result.attempts[0].elapsed_ms >= 65_000);
}

#[tokio::test(start_paused = true)]
async fn test_rejected_pages_feed_generative_fallback() {
    let provider = CannedProvider::new(r#"[{"title": "Blocked page guess"}]"#);
    let engine = Arc::new(ScriptedEngine::always(EngineId::Http, BLOCK_PAGE));

    let result = pipeline(vec![engine.clone()], Some(provider.clone()))
        .extract("insulin")
        .await
        .unwrap();

    assert_eq!(engine.calls(), 3);
    assert_eq!(provider.calls(), 1);
    assert_eq!(result.source, ExtractionSource::GenerativeFallback);
    assert_eq!(result.records[0].title, "Blocked page guess");
    assert!(result
        .diagnostic
        .as_deref()
        .unwrap()
        .contains("did not pass validation"));
    assert!(result
        .attempts
        .iter()
        .all(|a| a.outcome.kind() == "validation_failure"));
}

#[tokio::test(start_paused = true)]
async fn test_rejected_pages_propagate_when_fallback_disabled() {
    let provider = CannedProvider::new("[]");
    let engine = Arc::new(ScriptedEngine::always(EngineId::Http, BLOCK_PAGE));

    let err = pipeline(vec![engine], Some(provider.clone()))
        .with_fallback_on_unvalidated(false)
        .extract("insulin")
        .await
        .unwrap_err();

    match err {
        ScanError::Exhausted {
            last_unvalidated: Some(content),
            ..
        } => {
            assert_eq!(content.engine, EngineId::Http);
            assert!(!content.validated);
        }
        other => panic!("expected exhaustion with content, got {other:?}"),
    }
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn test_blank_query_rejected_before_any_engine() {
    let engine = Arc::new(ScriptedEngine::always(EngineId::Http, THREE_ROWS));
    let pipeline = pipeline(vec![engine.clone()], None);

    let err = pipeline.extract("   ").await.unwrap_err();
    assert!(matches!(err, ScanError::InvalidQuery(_)));
    assert_eq!(err.report().error_kind, "invalid_query");

    let err = pipeline.extract(&"x".repeat(600)).await.unwrap_err();
    assert!(matches!(err, ScanError::InvalidQuery(_)));
    assert_eq!(engine.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_repeated_extraction_is_identical() {
    let engine = Arc::new(ScriptedEngine::always(EngineId::Http, THREE_ROWS));
    let pipeline = pipeline(vec![engine], None);

    let first = pipeline.extract("semaglutide").await.unwrap();
    let second = pipeline.extract("semaglutide").await.unwrap();
    assert_eq!(first.records, second.records);
}
