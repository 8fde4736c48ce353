//! Scripted engines for exercising orchestration without a browser.
//!
//! Enabled with the `testing` feature.

use crate::engine::RetrievalEngine;
use crate::error::{EngineError, Result};
use patscope_core::{EngineFailureKind, EngineId, Query};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// What a scripted engine does on one call.
#[derive(Debug, Clone)]
pub enum Step {
    /// Return this content
    Content(String),
    /// Fail with an error of this kind
    Fail(EngineFailureKind),
    /// Never return (exercises the orchestrator's own timeout)
    Hang,
}

/// Engine that replays a fixed script, then repeats a default step.
pub struct ScriptedEngine {
    id: EngineId,
    script: Mutex<VecDeque<Step>>,
    otherwise: Step,
    calls: AtomicUsize,
}

impl ScriptedEngine {
    /// Engine that fails with a launch error unless scripted otherwise.
    pub fn new(id: EngineId) -> Self {
        Self {
            id,
            script: Mutex::new(VecDeque::new()),
            otherwise: Step::Fail(EngineFailureKind::Launch),
            calls: AtomicUsize::new(0),
        }
    }

    /// Engine that always returns `content`.
    pub fn always(id: EngineId, content: impl Into<String>) -> Self {
        Self::new(id).otherwise(Step::Content(content.into()))
    }

    /// Engine that always fails with `kind`.
    pub fn failing(id: EngineId, kind: EngineFailureKind) -> Self {
        Self::new(id).otherwise(Step::Fail(kind))
    }

    /// Queue a step to run before the default.
    #[must_use]
    pub fn then(self, step: Step) -> Self {
        self.script
            .lock()
            .expect("script lock poisoned")
            .push_back(step);
        self
    }

    /// Step used once the script is exhausted.
    #[must_use]
    pub fn otherwise(mut self, step: Step) -> Self {
        self.otherwise = step;
        self
    }

    /// Number of `fetch` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_step(&self) -> Step {
        self.script
            .lock()
            .expect("script lock poisoned")
            .pop_front()
            .unwrap_or_else(|| self.otherwise.clone())
    }

    fn error(&self, kind: EngineFailureKind) -> EngineError {
        match kind {
            EngineFailureKind::Launch => EngineError::Launch {
                engine: self.id,
                reason: "scripted launch failure".to_string(),
            },
            EngineFailureKind::NavigationTimeout => EngineError::NavigationTimeout {
                url: "scripted://results".to_string(),
                timeout: Duration::from_secs(45),
            },
            EngineFailureKind::SelectorTimeout => EngineError::SelectorTimeout {
                selector: ".resultItem".to_string(),
                timeout: Duration::from_secs(15),
            },
            EngineFailureKind::Navigation => {
                EngineError::Navigation("scripted navigation failure".to_string())
            }
            EngineFailureKind::Http => EngineError::Http {
                status: 503,
                url: "scripted://results".to_string(),
            },
            EngineFailureKind::EmptyContent => EngineError::EmptyContent,
        }
    }
}

#[async_trait::async_trait]
impl RetrievalEngine for ScriptedEngine {
    fn id(&self) -> EngineId {
        self.id
    }

    async fn fetch(&self, _query: &Query, _timeout: Duration) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.next_step() {
            Step::Content(content) => Ok(content),
            Step::Fail(kind) => Err(self.error(kind)),
            Step::Hang => std::future::pending().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_script_then_default() {
        let engine = ScriptedEngine::failing(EngineId::Http, EngineFailureKind::Http)
            .then(Step::Content("<html>first</html>".to_string()));
        let query = Query::new("insulin").unwrap();

        let first = engine.fetch(&query, Duration::from_secs(1)).await;
        assert_eq!(first.unwrap(), "<html>first</html>");

        let second = engine.fetch(&query, Duration::from_secs(1)).await;
        assert_eq!(second.unwrap_err().kind(), EngineFailureKind::Http);
        assert_eq!(engine.calls(), 2);
    }
}
