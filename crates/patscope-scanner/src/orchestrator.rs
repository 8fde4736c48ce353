//! Retry orchestrator driving the retrieval engines.
//!
//! Engines are tried strictly one at a time, in the configured priority order,
//! for up to `max_cycles` full passes. The first engine whose content passes
//! the validation gate wins and no further engine is called for the request.
//! A fixed backoff separates cycles in which nothing validated.

use crate::error::{Result, ScanError};
use crate::validator::{matched_markers, MIN_MARKERS};
use chrono::Utc;
use patscope_browser::RetrievalEngine;
use patscope_core::{AttemptOutcome, EngineAttempt, EngineId, Query, RetrievalConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Maximum retry cycles when not configured.
const DEFAULT_MAX_CYCLES: u32 = 3;

/// Pause between failed cycles when not configured.
const DEFAULT_CYCLE_BACKOFF_MS: u64 = 2000;

/// Slack on top of an engine's own timeouts before the orchestrator gives up on it.
const TIMEOUT_GRACE: Duration = Duration::from_secs(5);

/// Retry bounds for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Full passes over the engine list (at least 1)
    pub max_cycles: u32,
    /// Pause after a cycle in which no engine validated
    pub cycle_backoff: Duration,
    /// Navigation timeout handed to each engine
    pub navigation_timeout: Duration,
    /// Overall budget of one engine call (navigation plus selector wait)
    pub engine_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetrievalConfig::default())
    }
}

impl RetryPolicy {
    /// Policy from the retrieval configuration.
    #[must_use]
    pub fn from_config(config: &RetrievalConfig) -> Self {
        Self {
            max_cycles: config.max_cycles,
            cycle_backoff: config.cycle_backoff(),
            navigation_timeout: config.navigation_timeout(),
            engine_timeout: config.engine_timeout(),
        }
        .clamped()
    }

    /// Policy with the default cycle count and backoff and the given timeouts.
    #[must_use]
    pub fn with_timeouts(navigation_timeout: Duration, engine_timeout: Duration) -> Self {
        Self {
            max_cycles: DEFAULT_MAX_CYCLES,
            cycle_backoff: Duration::from_millis(DEFAULT_CYCLE_BACKOFF_MS),
            navigation_timeout,
            engine_timeout,
        }
    }

    /// Set the number of cycles.
    #[must_use]
    pub fn with_max_cycles(mut self, max_cycles: u32) -> Self {
        self.max_cycles = max_cycles;
        self.clamped()
    }

    /// Set the inter-cycle backoff.
    #[must_use]
    pub fn with_cycle_backoff(mut self, backoff: Duration) -> Self {
        self.cycle_backoff = backoff;
        self
    }

    fn clamped(mut self) -> Self {
        self.max_cycles = self.max_cycles.max(1);
        self.engine_timeout = self.engine_timeout.max(self.navigation_timeout);
        self
    }

    /// Hard bound on a single engine call.
    #[must_use]
    pub fn attempt_deadline(&self) -> Duration {
        self.engine_timeout + TIMEOUT_GRACE
    }
}

/// Page content fetched by one engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawContent {
    /// Engine that produced the content
    pub engine: EngineId,
    /// Page markup as returned
    pub body: String,
    /// Whether the validation gate accepted it
    pub validated: bool,
}

/// Validated content together with every attempt made to get it.
#[derive(Debug, Clone)]
pub struct Retrieval {
    /// The accepted content
    pub content: RawContent,
    /// Attempts in invocation order, the last one being the success
    pub attempts: Vec<EngineAttempt>,
}

/// Drives the engines through bounded retry cycles.
pub struct RetryOrchestrator {
    engines: Vec<Arc<dyn RetrievalEngine>>,
    policy: RetryPolicy,
}

impl RetryOrchestrator {
    /// Create an orchestrator over `engines`, tried in the given order.
    #[must_use]
    pub fn new(engines: Vec<Arc<dyn RetrievalEngine>>, policy: RetryPolicy) -> Self {
        Self {
            engines,
            policy: policy.clamped(),
        }
    }

    /// Engine identifiers in priority order.
    #[must_use]
    pub fn engine_ids(&self) -> Vec<EngineId> {
        self.engines.iter().map(|e| e.id()).collect()
    }

    /// Active retry policy.
    #[must_use]
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Fetch validated content for `query`.
    ///
    /// # Errors
    /// Returns [`ScanError::Exhausted`] with every recorded attempt when no
    /// engine produced validated content in any cycle.
    pub async fn run(&self, query: &Query) -> Result<Retrieval> {
        let max_cycles = self.policy.max_cycles;
        let mut attempts = Vec::with_capacity(self.engines.len() * max_cycles as usize);
        let mut last_unvalidated: Option<RawContent> = None;

        for cycle in 1..=max_cycles {
            tracing::info!(cycle, max_cycles, engines = self.engines.len(), "Starting retrieval cycle");

            for engine in &self.engines {
                let (attempt, body) = self.attempt(engine.as_ref(), query, cycle).await;
                let validated = attempt.outcome.is_success();
                attempts.push(attempt);

                match body {
                    Some(body) if validated => {
                        tracing::info!(
                            engine = %engine.id(),
                            cycle,
                            bytes = body.len(),
                            "Engine returned validated content"
                        );
                        return Ok(Retrieval {
                            content: RawContent {
                                engine: engine.id(),
                                body,
                                validated: true,
                            },
                            attempts,
                        });
                    }
                    Some(body) => {
                        last_unvalidated = Some(RawContent {
                            engine: engine.id(),
                            body,
                            validated: false,
                        });
                    }
                    None => {}
                }
            }

            if cycle < max_cycles && !self.engines.is_empty() {
                tracing::warn!(
                    "No engine validated in cycle {}/{}, retrying in {:?}...",
                    cycle,
                    max_cycles,
                    self.policy.cycle_backoff
                );
                tokio::time::sleep(self.policy.cycle_backoff).await;
            }
        }

        tracing::error!(
            attempts = attempts.len(),
            has_unvalidated = last_unvalidated.is_some(),
            "All retrieval engines exhausted"
        );
        Err(ScanError::Exhausted {
            attempts,
            last_unvalidated,
        })
    }

    /// Run one engine once. Returns the attempt record and any non-empty body.
    async fn attempt(
        &self,
        engine: &dyn RetrievalEngine,
        query: &Query,
        cycle: u32,
    ) -> (EngineAttempt, Option<String>) {
        let engine_id = engine.id();
        let started_at = Utc::now();
        let start = Instant::now();
        let deadline = self.policy.attempt_deadline();

        tracing::debug!(engine = %engine_id, cycle, "Invoking engine");
        let result = tokio::time::timeout(
            deadline,
            engine.fetch(query, self.policy.navigation_timeout),
        )
        .await;
        let elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

        let (outcome, body) = match result {
            Ok(Ok(body)) => {
                let markers = matched_markers(&body);
                let bytes = body.len();
                if body.trim().is_empty() {
                    (
                        AttemptOutcome::Rejected {
                            bytes,
                            matched_markers: Vec::new(),
                        },
                        None,
                    )
                } else if markers.len() >= MIN_MARKERS {
                    (AttemptOutcome::Success { bytes }, Some(body))
                } else {
                    (
                        AttemptOutcome::Rejected {
                            bytes,
                            matched_markers: markers.into_iter().map(str::to_string).collect(),
                        },
                        Some(body),
                    )
                }
            }
            Ok(Err(e)) => (
                AttemptOutcome::Failure {
                    kind: e.kind(),
                    reason: e.to_string(),
                },
                None,
            ),
            Err(_) => (
                AttemptOutcome::Timeout {
                    reason: format!("no response within {}ms", deadline.as_millis()),
                },
                None,
            ),
        };

        if !outcome.is_success() {
            tracing::warn!(
                engine = %engine_id,
                cycle,
                elapsed_ms,
                kind = outcome.kind(),
                "Engine attempt failed: {}",
                outcome.describe()
            );
        }

        (
            EngineAttempt {
                engine: engine_id,
                cycle,
                started_at,
                elapsed_ms,
                outcome,
            },
            body,
        )
    }
}
