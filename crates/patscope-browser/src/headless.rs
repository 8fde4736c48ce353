//! Headless Chrome driven by the synchronous `headless_chrome` crate.

use crate::engine::{EngineSettings, RetrievalEngine};
use crate::error::{EngineError, Result};
use crate::fingerprint::FingerprintConfig;
use headless_chrome::util::Timeout;
use headless_chrome::{Browser, LaunchOptions};
use patscope_core::{EngineId, Query};
use std::time::{Duration, Instant};
use tracing::debug;

/// Second browser driver, run on the blocking thread pool.
///
/// A blocking closure cannot be cancelled, so every step draws on one shared
/// budget of navigation plus selector timeout. The closure therefore finishes
/// (and Chrome exits) before the orchestrator's per-attempt deadline.
pub struct HeadlessChromeEngine {
    settings: EngineSettings,
}

impl HeadlessChromeEngine {
    pub fn new(settings: EngineSettings) -> Self {
        Self { settings }
    }
}

#[async_trait::async_trait]
impl RetrievalEngine for HeadlessChromeEngine {
    fn id(&self) -> EngineId {
        EngineId::HeadlessChrome
    }

    async fn fetch(&self, query: &Query, timeout: Duration) -> Result<String> {
        let url = self.settings.search_url(query)?;
        let settings = self.settings.clone();

        tokio::task::spawn_blocking(move || fetch_blocking(&settings, &url, timeout))
            .await
            .map_err(|e| EngineError::Navigation(format!("headless_chrome task failed: {e}")))?
    }
}

/// Time left for the remaining steps of one fetch.
#[derive(Debug, Clone, Copy)]
struct StepBudget {
    deadline: Instant,
}

impl StepBudget {
    fn new(total: Duration) -> Self {
        Self {
            deadline: Instant::now() + total,
        }
    }

    /// Time for the next step, capped at `cap`. `None` once the budget is spent.
    fn step(&self, cap: Duration) -> Option<Duration> {
        let remaining = self.deadline.saturating_duration_since(Instant::now());
        (!remaining.is_zero()).then(|| remaining.min(cap))
    }
}

fn is_wait_timeout(err: &anyhow::Error) -> bool {
    err.downcast_ref::<Timeout>().is_some()
}

/// The `Browser` lives only inside this function; dropping it on any return
/// path kills the Chrome process.
fn fetch_blocking(settings: &EngineSettings, url: &str, nav_timeout: Duration) -> Result<String> {
    let budget = StepBudget::new(nav_timeout + settings.selector_timeout);
    let fingerprint = FingerprintConfig::with_user_agent(settings.user_agent.as_deref());
    let launch_error = |e: &dyn std::fmt::Display| EngineError::Launch {
        engine: EngineId::HeadlessChrome,
        reason: e.to_string(),
    };
    let navigation_timeout = || EngineError::NavigationTimeout {
        url: url.to_string(),
        timeout: nav_timeout,
    };

    let options = LaunchOptions::default_builder()
        .headless(settings.headless)
        .sandbox(false)
        .window_size(Some((fingerprint.viewport_width, fingerprint.viewport_height)))
        .path(settings.chrome_executable.clone())
        .idle_browser_timeout(nav_timeout + settings.selector_timeout)
        .build()
        .map_err(|e| launch_error(&e))?;

    let browser = Browser::new(options).map_err(|e| launch_error(&e))?;
    let tab = browser.new_tab().map_err(|e| launch_error(&e))?;

    tab.set_user_agent(&fingerprint.user_agent, Some("en-US,en;q=0.9"), None)
        .map_err(|e| EngineError::Navigation(format!("failed to set user agent: {e}")))?;

    debug!(%url, timeout_ms = nav_timeout.as_millis(), "Navigating with headless_chrome");
    tab.set_default_timeout(budget.step(nav_timeout).ok_or_else(navigation_timeout)?);
    tab.navigate_to(url).map_err(|e| {
        if is_wait_timeout(&e) {
            navigation_timeout()
        } else {
            EngineError::Navigation(e.to_string())
        }
    })?;

    tab.set_default_timeout(budget.step(nav_timeout).ok_or_else(navigation_timeout)?);
    tab.wait_until_navigated().map_err(|e| {
        if is_wait_timeout(&e) {
            navigation_timeout()
        } else {
            EngineError::Navigation(e.to_string())
        }
    })?;

    let selector_timeout = || EngineError::SelectorTimeout {
        selector: settings.wait_selector.clone(),
        timeout: settings.selector_timeout,
    };
    let selector_budget = budget
        .step(settings.selector_timeout)
        .ok_or_else(selector_timeout)?;
    tab.wait_for_element_with_custom_timeout(&settings.wait_selector, selector_budget)
        .map_err(|e| {
            if is_wait_timeout(&e) {
                selector_timeout()
            } else {
                EngineError::Navigation(format!("waiting for selector failed: {e}"))
            }
        })?;

    let html = tab
        .get_content()
        .map_err(|e| EngineError::Navigation(format!("failed to read page content: {e}")))?;

    if html.trim().is_empty() {
        return Err(EngineError::EmptyContent);
    }
    Ok(html)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_id() {
        let engine = HeadlessChromeEngine::new(EngineSettings::default());
        assert_eq!(engine.id(), EngineId::HeadlessChrome);
    }

    #[test]
    fn test_budget_caps_each_step() {
        let budget = StepBudget::new(Duration::from_secs(60));
        let step = budget.step(Duration::from_secs(15)).unwrap();
        assert_eq!(step, Duration::from_secs(15));

        let tight = StepBudget::new(Duration::from_secs(2));
        assert!(tight.step(Duration::from_secs(45)).unwrap() <= Duration::from_secs(2));
    }

    #[test]
    fn test_spent_budget_yields_no_step() {
        let budget = StepBudget::new(Duration::ZERO);
        assert!(budget.step(Duration::from_secs(45)).is_none());
    }

    #[test]
    fn test_only_wait_timeouts_count_as_timeouts() {
        assert!(is_wait_timeout(&anyhow::Error::new(Timeout)));
        assert!(!is_wait_timeout(&anyhow::anyhow!("tab crashed")));
    }

    #[tokio::test]
    async fn test_missing_executable_is_launch_error() {
        let settings = EngineSettings {
            chrome_executable: Some("/nonexistent/patscope/chrome".into()),
            ..EngineSettings::default()
        };
        let engine = HeadlessChromeEngine::new(settings);
        let query = Query::new("insulin").unwrap();

        let err = engine
            .fetch(&query, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Launch { .. }), "got {err:?}");
    }
}
