use crate::chromium::ChromiumEngine;
use crate::error::Result;
use crate::headless::HeadlessChromeEngine;
use crate::http::HttpEngine;
use crate::webdriver::WebDriverEngine;
use patscope_core::{AppConfig, EngineId, Query, SiteConfig};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// One mechanism for fetching the results page for a query.
///
/// Implementations acquire their automation resource (browser process,
/// WebDriver session or HTTP client) at the start of `fetch` and release it
/// on every exit path before returning. They hold no state between calls, so
/// a single instance may serve concurrent requests.
#[async_trait::async_trait]
pub trait RetrievalEngine: Send + Sync {
    /// Identifier used in logs and attempt records.
    fn id(&self) -> EngineId;

    /// Fetch the raw results page for `query`.
    ///
    /// `timeout` bounds page navigation; the wait for the content marker has
    /// its own, shorter budget.
    async fn fetch(&self, query: &Query, timeout: Duration) -> Result<String>;
}

/// Settings shared by every engine, derived from [`AppConfig`].
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub site: SiteConfig,
    pub wait_selector: String,
    pub selector_timeout: Duration,
    pub headless: bool,
    pub block_resources: bool,
    pub webdriver_url: String,
    pub chrome_executable: Option<PathBuf>,
    pub user_agent: Option<String>,
}

impl EngineSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        let retrieval = &config.retrieval;
        Self {
            site: config.site.clone(),
            wait_selector: retrieval.wait_selector.clone(),
            selector_timeout: retrieval.selector_timeout(),
            headless: retrieval.headless,
            block_resources: retrieval.block_resources,
            webdriver_url: retrieval.webdriver_url.trim_end_matches('/').to_string(),
            chrome_executable: retrieval.chrome_executable.clone(),
            user_agent: retrieval.user_agent.clone(),
        }
    }

    /// Results-page URL for a query.
    pub fn search_url(&self, query: &Query) -> Result<String> {
        Ok(self.site.search_url(query)?)
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// Instantiate the configured engines in priority order.
pub fn build_engines(config: &AppConfig) -> Vec<Arc<dyn RetrievalEngine>> {
    let settings = EngineSettings::from_config(config);

    config
        .retrieval
        .engines
        .iter()
        .map(|id| -> Arc<dyn RetrievalEngine> {
            match id {
                EngineId::Chromium => Arc::new(ChromiumEngine::new(settings.clone())),
                EngineId::HeadlessChrome => Arc::new(HeadlessChromeEngine::new(settings.clone())),
                EngineId::WebDriver => Arc::new(WebDriverEngine::new(settings.clone())),
                EngineId::Http => Arc::new(HttpEngine::new(settings.clone())),
            }
        })
        .collect()
}
