//! Plain HTTP fetch without a browser.

use crate::engine::{EngineSettings, RetrievalEngine};
use crate::error::{EngineError, Result};
use crate::fingerprint::FingerprintConfig;
use patscope_core::{EngineId, Query};
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE};
use reqwest::redirect::Policy;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

/// Cheapest engine; only succeeds when the site serves results without
/// client-side rendering.
pub struct HttpEngine {
    settings: EngineSettings,
}

impl HttpEngine {
    pub fn new(settings: EngineSettings) -> Self {
        Self { settings }
    }

    /// Fetch an already-built URL.
    pub async fn fetch_url(&self, url: &str, timeout: Duration) -> Result<String> {
        let fingerprint = FingerprintConfig::with_user_agent(self.settings.user_agent.as_deref());

        let client = Client::builder()
            .user_agent(fingerprint.user_agent)
            .redirect(Policy::limited(10))
            .timeout(timeout)
            .build()
            .map_err(|e| EngineError::Launch {
                engine: EngineId::Http,
                reason: format!("failed to create HTTP client: {e}"),
            })?;

        debug!(%url, timeout_ms = timeout.as_millis(), "Fetching over HTTP");
        let response = client
            .get(url)
            .header(
                ACCEPT,
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            )
            .header(ACCEPT_LANGUAGE, "en-US,en;q=0.9")
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    EngineError::NavigationTimeout {
                        url: url.to_string(),
                        timeout,
                    }
                } else {
                    EngineError::Navigation(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(EngineError::Http {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| EngineError::Navigation(format!("failed to read response body: {e}")))?;

        if body.trim().is_empty() {
            return Err(EngineError::EmptyContent);
        }
        Ok(body)
    }
}

#[async_trait::async_trait]
impl RetrievalEngine for HttpEngine {
    fn id(&self) -> EngineId {
        EngineId::Http
    }

    async fn fetch(&self, query: &Query, timeout: Duration) -> Result<String> {
        let url = self.settings.search_url(query)?;
        self.fetch_url(&url, timeout).await
    }
}
