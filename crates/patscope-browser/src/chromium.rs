//! Headless Chromium driven over CDP with `chromiumoxide`.

use crate::engine::{EngineSettings, RetrievalEngine};
use crate::error::{EngineError, Result};
use crate::fingerprint::FingerprintConfig;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::SetUserAgentOverrideParams;
use chromiumoxide::error::CdpError;
use chromiumoxide::Page;
use futures::StreamExt;
use patscope_core::{EngineId, Query};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, trace};

const SELECTOR_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Launches a fresh Chromium per fetch.
pub struct ChromiumEngine {
    settings: EngineSettings,
}

impl ChromiumEngine {
    pub fn new(settings: EngineSettings) -> Self {
        Self { settings }
    }

    async fn load(&self, browser: &Browser, url: &str, nav_timeout: Duration) -> Result<String> {
        let fingerprint = FingerprintConfig::with_user_agent(self.settings.user_agent.as_deref());

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| EngineError::Navigation(format!("failed to open page: {e}")))?;

        page.set_user_agent(SetUserAgentOverrideParams::new(fingerprint.user_agent))
            .await
            .map_err(|e| EngineError::Navigation(format!("failed to set user agent: {e}")))?;

        debug!(%url, timeout_ms = nav_timeout.as_millis(), "Navigating with Chromium");
        match timeout(nav_timeout, page.goto(url)).await {
            Err(_) => {
                return Err(EngineError::NavigationTimeout {
                    url: url.to_string(),
                    timeout: nav_timeout,
                })
            }
            Ok(Err(CdpError::Timeout)) => {
                return Err(EngineError::NavigationTimeout {
                    url: url.to_string(),
                    timeout: nav_timeout,
                })
            }
            Ok(Err(e)) => return Err(EngineError::Navigation(e.to_string())),
            Ok(Ok(_)) => {}
        }

        wait_for_selector(
            &page,
            &self.settings.wait_selector,
            self.settings.selector_timeout,
        )
        .await?;

        let html = page
            .content()
            .await
            .map_err(|e| EngineError::Navigation(format!("failed to read page content: {e}")))?;

        if html.trim().is_empty() {
            return Err(EngineError::EmptyContent);
        }
        Ok(html)
    }
}

#[async_trait::async_trait]
impl RetrievalEngine for ChromiumEngine {
    fn id(&self) -> EngineId {
        EngineId::Chromium
    }

    async fn fetch(&self, query: &Query, timeout: Duration) -> Result<String> {
        let url = self.settings.search_url(query)?;

        let session = ChromiumSession::launch(&self.settings, timeout).await?;
        let outcome = self.load(&session.browser, &url, timeout).await;
        session.close().await;

        outcome
    }
}

/// A browser process plus its CDP event loop, scoped to one fetch.
///
/// `close` shuts the browser down gracefully. If the session is dropped
/// instead (the fetch future was cancelled), the handler task is aborted and
/// the child process is killed with the `Browser`.
struct ChromiumSession {
    browser: Browser,
    handler: JoinHandle<()>,
}

impl ChromiumSession {
    async fn launch(settings: &EngineSettings, request_timeout: Duration) -> Result<Self> {
        let fingerprint = FingerprintConfig::with_user_agent(settings.user_agent.as_deref());

        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .request_timeout(request_timeout)
            .window_size(fingerprint.viewport_width, fingerprint.viewport_height)
            .arg("--disable-dev-shm-usage");

        if !settings.headless {
            builder = builder.with_head();
        }
        if let Some(path) = &settings.chrome_executable {
            builder = builder.chrome_executable(path);
        }
        if settings.block_resources {
            builder = builder.arg("--blink-settings=imagesEnabled=false");
        }

        let config = builder.build().map_err(|e| EngineError::Launch {
            engine: EngineId::Chromium,
            reason: e,
        })?;

        let (browser, mut handler) =
            Browser::launch(config)
                .await
                .map_err(|e| EngineError::Launch {
                    engine: EngineId::Chromium,
                    reason: e.to_string(),
                })?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                trace!(?event, "Chromium event");
            }
        });

        Ok(Self { browser, handler })
    }

    async fn close(mut self) {
        if let Err(e) = self.browser.close().await {
            debug!(error = %e, "Chromium close failed, killing process");
        }
        if let Err(e) = self.browser.wait().await {
            debug!(error = %e, "Waiting for Chromium exit failed");
        }
    }
}

impl Drop for ChromiumSession {
    fn drop(&mut self) {
        self.handler.abort();
    }
}

async fn wait_for_selector(page: &Page, selector: &str, budget: Duration) -> Result<()> {
    let deadline = Instant::now() + budget;
    loop {
        match page.find_element(selector).await {
            Ok(_) => return Ok(()),
            Err(e) if is_connection_error(&e) => {
                return Err(EngineError::Navigation(format!(
                    "browser connection lost while waiting for selector: {e}"
                )))
            }
            Err(_) => {}
        }
        if Instant::now() >= deadline {
            return Err(EngineError::SelectorTimeout {
                selector: selector.to_string(),
                timeout: budget,
            });
        }
        sleep(SELECTOR_POLL_INTERVAL).await;
    }
}

/// Errors after which polling the page again cannot succeed.
fn is_connection_error(err: &CdpError) -> bool {
    matches!(
        err,
        CdpError::Ws(_) | CdpError::Io(_) | CdpError::ChannelSendError(_) | CdpError::NoResponse
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_id() {
        let engine = ChromiumEngine::new(EngineSettings::default());
        assert_eq!(engine.id(), EngineId::Chromium);
    }

    #[test]
    fn test_lost_connection_stops_selector_polling() {
        assert!(is_connection_error(&CdpError::NoResponse));
        assert!(is_connection_error(&CdpError::Io(std::io::Error::new(
            std::io::ErrorKind::BrokenPipe,
            "tab crashed"
        ))));
        assert!(!is_connection_error(&CdpError::NotFound));
        assert!(!is_connection_error(&CdpError::Timeout));
    }

    #[tokio::test]
    async fn test_missing_executable_is_launch_error() {
        let settings = EngineSettings {
            chrome_executable: Some("/nonexistent/patscope/chrome".into()),
            ..EngineSettings::default()
        };
        let engine = ChromiumEngine::new(settings);
        let query = Query::new("insulin").unwrap();

        let err = engine
            .fetch(&query, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Launch { .. }), "got {err:?}");
    }
}
