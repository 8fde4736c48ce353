//! W3C WebDriver engine (chromedriver, Selenium Grid) spoken over `reqwest`.

use crate::engine::{EngineSettings, RetrievalEngine};
use crate::error::{EngineError, Result};
use crate::fingerprint::FingerprintConfig;
use patscope_core::{EngineId, Query};
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

const SELECTOR_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Drives a remote browser through the WebDriver JSON protocol.
pub struct WebDriverEngine {
    settings: EngineSettings,
}

impl WebDriverEngine {
    pub fn new(settings: EngineSettings) -> Self {
        Self { settings }
    }

    fn capabilities(&self, nav_timeout: Duration) -> Value {
        let fingerprint = FingerprintConfig::with_user_agent(self.settings.user_agent.as_deref());

        let mut args = vec![
            "--no-sandbox".to_string(),
            "--disable-dev-shm-usage".to_string(),
            format!("--user-agent={}", fingerprint.user_agent),
            format!(
                "--window-size={},{}",
                fingerprint.viewport_width, fingerprint.viewport_height
            ),
        ];
        if self.settings.headless {
            args.push("--headless=new".to_string());
        }

        let mut chrome_options = json!({ "args": args });
        if self.settings.block_resources {
            chrome_options["prefs"] = json!({ "profile.managed_default_content_settings.images": 2 });
        }
        if let Some(path) = &self.settings.chrome_executable {
            chrome_options["binary"] = json!(path.display().to_string());
        }

        json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "pageLoadStrategy": "normal",
                    "timeouts": { "pageLoad": duration_ms(nav_timeout) },
                    "goog:chromeOptions": chrome_options,
                }
            }
        })
    }
}

#[async_trait::async_trait]
impl RetrievalEngine for WebDriverEngine {
    fn id(&self) -> EngineId {
        EngineId::WebDriver
    }

    async fn fetch(&self, query: &Query, timeout: Duration) -> Result<String> {
        let url = self.settings.search_url(query)?;

        let client = Client::builder()
            .timeout(timeout + self.settings.selector_timeout)
            .build()
            .map_err(|e| EngineError::Launch {
                engine: EngineId::WebDriver,
                reason: format!("failed to create HTTP client: {e}"),
            })?;

        let session = WebDriverSession::create(
            client,
            &self.settings.webdriver_url,
            &self.capabilities(timeout),
        )
        .await?;
        let outcome = session.load(&url, timeout, &self.settings).await;
        session.delete().await;

        outcome
    }
}

/// One remote browser session.
///
/// Ended with `delete` on the normal path. If the fetch future is dropped
/// first (the orchestrator's deadline fired), `Drop` sends the DELETE from a
/// spawned task so the remote browser is still released.
struct WebDriverSession {
    client: Client,
    base_url: String,
    id: String,
    deleted: bool,
}

impl WebDriverSession {
    async fn create(client: Client, base_url: &str, capabilities: &Value) -> Result<Self> {
        let value = call(client.post(format!("{base_url}/session")).json(capabilities))
            .await
            .map_err(|e| EngineError::Launch {
                engine: EngineId::WebDriver,
                reason: e.to_string(),
            })?;

        let session: NewSession = serde_json::from_value(value).map_err(|e| EngineError::Launch {
            engine: EngineId::WebDriver,
            reason: format!("unexpected new-session response: {e}"),
        })?;

        debug!(session_id = %session.session_id, "WebDriver session created");
        Ok(Self {
            client,
            base_url: base_url.to_string(),
            id: session.session_id,
            deleted: false,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/session/{}/{path}", self.base_url, self.id)
    }

    async fn load(&self, url: &str, nav_timeout: Duration, settings: &EngineSettings) -> Result<String> {
        debug!(%url, timeout_ms = nav_timeout.as_millis(), "Navigating with WebDriver");
        if let Err(e) = call(self.client.post(self.endpoint("url")).json(&json!({ "url": url }))).await {
            return Err(if e.is_timeout() {
                EngineError::NavigationTimeout {
                    url: url.to_string(),
                    timeout: nav_timeout,
                }
            } else {
                EngineError::Navigation(e.to_string())
            });
        }

        self.wait_for_selector(&settings.wait_selector, settings.selector_timeout)
            .await?;

        let source = call(self.client.get(self.endpoint("source")))
            .await
            .map_err(|e| EngineError::Navigation(format!("failed to read page source: {e}")))?;

        match source {
            Value::String(html) if !html.trim().is_empty() => Ok(html),
            _ => Err(EngineError::EmptyContent),
        }
    }

    async fn wait_for_selector(&self, selector: &str, budget: Duration) -> Result<()> {
        let deadline = Instant::now() + budget;
        let body = json!({ "using": "css selector", "value": selector });

        loop {
            match call(self.client.post(self.endpoint("element")).json(&body)).await {
                Ok(_) => return Ok(()),
                Err(WireError::Protocol { ref error, .. }) if error == "no such element" => {}
                Err(e) => return Err(EngineError::Navigation(e.to_string())),
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

    fn session_url(&self) -> String {
        format!("{}/session/{}", self.base_url, self.id)
    }

    async fn delete(mut self) {
        end_session(self.client.clone(), self.session_url(), self.id.clone()).await;
        self.deleted = true;
    }
}

impl Drop for WebDriverSession {
    fn drop(&mut self) {
        if self.deleted {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(session_id = %self.id, "No runtime to delete abandoned WebDriver session");
            return;
        };
        debug!(session_id = %self.id, "Fetch abandoned, deleting WebDriver session in background");
        runtime.spawn(end_session(
            self.client.clone(),
            self.session_url(),
            self.id.clone(),
        ));
    }
}

async fn end_session(client: Client, url: String, session_id: String) {
    match call(client.delete(url)).await {
        Ok(_) => debug!(%session_id, "WebDriver session deleted"),
        Err(e) => warn!(%session_id, error = %e, "Failed to delete WebDriver session"),
    }
}

#[derive(Debug, thiserror::Error)]
enum WireError {
    #[error("WebDriver request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("WebDriver error ({status}) {error}: {message}")]
    Protocol {
        status: u16,
        error: String,
        message: String,
    },
}

impl WireError {
    fn is_timeout(&self) -> bool {
        match self {
            WireError::Transport(e) => e.is_timeout(),
            WireError::Protocol { error, .. } => error == "timeout",
        }
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    value: Value,
}

#[derive(Debug, Deserialize)]
struct NewSession {
    #[serde(rename = "sessionId")]
    session_id: String,
}

#[derive(Debug, Deserialize)]
struct ErrorValue {
    error: String,
    #[serde(default)]
    message: String,
}

/// Send a WebDriver command and unwrap the `value` envelope.
async fn call(request: RequestBuilder) -> std::result::Result<Value, WireError> {
    let response = request.send().await?;
    let status = response.status();
    let envelope: Envelope = response.json().await?;

    if status.is_success() {
        return Ok(envelope.value);
    }

    let detail: ErrorValue = serde_json::from_value(envelope.value).unwrap_or(ErrorValue {
        error: "unknown error".to_string(),
        message: String::new(),
    });
    Err(WireError::Protocol {
        status: status.as_u16(),
        error: detail.error,
        message: detail.message,
    })
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capabilities_shape() {
        let settings = EngineSettings {
            user_agent: Some("patscope-test/1.0".to_string()),
            ..EngineSettings::default()
        };
        let engine = WebDriverEngine::new(settings);
        let caps = engine.capabilities(Duration::from_secs(45));

        let always = &caps["capabilities"]["alwaysMatch"];
        assert_eq!(always["browserName"], "chrome");
        assert_eq!(always["timeouts"]["pageLoad"], 45_000);

        let args: Vec<&str> = always["goog:chromeOptions"]["args"]
            .as_array()
            .expect("args array")
            .iter()
            .filter_map(Value::as_str)
            .collect();
        assert!(args.contains(&"--headless=new"));
        assert!(args.contains(&"--user-agent=patscope-test/1.0"));
        assert_eq!(
            always["goog:chromeOptions"]["prefs"]["profile.managed_default_content_settings.images"],
            2
        );
    }

    #[test]
    fn test_headed_mode_drops_headless_flag() {
        let settings = EngineSettings {
            headless: false,
            block_resources: false,
            ..EngineSettings::default()
        };
        let caps = WebDriverEngine::new(settings).capabilities(Duration::from_secs(1));
        let options = &caps["capabilities"]["alwaysMatch"]["goog:chromeOptions"];

        assert!(!options["args"]
            .as_array()
            .unwrap()
            .iter()
            .any(|a| a == "--headless=new"));
        assert!(options.get("prefs").is_none());
    }

    #[test]
    fn test_wire_error_timeout_detection() {
        let err = WireError::Protocol {
            status: 500,
            error: "timeout".to_string(),
            message: "page load timed out".to_string(),
        };
        assert!(err.is_timeout());

        let err = WireError::Protocol {
            status: 404,
            error: "no such element".to_string(),
            message: String::new(),
        };
        assert!(!err.is_timeout());
    }
}
