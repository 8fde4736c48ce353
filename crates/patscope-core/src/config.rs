//! Configuration management for patscope.
//!
//! Provides TOML-based configuration with XDG-compliant paths and
//! environment variable overrides.

use crate::error::{ConfigError, ConfigResult};
use crate::types::{EngineId, Query};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming an explicit config file.
pub const CONFIG_PATH_ENV: &str = "PATSCOPE_CONFIG";

/// Main application configuration.
///
/// Loaded from `$PATSCOPE_CONFIG` or `~/.config/patscope/config.toml`
/// (or platform equivalent). Missing files and missing sections fall back
/// to defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Target search site
    pub site: SiteConfig,
    /// Engine selection and retry behaviour
    pub retrieval: RetrievalConfig,
    /// Structured extraction settings
    pub extraction: ExtractionConfig,
    /// Generative fallback settings
    pub llm: LlmConfig,
    /// HTTP shell settings
    pub server: ServerConfig,
}

impl AppConfig {
    /// Load configuration from disk, falling back to defaults if not found.
    ///
    /// # Errors
    /// Returns error if:
    /// - Config directory cannot be determined
    /// - File exists but cannot be read
    /// - File contents are not valid TOML
    pub fn load() -> ConfigResult<Self> {
        let config_path = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) if !path.trim().is_empty() => PathBuf::from(path),
            _ => Self::config_path()?,
        };
        Self::load_from(&config_path)
    }

    /// Load configuration from a specific file, falling back to defaults if it
    /// does not exist.
    pub fn load_from(path: &Path) -> ConfigResult<Self> {
        if path.exists() {
            tracing::debug!("Loading config from {}", path.display());
            let contents = fs::read_to_string(path)?;
            let config: Self = toml::from_str(&contents)?;
            config.validate()?;
            Ok(config)
        } else {
            tracing::debug!("Config file not found at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Load configuration with environment variable overrides applied.
    pub fn load_with_env() -> ConfigResult<Self> {
        let mut config = Self::load()?;
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply overrides from an environment lookup.
    ///
    /// Supports the following variables:
    /// - `PORT`, `PATSCOPE_HOST`: server bind address
    /// - `PATSCOPE_RATE_LIMIT_PER_MINUTE`: per-client search limit (0 disables)
    /// - `PATSCOPE_ENGINES`: comma-separated engine priority list
    /// - `PATSCOPE_HEADLESS`: browser headless mode (true/false)
    /// - `PATSCOPE_MAX_CYCLES`: retry cycles
    /// - `PATSCOPE_WEBDRIVER_URL`: WebDriver endpoint
    /// - `PATSCOPE_LLM_PROVIDER`, `PATSCOPE_LLM_MODEL`: generative provider
    /// - `PATSCOPE_LLM_API_KEY`, else `GROQ_API_KEY` / `OPENAI_API_KEY` by provider
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> ConfigResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = lookup("PORT") {
            let port = val.trim().parse().map_err(|_| ConfigError::InvalidValue {
                field: "PORT".to_string(),
                reason: format!("not a port number: '{val}'"),
            })?;
            self.server.port = port;
            tracing::debug!("Override server.port from env: {}", port);
        }

        if let Some(host) = lookup("PATSCOPE_HOST") {
            self.server.host = host;
        }

        if let Some(val) = lookup("PATSCOPE_RATE_LIMIT_PER_MINUTE") {
            let limit = val.trim().parse().map_err(|_| ConfigError::InvalidValue {
                field: "PATSCOPE_RATE_LIMIT_PER_MINUTE".to_string(),
                reason: format!("not a request count: '{val}'"),
            })?;
            self.server.rate_limit_per_minute = limit;
            tracing::debug!("Override server.rate_limit_per_minute from env: {}", limit);
        }

        if let Some(val) = lookup("PATSCOPE_ENGINES") {
            let engines = val
                .split(',')
                .filter(|s| !s.trim().is_empty())
                .map(str::parse)
                .collect::<Result<Vec<EngineId>, _>>()
                .map_err(|e| ConfigError::InvalidValue {
                    field: "PATSCOPE_ENGINES".to_string(),
                    reason: e.to_string(),
                })?;
            tracing::debug!("Override retrieval.engines from env: {:?}", engines);
            self.retrieval.engines = engines;
        }

        if let Some(val) = lookup("PATSCOPE_HEADLESS") {
            if let Ok(headless) = val.parse() {
                self.retrieval.headless = headless;
                tracing::debug!("Override retrieval.headless from env: {}", headless);
            }
        }

        if let Some(val) = lookup("PATSCOPE_MAX_CYCLES") {
            if let Ok(cycles) = val.parse() {
                self.retrieval.max_cycles = cycles;
                tracing::debug!("Override retrieval.max_cycles from env: {}", cycles);
            }
        }

        if let Some(url) = lookup("PATSCOPE_WEBDRIVER_URL") {
            self.retrieval.webdriver_url = url;
        }

        if let Some(provider) = lookup("PATSCOPE_LLM_PROVIDER") {
            self.llm.provider = provider.trim().to_ascii_lowercase();
        }

        if let Some(model) = lookup("PATSCOPE_LLM_MODEL") {
            self.llm.model = Some(model);
        }

        let provider_key_var = match self.llm.provider.as_str() {
            "groq" => Some("GROQ_API_KEY"),
            "openai" => Some("OPENAI_API_KEY"),
            _ => None,
        };
        if let Some(key) = lookup("PATSCOPE_LLM_API_KEY")
            .or_else(|| provider_key_var.and_then(|var| lookup(var)))
            .filter(|k| !k.trim().is_empty())
        {
            self.llm.api_key = Some(key);
        }

        self.validate()
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.retrieval.engines.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "retrieval.engines".to_string(),
                reason: "at least one engine is required".to_string(),
            });
        }

        if url::Url::parse(&self.site.base_url).is_err() {
            return Err(ConfigError::InvalidValue {
                field: "site.base_url".to_string(),
                reason: format!("not an absolute URL: '{}'", self.site.base_url),
            });
        }

        if !self.site.query_template.contains("{query}") {
            return Err(ConfigError::InvalidValue {
                field: "site.query_template".to_string(),
                reason: "must contain the {query} placeholder".to_string(),
            });
        }

        Ok(())
    }

    /// Get the path to the configuration file.
    ///
    /// Uses XDG base directories: `~/.config/patscope/config.toml`
    pub fn config_path() -> ConfigResult<PathBuf> {
        let dirs =
            ProjectDirs::from("org", "patscope", "patscope").ok_or(ConfigError::NoConfigDir)?;
        Ok(dirs.config_dir().join("config.toml"))
    }
}

/// The single external search service being queried.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    /// Origin used for search URLs and to resolve relative links
    pub base_url: String,
    /// Path of the results page
    pub search_path: String,
    /// Query expression sent to the site; `{query}` is replaced by the term
    pub query_template: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            base_url: "https://patentscope.wipo.int".to_string(),
            search_path: "/search/en/result.jsf".to_string(),
            query_template: "FP:({query})".to_string(),
        }
    }
}

impl SiteConfig {
    /// Build the results-page URL for a query.
    pub fn search_url(&self, query: &Query) -> ConfigResult<String> {
        let mut url = url::Url::parse(&self.base_url)
            .and_then(|base| base.join(&self.search_path))
            .map_err(|e| ConfigError::InvalidValue {
                field: "site.base_url".to_string(),
                reason: e.to_string(),
            })?;

        let expression = self.query_template.replace("{query}", query.as_str());
        url.query_pairs_mut().append_pair("query", &expression);
        Ok(url.to_string())
    }
}

/// Engine selection and retry behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Engines in priority order
    pub engines: Vec<EngineId>,
    /// Full passes over the engine list before giving up
    pub max_cycles: u32,
    /// Pause between cycles in which no engine succeeded, in milliseconds
    pub cycle_backoff_ms: u64,
    /// Page navigation timeout in seconds
    pub navigation_timeout_secs: u64,
    /// Wait for the content marker selector, in seconds
    pub selector_timeout_secs: u64,
    /// CSS selector that marks a settled results page
    pub wait_selector: String,
    /// Run browsers headless
    pub headless: bool,
    /// Skip images/fonts in browser engines
    pub block_resources: bool,
    /// W3C WebDriver endpoint (chromedriver, Selenium Grid)
    pub webdriver_url: String,
    /// Explicit Chrome/Chromium binary
    pub chrome_executable: Option<PathBuf>,
    /// Fixed user agent; a desktop user agent is picked at random when unset
    pub user_agent: Option<String>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            engines: EngineId::ALL.to_vec(),
            max_cycles: 3,
            cycle_backoff_ms: 2000,
            navigation_timeout_secs: 45,
            selector_timeout_secs: 15,
            wait_selector: ".resultItem, .result-table, .results-table, #resultTable".to_string(),
            headless: true,
            block_resources: true,
            webdriver_url: "http://localhost:9515".to_string(),
            chrome_executable: None,
            user_agent: None,
        }
    }
}

impl RetrievalConfig {
    /// Navigation timeout as a `Duration`.
    #[must_use]
    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout_secs)
    }

    /// Selector wait timeout as a `Duration`.
    #[must_use]
    pub fn selector_timeout(&self) -> Duration {
        Duration::from_secs(self.selector_timeout_secs)
    }

    /// Inter-cycle backoff as a `Duration`.
    #[must_use]
    pub fn cycle_backoff(&self) -> Duration {
        Duration::from_millis(self.cycle_backoff_ms)
    }

    /// Overall budget for one engine call: navigation plus selector wait.
    #[must_use]
    pub fn engine_timeout(&self) -> Duration {
        self.navigation_timeout() + self.selector_timeout()
    }
}

/// Structured extraction settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// TOML file replacing the built-in selector strategies
    pub strategies_path: Option<PathBuf>,
}

/// Generative fallback settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Whether the generative tier may be used at all
    pub enabled: bool,
    /// Provider: `groq`, `openai`, `openai_compatible`, `ollama`, or `none`
    pub provider: String,
    /// Model name; provider default when unset
    pub model: Option<String>,
    /// Endpoint override (required for `openai_compatible`)
    pub base_url: Option<String>,
    /// API key (read from the environment only)
    #[serde(skip)]
    pub api_key: Option<String>,
    /// Characters of page content sent to the model
    pub max_content_chars: usize,
    /// Maximum tokens for the completion
    pub max_tokens: u32,
    /// Sampling temperature
    pub temperature: f32,
    /// HTTP timeout for the completion call, in seconds
    pub timeout_secs: u64,
    /// Run the generative tier on the last unvalidated page when every engine
    /// was exhausted
    pub fallback_on_unvalidated: bool,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            provider: "groq".to_string(),
            model: None,
            base_url: None,
            api_key: None,
            max_content_chars: 6000,
            max_tokens: 2048,
            temperature: 0.0,
            timeout_secs: 60,
            fallback_on_unvalidated: true,
        }
    }
}

/// HTTP shell settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind host
    pub host: String,
    /// Bind port
    pub port: u16,
    /// Searches accepted per client IP per minute; 0 disables the limit
    pub rate_limit_per_minute: u32,
    /// Gzip-compress responses
    pub compression: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            rate_limit_per_minute: 60,
            compression: true,
        }
    }
}
