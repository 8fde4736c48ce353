//! Shared types used across patscope.

use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Longest search term accepted, in characters.
pub const MAX_QUERY_CHARS: usize = 512;

/// A validated, immutable search term.
///
/// Leading and trailing whitespace is trimmed; the remaining text must be
/// non-empty and at most [`MAX_QUERY_CHARS`] characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Query(String);

impl Query {
    /// Create a new `Query` from caller input.
    ///
    /// # Errors
    /// Returns a validation error if the term is blank or too long.
    pub fn new(term: impl AsRef<str>) -> Result<Self, CoreError> {
        let term = term.as_ref().trim();

        if term.is_empty() {
            return Err(CoreError::Validation(
                "search term must not be empty".to_string(),
            ));
        }

        let len = term.chars().count();
        if len > MAX_QUERY_CHARS {
            return Err(CoreError::Validation(format!(
                "search term must be at most {MAX_QUERY_CHARS} characters, got {len}"
            )));
        }

        Ok(Self(term.to_string()))
    }

    /// Get the inner string value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a retrieval engine.
///
/// The order in which engines are tried comes from configuration, never
/// from this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineId {
    /// Headless Chromium driven over CDP by `chromiumoxide`
    Chromium,
    /// Headless Chrome driven by the `headless_chrome` crate
    HeadlessChrome,
    /// Any W3C WebDriver endpoint (chromedriver, Selenium Grid)
    WebDriver,
    /// Plain HTTP GET without a browser
    Http,
}

impl EngineId {
    /// Every engine, in the default priority order.
    pub const ALL: [EngineId; 4] = [
        EngineId::Chromium,
        EngineId::HeadlessChrome,
        EngineId::WebDriver,
        EngineId::Http,
    ];

    /// Stable snake-case name used in logs, config and reports.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            EngineId::Chromium => "chromium",
            EngineId::HeadlessChrome => "headless_chrome",
            EngineId::WebDriver => "web_driver",
            EngineId::Http => "http",
        }
    }
}

impl fmt::Display for EngineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EngineId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "chromium" | "chromiumoxide" => Ok(EngineId::Chromium),
            "headless_chrome" => Ok(EngineId::HeadlessChrome),
            "web_driver" | "webdriver" | "selenium" => Ok(EngineId::WebDriver),
            "http" | "reqwest" => Ok(EngineId::Http),
            other => Err(CoreError::Validation(format!("unknown engine '{other}'"))),
        }
    }
}

/// Why a single engine attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineFailureKind {
    /// The automation resource could not start
    Launch,
    /// The page never finished loading
    NavigationTimeout,
    /// The page loaded but the expected content marker never appeared
    SelectorTimeout,
    /// Navigation or protocol failure that was not a timeout
    Navigation,
    /// Non-success HTTP status
    Http,
    /// The engine returned an empty body
    EmptyContent,
}

impl EngineFailureKind {
    /// Stable snake-case name used in reports.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            EngineFailureKind::Launch => "launch",
            EngineFailureKind::NavigationTimeout => "navigation_timeout",
            EngineFailureKind::SelectorTimeout => "selector_timeout",
            EngineFailureKind::Navigation => "navigation",
            EngineFailureKind::Http => "http",
            EngineFailureKind::EmptyContent => "empty_content",
        }
    }
}

impl fmt::Display for EngineFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_trims_input() {
        let query = Query::new("  semaglutide \n").expect("valid query");
        assert_eq!(query.as_str(), "semaglutide");
        assert_eq!(query.to_string(), "semaglutide");
    }

    #[test]
    fn test_query_rejects_blank() {
        assert!(Query::new("").is_err());
        assert!(Query::new("   \t").is_err());
    }

    #[test]
    fn test_query_rejects_overlong() {
        let long = "a".repeat(MAX_QUERY_CHARS + 1);
        let err = Query::new(long).unwrap_err();
        assert!(err.to_string().contains("at most 512"));

        assert!(Query::new("a".repeat(MAX_QUERY_CHARS)).is_ok());
    }

    #[test]
    fn test_query_serializes_as_string() {
        let query = Query::new("insulin").expect("valid query");
        let json = serde_json::to_string(&query).expect("serialize query");
        assert_eq!(json, "\"insulin\"");
    }

    #[test]
    fn test_engine_id_parsing() {
        assert_eq!("chromium".parse::<EngineId>().unwrap(), EngineId::Chromium);
        assert_eq!(
            "headless-chrome".parse::<EngineId>().unwrap(),
            EngineId::HeadlessChrome
        );
        assert_eq!("WebDriver".parse::<EngineId>().unwrap(), EngineId::WebDriver);
        assert_eq!("selenium".parse::<EngineId>().unwrap(), EngineId::WebDriver);
        assert_eq!(" http ".parse::<EngineId>().unwrap(), EngineId::Http);
        assert!("puppeteer".parse::<EngineId>().is_err());
    }

    #[test]
    fn test_engine_id_round_trips_through_display() {
        for id in EngineId::ALL {
            assert_eq!(id.to_string().parse::<EngineId>().unwrap(), id);
        }
    }

    #[test]
    fn test_failure_kind_serialization() {
        let json = serde_json::to_string(&EngineFailureKind::SelectorTimeout).unwrap();
        assert_eq!(json, "\"selector_timeout\"");
        assert_eq!(EngineFailureKind::NavigationTimeout.as_str(), "navigation_timeout");
    }
}
