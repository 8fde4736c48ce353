//! Retrieval engines for the search results page.
//!
//! Every engine implements [`RetrievalEngine`]: headless Chromium over CDP,
//! `headless_chrome`, a W3C WebDriver endpoint, and a plain HTTP fetch.
//! Each acquires its browser or session per call and releases it before
//! returning.

pub mod chromium;
pub mod engine;
pub mod error;
pub mod fingerprint;
pub mod headless;
pub mod http;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod webdriver;

pub use chromium::ChromiumEngine;
pub use engine::{build_engines, EngineSettings, RetrievalEngine};
pub use error::{EngineError, Result};
pub use fingerprint::FingerprintConfig;
pub use headless::HeadlessChromeEngine;
pub use http::HttpEngine;
pub use webdriver::WebDriverEngine;
