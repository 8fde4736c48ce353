//! patscope core - foundation crate shared by every patscope crate.
//!
//! Provides the value types that flow through the retrieval pipeline, the
//! central error types, and TOML/environment configuration.
//!
//! # Modules
//!
//! - [`error`] - Central error types using thiserror
//! - [`config`] - TOML-based configuration with XDG paths and env overrides
//! - [`types`] - Query, engine identifiers and failure kinds
//! - [`result`] - Extracted records, engine attempts and the extraction result
//!
//! # Example
//!
//! ```rust
//! use patscope_core::{AppConfig, Query};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AppConfig::default();
//! let query = Query::new("semaglutide")?;
//! let url = config.site.search_url(&query)?;
//! assert!(url.starts_with("https://patentscope.wipo.int/"));
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod config;
pub mod error;
pub mod result;
pub mod types;

// Re-export commonly used types
pub use config::{
    AppConfig, ExtractionConfig, LlmConfig, RetrievalConfig, ServerConfig, SiteConfig,
};
pub use error::{ConfigError, ConfigResult, CoreError, Result};
pub use result::{
    AttemptOutcome, EngineAttempt, ExtractedRecord, ExtractionResult, ExtractionSource,
};
pub use types::{EngineFailureKind, EngineId, Query};
