//! patscope scanner - multi-engine retrieval and extraction.
//!
//! Fetches a results page through an ordered list of retrieval engines,
//! accepts the first page that passes the validation gate, and turns it into
//! records. Structured selector strategies run first; a text-completion model
//! is asked only when they find nothing.
//!
//! # Features
//!
//! - Sequential engine attempts over bounded retry cycles with fixed backoff
//! - Marker-based validation of fetched pages
//! - Prioritized, TOML-overridable selector strategies
//! - Defensive parsing of model replies
//! - Per-engine failure reports for callers
//!
//! # Example
//!
//! ```rust,no_run
//! use patscope_core::AppConfig;
//! use patscope_scanner::Pipeline;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pipeline = Pipeline::from_config(&AppConfig::load_with_env()?)?;
//!
//! match pipeline.extract("semaglutide").await {
//!     Ok(result) => println!("{} records from {}", result.total_results, result.source),
//!     Err(e) => eprintln!("{}", serde_json::to_string(&e.report())?),
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

#[allow(missing_docs)]
pub mod error;
#[allow(missing_docs)]
pub mod fallback;
pub mod orchestrator;
#[allow(missing_docs)]
pub mod parser;
pub mod pipeline;
pub mod strategy;
pub mod validator;

// Re-export commonly used types
pub use error::{EngineFailure, ErrorReport, Result, ScanError};
pub use fallback::{FallbackExtractor, FallbackOutcome, GenerativeFallbackError};
pub use orchestrator::{RawContent, Retrieval, RetryOrchestrator, RetryPolicy};
pub use parser::{StructuredExtractor, StructuredMatch};
pub use pipeline::Pipeline;
pub use strategy::{FieldLocator, FieldRule, RecordField, SelectorStrategy, StrategySet, StrategyTier};
pub use validator::{matched_markers, validate};
