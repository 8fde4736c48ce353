//! Patscope LLM - text-completion providers for the generative fallback tier.
//!
//! The scanner treats a provider as an opaque service: a system prompt and a
//! user message go in, free text comes out. Two wire formats are supported:
//!
//! - **OpenAI-compatible** chat completions (Groq, `OpenAI`, LM Studio and
//!   any other server speaking `/chat/completions`)
//! - **Ollama** `/api/generate`
//!
//! # Example
//!
//! ```rust,no_run
//! use patscope_llm::{CompletionRequest, LlmProvider, OpenAiProvider};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let provider = OpenAiProvider::groq("gsk-...")?;
//! let request = CompletionRequest::new("List the patents on this page.")
//!     .with_system_prompt("Reply with a JSON array.")
//!     .with_temperature(0.0);
//! let response = provider.complete(request).await?;
//! println!("{}", response.content);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod error;
pub mod factory;
pub mod provider;
pub mod providers;

// Re-export commonly used types
pub use error::{LlmError, Result};
pub use factory::from_config;
pub use provider::{CompletionRequest, CompletionResponse, LlmProvider, Message, Role, Usage};
pub use providers::{OllamaProvider, OpenAiProvider};
