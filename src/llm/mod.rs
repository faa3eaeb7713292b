//! LLM integration for mcp-forge.
//!
//! The pipeline drives one external text-completion endpoint. This module
//! provides the request/response types, the [`CompletionProvider`] trait the
//! orchestrator depends on, an HTTP client for OpenAI-compatible APIs, and
//! the bounded-retry wrapper that normalizes provider unreliability into a
//! single success/exhausted outcome.
//!
//! ```ignore
//! use mcp_forge::llm::{CompletionClient, RetryingCompletionClient};
//! use std::sync::Arc;
//!
//! let client = CompletionClient::from_env()?;
//! let retrying = RetryingCompletionClient::new(Arc::new(client));
//!
//! let outcome = retrying
//!     .complete("Summarize this API", "deepseek/deepseek-r1", 0.1, 4000)
//!     .await;
//! if let Some(text) = outcome.text() {
//!     println!("{text}");
//! }
//! ```

pub mod client;
pub mod provider;
pub mod retry;

pub use client::CompletionClient;
pub use provider::{
    Choice, CompletionProvider, CompletionRequest, CompletionResponse, Message, Usage,
};
pub use retry::{
    CompletionOutcome, RetryingCompletionClient, DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_DELAY_SECS,
};
