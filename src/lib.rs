//! mcp-forge: MCP server generation from natural-language requests.
//!
//! This library turns a request plus API documentation into a runnable
//! MCP server implementation through a staged LLM pipeline: a planning
//! model maps the documentation to tool definitions, a coding model
//! turns the plan into source files, and the artifacts land on disk
//! keyed by task id.

// Core modules
pub mod agents;
pub mod artifacts;
pub mod cli;
pub mod docs;
pub mod error;
pub mod extraction;
pub mod llm;
pub mod pipeline;
pub mod progress;
pub mod templates;

// Re-export commonly used error types
pub use error::{DocError, LlmError, StorageError, TemplateError};
