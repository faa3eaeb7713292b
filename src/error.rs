//! Error types for mcp-forge operations.
//!
//! Defines error types for the major subsystems:
//! - LLM API interactions
//! - Documentation fetching
//! - Artifact storage
//! - Template registry
//!
//! Pipeline stages never surface these to callers directly; the orchestrator
//! folds every stage failure into the task's error field and keeps running.

use thiserror::Error;

/// Errors that can occur during LLM operations.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Missing API base URL: MCP_FORGE_API_BASE environment variable not set")]
    MissingApiBase,

    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("Failed to parse LLM response: {0}")]
    ParseError(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Completion response contained no usable text")]
    EmptyCompletion,

    #[error("API error ({code}): {message}")]
    ApiError { code: u16, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur while fetching API documentation.
#[derive(Debug, Error)]
pub enum DocError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("Documentation fetch returned status {code} for '{url}'")]
    HttpStatus { code: u16, url: String },

    #[error("Documentation at '{0}' was empty")]
    EmptyDocument(String),
}

/// Errors that can occur during artifact storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failed to create directory '{path}': {message}")]
    DirectoryCreationFailed { path: String, message: String },

    #[error("Invalid artifact filename: '{0}'")]
    InvalidFilename(String),

    #[error("Failed to write '{path}': {message}")]
    WriteFailed { path: String, message: String },

    #[error("No artifacts found for task '{0}'")]
    TaskNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur during template registry operations.
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("Template name cannot be empty")]
    EmptyName,

    #[error("Failed to create template record: {0}")]
    CreationFailed(String),
}
