//! Pipeline orchestration for MCP server generation.
//!
//! This module wires the planning and coding agents, progress tracking,
//! template registration, and artifact persistence into a single run.
//!
//! # Pipeline Flow
//!
//! 1. **Intake**: A task id is minted (or adopted from the caller) and the
//!    task appears in the progress store at 10%
//! 2. **Planning**: The planning model turns the request and API
//!    documentation into a structured implementation plan (25%)
//! 3. **Coding**: The coding model turns the plan into server source
//!    files (50%)
//! 4. **Validation**: The generated server is registered as a template
//!    and given its identity (75%)
//! 5. **Completion**: Files and the raw model response are written under
//!    the artifact root (90%), then the task is marked complete (100%)
//!
//! Stage failures degrade instead of aborting: the run continues with
//! fallbacks and the final report carries the accumulated notes in its
//! `error` field while `success` stays `true`.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use mcp_forge::llm::CompletionClient;
//! use mcp_forge::pipeline::{PipelineConfig, PipelineOrchestrator};
//! use mcp_forge::progress::ProgressStore;
//! use mcp_forge::templates::LocalTemplateStore;
//!
//! let config = PipelineConfig::from_env()?;
//! let orchestrator = PipelineOrchestrator::new(
//!     Arc::new(CompletionClient::from_env()?),
//!     Arc::new(LocalTemplateStore::new()),
//!     ProgressStore::new(),
//!     config,
//! );
//!
//! let report = orchestrator
//!     .submit(None, "Build an MCP server for a weather API", &docs, None)
//!     .await;
//!
//! println!("task {} wrote {} files", report.task_id, report.files_written.len());
//! ```
//!
//! # Configuration
//!
//! The pipeline is configured via the `PipelineConfig` builder or
//! environment variables:
//!
//! ```rust,ignore
//! // Via builder pattern
//! let config = PipelineConfig::new()
//!     .with_planning_model("deepseek/deepseek-r1")
//!     .with_pipeline_timeout(Duration::from_secs(180));
//!
//! // Via environment variables (MCP_FORGE_* prefix)
//! let config = PipelineConfig::from_env()?;
//! ```

pub mod config;
pub mod orchestrator;
pub mod state;

// Re-export main types for convenience
pub use config::{ConfigError, PipelineConfig};
pub use orchestrator::{GenerationReport, PipelineOrchestrator};
pub use state::{PipelineStage, PipelineState};
