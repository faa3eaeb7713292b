//! Coding agent that turns an implementation plan into server source files.
//!
//! The coder asks the model for the complete file set of a FastMCP server
//! and recovers a filename-to-content mapping from whatever shape comes
//! back, JSON or not. An empty recovery is recorded in the outcome, never
//! raised; the pipeline falls back to skeleton synthesis downstream.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{info, warn};

use crate::extraction::{extract_file_map, ExtractionSource};
use crate::llm::{CompletionOutcome, RetryingCompletionClient};

use super::DEFAULT_MAX_COMPLETION_TOKENS;

/// Default model for the coding stage.
pub const DEFAULT_CODING_MODEL: &str = "qwen/qwen-2.5-coder-32b-instruct";

/// Default sampling temperature for coding.
pub const DEFAULT_CODING_TEMPERATURE: f64 = 0.2;

/// Prompt template for the coding stage.
const CODING_PROMPT_TEMPLATE: &str = r#"You are an expert coding agent that implements MCP (Model Context Protocol) servers using FastMCP.

USER REQUEST: {request}

IMPLEMENTATION PLAN:
{plan}

Your task is to generate complete, working code for an MCP server that follows the implementation plan.
The code must:
1. Use the FastMCP framework
2. Implement proper error handling
3. Follow Python best practices
4. Include type annotations
5. Be well documented

Generate the following files:
1. main.py - The MCP server entry point with the tool definitions
2. api.py - The HTTP client wrapping the upstream API
3. models.py - Pydantic models for request and response data
4. requirements.txt - Python dependencies, one per line
5. .env.example - Example environment variables

You MUST respond with ONLY a JSON object in this exact format:
{
  "files": [
    {"name": "main.py", "content": "Complete Python source"},
    {"name": "requirements.txt", "content": "Dependencies"}
  ]
}

Do not include any text outside the JSON object."#;

/// Configuration for the coding agent.
#[derive(Debug, Clone)]
pub struct CoderSettings {
    /// Model identifier for coding calls.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f64,
    /// Maximum completion tokens.
    pub max_tokens: u32,
}

impl Default for CoderSettings {
    fn default() -> Self {
        Self {
            model: DEFAULT_CODING_MODEL.to_string(),
            temperature: DEFAULT_CODING_TEMPERATURE,
            max_tokens: DEFAULT_MAX_COMPLETION_TOKENS,
        }
    }
}

impl CoderSettings {
    /// Creates settings with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the coding model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Sets the sampling temperature.
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature.clamp(0.0, 2.0);
        self
    }

    /// Sets the maximum completion tokens.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// Result of a coding run.
///
/// Always produced; an empty file mapping plus `error` marks degradation,
/// never an `Err`.
#[derive(Debug, Clone)]
pub struct CodeOutcome {
    /// Generated files keyed by relative filename.
    pub files: BTreeMap<String, String>,
    /// How the mapping was recovered from model output.
    pub source: ExtractionSource,
    /// Verbatim model response, when any attempt produced text.
    pub raw_response: Option<String>,
    /// Failure description when coding degraded.
    pub error: Option<String>,
}

impl CodeOutcome {
    /// Number of generated files.
    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    /// Whether no files were recovered.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Agent driving the coding stage.
pub struct CoderAgent {
    llm: Arc<RetryingCompletionClient>,
}

impl std::fmt::Debug for CoderAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoderAgent").finish_non_exhaustive()
    }
}

impl CoderAgent {
    /// Creates a coder backed by the given completion client.
    pub fn new(llm: Arc<RetryingCompletionClient>) -> Self {
        Self { llm }
    }

    /// Generates server source files for the request and plan text.
    ///
    /// `plan_text` is the planning stage's output: normalized plan JSON when
    /// planning parsed, otherwise whatever the planning model produced.
    pub async fn generate(
        &self,
        request: &str,
        plan_text: &str,
        settings: &CoderSettings,
    ) -> CodeOutcome {
        let prompt = self.build_coding_prompt(request, plan_text);

        match self
            .llm
            .complete(&prompt, &settings.model, settings.temperature, settings.max_tokens)
            .await
        {
            CompletionOutcome::Text(text) => {
                let extraction = extract_file_map(&text);
                if extraction.is_empty() {
                    warn!("Code generation response contained no extractable files");
                    CodeOutcome {
                        files: BTreeMap::new(),
                        source: ExtractionSource::None,
                        raw_response: Some(text),
                        error: Some(
                            "Code generation produced no extractable files".to_string(),
                        ),
                    }
                } else {
                    info!(
                        files = extraction.files.len(),
                        source = ?extraction.source,
                        "Extracted generated files"
                    );
                    CodeOutcome {
                        files: extraction.files,
                        source: extraction.source,
                        raw_response: Some(text),
                        error: None,
                    }
                }
            }
            CompletionOutcome::Exhausted {
                attempts,
                last_error,
            } => {
                warn!(attempts, error = %last_error, "Code generation exhausted all attempts");
                CodeOutcome {
                    files: BTreeMap::new(),
                    source: ExtractionSource::None,
                    raw_response: None,
                    error: Some(format!(
                        "Code generation failed after {} attempts: {}",
                        attempts, last_error
                    )),
                }
            }
        }
    }

    /// Builds the coding prompt from the request and plan text.
    fn build_coding_prompt(&self, request: &str, plan_text: &str) -> String {
        CODING_PROMPT_TEMPLATE
            .replace("{request}", request)
            .replace("{plan}", plan_text)
    }
}
