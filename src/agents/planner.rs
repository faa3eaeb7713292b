//! Planning agent that turns API documentation into an implementation plan.
//!
//! The planner reads the user's request plus a window of the fetched
//! documentation and asks the model for a structured plan: service identity,
//! the tools to expose, authentication needs, and dependencies. A plan that
//! fails to parse never aborts a run; the failure is carried in the outcome
//! and later stages fall back to defaults.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::extraction::normalize_structured_text;
use crate::llm::{CompletionOutcome, RetryingCompletionClient};

use super::DEFAULT_MAX_COMPLETION_TOKENS;

/// Default model for the planning stage.
pub const DEFAULT_PLANNING_MODEL: &str = "deepseek/deepseek-r1";

/// Default sampling temperature for planning.
pub const DEFAULT_PLANNING_TEMPERATURE: f64 = 0.1;

/// Default cap, in characters, on documentation embedded in the prompt.
pub const DEFAULT_DOC_WINDOW_CHARS: usize = 7000;

/// Prompt template for the planning stage.
const PLANNING_PROMPT_TEMPLATE: &str = r#"You are an expert planning agent that analyzes API documentation to design MCP (Model Context Protocol) servers.

USER REQUEST: {request}

API DOCUMENTATION:

{documentation}

Your task is to:
1. Analyze the provided API documentation
2. Identify the key endpoints and functionality that should be exposed as MCP tools
3. Create a detailed plan for implementing an MCP server with the FastMCP framework
4. Break the implementation down into clear steps

The implementation must follow the FastMCP pattern:

```python
from mcp.server.fastmcp import FastMCP

mcp = FastMCP("service_name")

@mcp.tool()
async def tool_name(param1: str, param2: int):
    ...

if __name__ == "__main__":
    mcp.run(transport="stdio")
```

You MUST respond with ONLY a JSON object in this exact format:
{
  "service_name": "Name of the MCP service",
  "description": "Description of the service",
  "tools": [
    {
      "name": "tool_name",
      "description": "Tool description",
      "parameters": [
        {"name": "param_name", "type": "param_type", "description": "Parameter description"}
      ],
      "returns": "Description of what the tool returns",
      "endpoint": "API endpoint to call",
      "method": "HTTP method"
    }
  ],
  "auth_requirements": {
    "type": "Type of authentication (API key, OAuth, etc.)",
    "credentials": ["List of required credentials"]
  },
  "dependencies": ["List of Python package dependencies"]
}

Do not include any text outside the JSON object."#;

/// Configuration for the planning agent.
#[derive(Debug, Clone)]
pub struct PlannerSettings {
    /// Model identifier for planning calls.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f64,
    /// Maximum completion tokens.
    pub max_tokens: u32,
    /// Maximum documentation characters embedded in the prompt.
    pub doc_window_chars: usize,
}

impl Default for PlannerSettings {
    fn default() -> Self {
        Self {
            model: DEFAULT_PLANNING_MODEL.to_string(),
            temperature: DEFAULT_PLANNING_TEMPERATURE,
            max_tokens: DEFAULT_MAX_COMPLETION_TOKENS,
            doc_window_chars: DEFAULT_DOC_WINDOW_CHARS,
        }
    }
}

impl PlannerSettings {
    /// Creates settings with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the planning model.
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

    /// Sets the documentation window in characters.
    pub fn with_doc_window_chars(mut self, chars: usize) -> Self {
        self.doc_window_chars = chars;
        self
    }
}

/// One tool the planned server should expose.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannedTool {
    /// Tool name.
    pub name: String,
    /// What the tool does.
    pub description: String,
    /// Parameter descriptions, kept as raw JSON since models vary between
    /// list and schema-object shapes.
    pub parameters: Value,
    /// Description of the return value.
    pub returns: String,
    /// Upstream API endpoint the tool calls.
    pub endpoint: String,
    /// HTTP method for the endpoint.
    pub method: String,
}

/// Structured plan for the server to generate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ImplementationPlan {
    /// Name of the planned service.
    pub service_name: String,
    /// Short description of the service.
    pub description: String,
    /// Tools the server should expose.
    pub tools: Vec<PlannedTool>,
    /// Authentication requirements, kept as raw JSON.
    pub auth_requirements: Value,
    /// Python package dependencies.
    pub dependencies: Vec<String>,
}

impl ImplementationPlan {
    /// Service name used when the plan carries none.
    pub const DEFAULT_SERVICE_NAME: &'static str = "Custom MCP Server";

    /// Description used when the plan carries none.
    pub const DEFAULT_DESCRIPTION: &'static str =
        "MCP server generated from API documentation";

    /// The plan's service name, falling back to the default.
    pub fn display_name(&self) -> &str {
        let trimmed = self.service_name.trim();
        if trimmed.is_empty() {
            Self::DEFAULT_SERVICE_NAME
        } else {
            trimmed
        }
    }

    /// The plan's description, falling back to the default.
    pub fn display_description(&self) -> &str {
        let trimmed = self.description.trim();
        if trimmed.is_empty() {
            Self::DEFAULT_DESCRIPTION
        } else {
            trimmed
        }
    }

    /// Number of planned tools.
    pub fn tool_count(&self) -> usize {
        self.tools.len()
    }
}

/// Result of a planning run.
///
/// Always produced; failure is carried in `error` rather than an `Err`, so
/// the pipeline can continue with defaults.
#[derive(Debug, Clone)]
pub struct PlanOutcome {
    /// Parsed plan, defaulted when parsing failed.
    pub plan: ImplementationPlan,
    /// Plan text for the coding prompt: normalized JSON when parsing
    /// succeeded, otherwise the raw response.
    pub plan_text: String,
    /// Verbatim model response, when any attempt produced text.
    pub raw_response: Option<String>,
    /// Failure description when planning degraded.
    pub error: Option<String>,
}

impl PlanOutcome {
    /// Whether the plan was parsed from model output.
    pub fn parsed(&self) -> bool {
        self.error.is_none()
    }
}

/// Agent driving the planning stage.
pub struct PlannerAgent {
    llm: Arc<RetryingCompletionClient>,
}

impl std::fmt::Debug for PlannerAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlannerAgent").finish_non_exhaustive()
    }
}

impl PlannerAgent {
    /// Creates a planner backed by the given completion client.
    pub fn new(llm: Arc<RetryingCompletionClient>) -> Self {
        Self { llm }
    }

    /// Produces an implementation plan for the request and documentation.
    pub async fn plan(
        &self,
        request: &str,
        documentation: &str,
        settings: &PlannerSettings,
    ) -> PlanOutcome {
        let prompt = self.build_planning_prompt(request, documentation, settings);

        match self
            .llm
            .complete(&prompt, &settings.model, settings.temperature, settings.max_tokens)
            .await
        {
            CompletionOutcome::Text(text) => {
                let normalized = normalize_structured_text(&text);
                match serde_json::from_str::<ImplementationPlan>(&normalized) {
                    Ok(plan) => {
                        info!(
                            service_name = %plan.display_name(),
                            tools = plan.tool_count(),
                            "Implementation plan parsed"
                        );
                        PlanOutcome {
                            plan,
                            plan_text: normalized,
                            raw_response: Some(text),
                            error: None,
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "Implementation plan was not valid JSON");
                        PlanOutcome {
                            plan: ImplementationPlan::default(),
                            plan_text: text.clone(),
                            raw_response: Some(text),
                            error: Some(format!("Planning produced unparseable output: {}", e)),
                        }
                    }
                }
            }
            CompletionOutcome::Exhausted {
                attempts,
                last_error,
            } => {
                warn!(attempts, error = %last_error, "Planning exhausted all attempts");
                PlanOutcome {
                    plan: ImplementationPlan::default(),
                    plan_text: "{}".to_string(),
                    raw_response: None,
                    error: Some(format!(
                        "Planning failed after {} attempts: {}",
                        attempts, last_error
                    )),
                }
            }
        }
    }

    /// Builds the planning prompt with the documentation clipped to the
    /// configured window.
    fn build_planning_prompt(
        &self,
        request: &str,
        documentation: &str,
        settings: &PlannerSettings,
    ) -> String {
        let window = clip_chars(documentation, settings.doc_window_chars);
        PLANNING_PROMPT_TEMPLATE
            .replace("{request}", request)
            .replace("{documentation}", window)
    }
}

/// Truncates `text` to at most `max_chars` characters.
fn clip_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LlmError;
    use crate::llm::{
        Choice, CompletionProvider, CompletionRequest, CompletionResponse, Message, Usage,
    };
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    struct FixedProvider {
        response: Mutex<String>,
    }

    impl FixedProvider {
        fn new(response: impl Into<String>) -> Self {
            Self {
                response: Mutex::new(response.into()),
            }
        }
    }

    #[async_trait]
    impl CompletionProvider for FixedProvider {
        async fn complete(
            &self,
            _request: CompletionRequest,
        ) -> Result<CompletionResponse, LlmError> {
            let content = self.response.lock().expect("lock not poisoned").clone();
            Ok(CompletionResponse {
                id: "mock-id".to_string(),
                model: "mock-model".to_string(),
                choices: vec![Choice {
                    index: 0,
                    message: Message::assistant(content),
                    finish_reason: "stop".to_string(),
                }],
                usage: Usage {
                    prompt_tokens: 100,
                    completion_tokens: 200,
                    total_tokens: 300,
                },
            })
        }
    }

    struct FailingProvider;

    #[async_trait]
    impl CompletionProvider for FailingProvider {
        async fn complete(
            &self,
            _request: CompletionRequest,
        ) -> Result<CompletionResponse, LlmError> {
            Err(LlmError::RequestFailed("connection refused".to_string()))
        }
    }

    fn planner_for(provider: impl CompletionProvider + 'static) -> PlannerAgent {
        let client = RetryingCompletionClient::with_policy(
            Arc::new(provider),
            2,
            Duration::from_millis(1),
        );
        PlannerAgent::new(Arc::new(client))
    }

    #[test]
    fn test_settings_defaults() {
        let settings = PlannerSettings::default();
        assert_eq!(settings.model, DEFAULT_PLANNING_MODEL);
        assert!((settings.temperature - 0.1).abs() < f64::EPSILON);
        assert_eq!(settings.doc_window_chars, 7000);
    }

    #[test]
    fn test_settings_builders() {
        let settings = PlannerSettings::new()
            .with_model("custom/model")
            .with_temperature(0.5)
            .with_max_tokens(1024)
            .with_doc_window_chars(500);

        assert_eq!(settings.model, "custom/model");
        assert!((settings.temperature - 0.5).abs() < f64::EPSILON);
        assert_eq!(settings.max_tokens, 1024);
        assert_eq!(settings.doc_window_chars, 500);
    }

    #[tokio::test]
    async fn test_plan_parses_clean_json() {
        let response = r#"{
            "service_name": "Weather Service",
            "description": "Forecast lookups",
            "tools": [
                {"name": "get_forecast", "description": "Fetch a forecast", "parameters": [], "returns": "Forecast", "endpoint": "/forecast", "method": "GET"}
            ],
            "auth_requirements": {"type": "API key", "credentials": ["API_KEY"]},
            "dependencies": ["httpx"]
        }"#;

        let planner = planner_for(FixedProvider::new(response));
        let outcome = planner
            .plan("weather server", "docs", &PlannerSettings::default())
            .await;

        assert!(outcome.parsed());
        assert_eq!(outcome.plan.service_name, "Weather Service");
        assert_eq!(outcome.plan.tool_count(), 1);
        assert_eq!(outcome.plan.tools[0].name, "get_forecast");
        assert_eq!(outcome.plan.dependencies, vec!["httpx"]);
        assert!(outcome.raw_response.is_some());
    }

    #[tokio::test]
    async fn test_plan_parses_fenced_json() {
        let response = "Here is the plan:\n```json\n{\"service_name\": \"Fenced\", \"description\": \"d\"}\n```";

        let planner = planner_for(FixedProvider::new(response));
        let outcome = planner
            .plan("request", "docs", &PlannerSettings::default())
            .await;

        assert!(outcome.parsed());
        assert_eq!(outcome.plan.service_name, "Fenced");
        assert!(outcome.plan_text.starts_with('{'));
    }

    #[tokio::test]
    async fn test_plan_missing_fields_default() {
        let planner = planner_for(FixedProvider::new(r#"{"service_name": "Minimal"}"#));
        let outcome = planner
            .plan("request", "docs", &PlannerSettings::default())
            .await;

        assert!(outcome.parsed());
        assert_eq!(outcome.plan.service_name, "Minimal");
        assert!(outcome.plan.tools.is_empty());
        assert!(outcome.plan.dependencies.is_empty());
        assert!(outcome.plan.auth_requirements.is_null());
    }

    #[tokio::test]
    async fn test_plan_invalid_json_records_error() {
        let planner = planner_for(FixedProvider::new("I could not produce a plan, sorry."));
        let outcome = planner
            .plan("request", "docs", &PlannerSettings::default())
            .await;

        assert!(!outcome.parsed());
        assert!(outcome.error.is_some());
        assert_eq!(outcome.plan.service_name, "");
        // Raw text still flows to the coding stage and diagnostics.
        assert_eq!(outcome.plan_text, "I could not produce a plan, sorry.");
        assert!(outcome.raw_response.is_some());
    }

    #[tokio::test]
    async fn test_plan_exhausted_records_error() {
        let planner = planner_for(FailingProvider);
        let outcome = planner
            .plan("request", "docs", &PlannerSettings::default())
            .await;

        assert!(!outcome.parsed());
        let error = outcome.error.expect("error recorded");
        assert!(error.contains("2 attempts"));
        assert!(outcome.raw_response.is_none());
        assert_eq!(outcome.plan_text, "{}");
    }

    #[test]
    fn test_display_name_and_description_defaults() {
        let empty = ImplementationPlan::default();
        assert_eq!(empty.display_name(), "Custom MCP Server");
        assert_eq!(
            empty.display_description(),
            "MCP server generated from API documentation"
        );

        let named = ImplementationPlan {
            service_name: "  GitHub Tools  ".to_string(),
            description: "Issue helpers".to_string(),
            ..Default::default()
        };
        assert_eq!(named.display_name(), "GitHub Tools");
        assert_eq!(named.display_description(), "Issue helpers");
    }

    #[test]
    fn test_prompt_clips_documentation() {
        let planner = planner_for(FixedProvider::new("{}"));
        let settings = PlannerSettings::new().with_doc_window_chars(10);
        let docs = "0123456789ABCDEF";

        let prompt = planner.build_planning_prompt("req", docs, &settings);

        assert!(prompt.contains("0123456789"));
        assert!(!prompt.contains("ABCDEF"));
        assert!(prompt.contains("USER REQUEST: req"));
    }

    #[test]
    fn test_clip_chars_respects_boundaries() {
        assert_eq!(clip_chars("hello", 10), "hello");
        assert_eq!(clip_chars("hello", 3), "hel");
        // Multi-byte characters count as one each.
        assert_eq!(clip_chars("héllo", 2), "hé");
        assert_eq!(clip_chars("", 5), "");
    }
}
