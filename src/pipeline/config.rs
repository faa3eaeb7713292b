//! Pipeline configuration for the generation orchestrator.
//!
//! This module provides configuration options for a generation run: the
//! models and temperatures for each stage, retry policy, the overall
//! deadline, and where artifacts land on disk.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::agents::{
    CoderSettings, PlannerSettings, DEFAULT_CODING_MODEL, DEFAULT_CODING_TEMPERATURE,
    DEFAULT_DOC_WINDOW_CHARS, DEFAULT_MAX_COMPLETION_TOKENS, DEFAULT_PLANNING_MODEL,
    DEFAULT_PLANNING_TEMPERATURE,
};
use crate::llm::{DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_DELAY_SECS};

/// Default overall deadline for one generation run.
pub const DEFAULT_PIPELINE_TIMEOUT_SECS: u64 = 180;

/// Default directory for generated artifacts.
pub const DEFAULT_ARTIFACT_ROOT: &str = "./generated";

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration for the pipeline orchestrator.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    // Model settings
    /// Model for the planning stage.
    pub planning_model: String,
    /// Model for the coding stage.
    pub coding_model: String,
    /// Sampling temperature for planning.
    pub planning_temperature: f64,
    /// Sampling temperature for coding.
    pub coding_temperature: f64,
    /// Completion token cap for both stages.
    pub max_completion_tokens: u32,
    /// Documentation characters embedded in the planning prompt.
    pub planning_doc_chars: usize,

    // Retry settings
    /// Attempts per model call before giving up.
    pub max_attempts: u32,
    /// Fixed delay between attempts.
    pub retry_delay: Duration,

    // Run settings
    /// Overall deadline for one generation run.
    pub pipeline_timeout: Duration,
    /// Directory where per-task artifacts are written.
    pub artifact_root: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            planning_model: DEFAULT_PLANNING_MODEL.to_string(),
            coding_model: DEFAULT_CODING_MODEL.to_string(),
            planning_temperature: DEFAULT_PLANNING_TEMPERATURE,
            coding_temperature: DEFAULT_CODING_TEMPERATURE,
            max_completion_tokens: DEFAULT_MAX_COMPLETION_TOKENS,
            planning_doc_chars: DEFAULT_DOC_WINDOW_CHARS,

            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_delay: Duration::from_secs(DEFAULT_RETRY_DELAY_SECS),

            pipeline_timeout: Duration::from_secs(DEFAULT_PIPELINE_TIMEOUT_SECS),
            artifact_root: PathBuf::from(DEFAULT_ARTIFACT_ROOT),
        }
    }
}

impl PipelineConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `MCP_FORGE_PLANNING_MODEL`: Planning model (default: deepseek/deepseek-r1)
    /// - `MCP_FORGE_CODING_MODEL`: Coding model (default: qwen/qwen-2.5-coder-32b-instruct)
    /// - `MCP_FORGE_PLANNING_TEMPERATURE`: Planning temperature (default: 0.1)
    /// - `MCP_FORGE_CODING_TEMPERATURE`: Coding temperature (default: 0.2)
    /// - `MCP_FORGE_MAX_COMPLETION_TOKENS`: Completion token cap (default: 8192)
    /// - `MCP_FORGE_PLANNING_DOC_CHARS`: Documentation window in characters (default: 7000)
    /// - `MCP_FORGE_MAX_ATTEMPTS`: Attempts per model call (default: 6)
    /// - `MCP_FORGE_RETRY_DELAY_SECS`: Delay between attempts (default: 3)
    /// - `MCP_FORGE_PIPELINE_TIMEOUT_SECS`: Overall run deadline (default: 180)
    /// - `MCP_FORGE_ARTIFACT_ROOT`: Artifact directory (default: ./generated)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable has an invalid value or the
    /// resulting configuration fails validation.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("MCP_FORGE_PLANNING_MODEL") {
            config.planning_model = val;
        }

        if let Ok(val) = std::env::var("MCP_FORGE_CODING_MODEL") {
            config.coding_model = val;
        }

        if let Ok(val) = std::env::var("MCP_FORGE_PLANNING_TEMPERATURE") {
            config.planning_temperature = parse_env_value(&val, "MCP_FORGE_PLANNING_TEMPERATURE")?;
        }

        if let Ok(val) = std::env::var("MCP_FORGE_CODING_TEMPERATURE") {
            config.coding_temperature = parse_env_value(&val, "MCP_FORGE_CODING_TEMPERATURE")?;
        }

        if let Ok(val) = std::env::var("MCP_FORGE_MAX_COMPLETION_TOKENS") {
            config.max_completion_tokens =
                parse_env_value(&val, "MCP_FORGE_MAX_COMPLETION_TOKENS")?;
        }

        if let Ok(val) = std::env::var("MCP_FORGE_PLANNING_DOC_CHARS") {
            config.planning_doc_chars = parse_env_value(&val, "MCP_FORGE_PLANNING_DOC_CHARS")?;
        }

        if let Ok(val) = std::env::var("MCP_FORGE_MAX_ATTEMPTS") {
            config.max_attempts = parse_env_value(&val, "MCP_FORGE_MAX_ATTEMPTS")?;
        }

        if let Ok(val) = std::env::var("MCP_FORGE_RETRY_DELAY_SECS") {
            let secs: u64 = parse_env_value(&val, "MCP_FORGE_RETRY_DELAY_SECS")?;
            config.retry_delay = Duration::from_secs(secs);
        }

        if let Ok(val) = std::env::var("MCP_FORGE_PIPELINE_TIMEOUT_SECS") {
            let secs: u64 = parse_env_value(&val, "MCP_FORGE_PIPELINE_TIMEOUT_SECS")?;
            config.pipeline_timeout = Duration::from_secs(secs);
        }

        if let Ok(val) = std::env::var("MCP_FORGE_ARTIFACT_ROOT") {
            config.artifact_root = PathBuf::from(val);
        }

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` if any values are invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.planning_model.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "planning_model cannot be empty".to_string(),
            ));
        }

        if self.coding_model.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "coding_model cannot be empty".to_string(),
            ));
        }

        if !(0.0..=2.0).contains(&self.planning_temperature) {
            return Err(ConfigError::ValidationFailed(
                "planning_temperature must be between 0.0 and 2.0".to_string(),
            ));
        }

        if !(0.0..=2.0).contains(&self.coding_temperature) {
            return Err(ConfigError::ValidationFailed(
                "coding_temperature must be between 0.0 and 2.0".to_string(),
            ));
        }

        if self.max_completion_tokens == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_completion_tokens must be greater than 0".to_string(),
            ));
        }

        if self.max_attempts == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_attempts must be greater than 0".to_string(),
            ));
        }

        if self.pipeline_timeout.as_secs() == 0 {
            return Err(ConfigError::ValidationFailed(
                "pipeline_timeout must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Planner settings derived from this configuration.
    pub fn planner_settings(&self) -> PlannerSettings {
        PlannerSettings::new()
            .with_model(self.planning_model.clone())
            .with_temperature(self.planning_temperature)
            .with_max_tokens(self.max_completion_tokens)
            .with_doc_window_chars(self.planning_doc_chars)
    }

    /// Coder settings derived from this configuration.
    pub fn coder_settings(&self) -> CoderSettings {
        CoderSettings::new()
            .with_model(self.coding_model.clone())
            .with_temperature(self.coding_temperature)
            .with_max_tokens(self.max_completion_tokens)
    }

    /// Builder method to set the planning model.
    pub fn with_planning_model(mut self, model: impl Into<String>) -> Self {
        self.planning_model = model.into();
        self
    }

    /// Builder method to set the coding model.
    pub fn with_coding_model(mut self, model: impl Into<String>) -> Self {
        self.coding_model = model.into();
        self
    }

    /// Builder method to set the planning temperature.
    pub fn with_planning_temperature(mut self, temperature: f64) -> Self {
        self.planning_temperature = temperature;
        self
    }

    /// Builder method to set the coding temperature.
    pub fn with_coding_temperature(mut self, temperature: f64) -> Self {
        self.coding_temperature = temperature;
        self
    }

    /// Builder method to set the completion token cap.
    pub fn with_max_completion_tokens(mut self, tokens: u32) -> Self {
        self.max_completion_tokens = tokens;
        self
    }

    /// Builder method to set the planning documentation window.
    pub fn with_planning_doc_chars(mut self, chars: usize) -> Self {
        self.planning_doc_chars = chars;
        self
    }

    /// Builder method to set attempts per model call.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Builder method to set the delay between attempts.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Builder method to set the overall run deadline.
    pub fn with_pipeline_timeout(mut self, timeout: Duration) -> Self {
        self.pipeline_timeout = timeout;
        self
    }

    /// Builder method to set the artifact directory.
    pub fn with_artifact_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.artifact_root = root.into();
        self
    }
}

/// Parse an environment variable value into a type.
fn parse_env_value<T: std::str::FromStr>(value: &str, key: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("could not parse '{}'", value),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.planning_model, "deepseek/deepseek-r1");
        assert_eq!(config.coding_model, "qwen/qwen-2.5-coder-32b-instruct");
        assert!((config.planning_temperature - 0.1).abs() < f64::EPSILON);
        assert!((config.coding_temperature - 0.2).abs() < f64::EPSILON);
        assert_eq!(config.planning_doc_chars, 7000);
        assert_eq!(config.max_attempts, 6);
        assert_eq!(config.retry_delay, Duration::from_secs(3));
        assert_eq!(config.pipeline_timeout, Duration::from_secs(180));
        assert_eq!(config.artifact_root, PathBuf::from("./generated"));
    }

    #[test]
    fn test_config_builder() {
        let config = PipelineConfig::new()
            .with_planning_model("custom/planner")
            .with_coding_model("custom/coder")
            .with_planning_temperature(0.3)
            .with_coding_temperature(0.4)
            .with_max_completion_tokens(2048)
            .with_planning_doc_chars(500)
            .with_max_attempts(2)
            .with_retry_delay(Duration::from_millis(10))
            .with_pipeline_timeout(Duration::from_secs(30))
            .with_artifact_root("/tmp/forge");

        assert_eq!(config.planning_model, "custom/planner");
        assert_eq!(config.coding_model, "custom/coder");
        assert!((config.planning_temperature - 0.3).abs() < f64::EPSILON);
        assert!((config.coding_temperature - 0.4).abs() < f64::EPSILON);
        assert_eq!(config.max_completion_tokens, 2048);
        assert_eq!(config.planning_doc_chars, 500);
        assert_eq!(config.max_attempts, 2);
        assert_eq!(config.retry_delay, Duration::from_millis(10));
        assert_eq!(config.pipeline_timeout, Duration::from_secs(30));
        assert_eq!(config.artifact_root, PathBuf::from("/tmp/forge"));
    }

    #[test]
    fn test_validation_valid_config() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_zero_attempts() {
        let config = PipelineConfig::default().with_max_attempts(0);
        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("max_attempts"));
    }

    #[test]
    fn test_validation_zero_timeout() {
        let config = PipelineConfig::default().with_pipeline_timeout(Duration::from_secs(0));
        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("pipeline_timeout"));
    }

    #[test]
    fn test_validation_empty_models() {
        let result = PipelineConfig::default().with_planning_model("").validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("planning_model"));

        let result = PipelineConfig::default().with_coding_model("").validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("coding_model"));
    }

    #[test]
    fn test_validation_invalid_temperature() {
        let result = PipelineConfig::default()
            .with_planning_temperature(3.0)
            .validate();
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("planning_temperature"));
    }

    #[test]
    fn test_validation_zero_tokens() {
        let result = PipelineConfig::default()
            .with_max_completion_tokens(0)
            .validate();
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("max_completion_tokens"));
    }

    #[test]
    fn test_from_env_overrides() {
        std::env::set_var("MCP_FORGE_PLANNING_MODEL", "env/planner");
        std::env::set_var("MCP_FORGE_MAX_ATTEMPTS", "3");

        let config = PipelineConfig::from_env().expect("env config");

        std::env::remove_var("MCP_FORGE_PLANNING_MODEL");
        std::env::remove_var("MCP_FORGE_MAX_ATTEMPTS");

        assert_eq!(config.planning_model, "env/planner");
        assert_eq!(config.max_attempts, 3);
        // Untouched fields keep defaults.
        assert_eq!(config.coding_model, "qwen/qwen-2.5-coder-32b-instruct");
    }

    #[test]
    fn test_settings_derivation() {
        let config = PipelineConfig::new()
            .with_planning_model("p/model")
            .with_coding_model("c/model")
            .with_max_completion_tokens(1234)
            .with_planning_doc_chars(99);

        let planner = config.planner_settings();
        assert_eq!(planner.model, "p/model");
        assert_eq!(planner.max_tokens, 1234);
        assert_eq!(planner.doc_window_chars, 99);

        let coder = config.coder_settings();
        assert_eq!(coder.model, "c/model");
        assert_eq!(coder.max_tokens, 1234);
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::InvalidValue {
            key: "KEY".to_string(),
            message: "bad value".to_string(),
        };
        assert!(err.to_string().contains("KEY"));
        assert!(err.to_string().contains("bad value"));

        let err = ConfigError::ValidationFailed("test failure".to_string());
        assert!(err.to_string().contains("test failure"));
    }
}
