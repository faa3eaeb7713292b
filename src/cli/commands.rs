//! CLI command definitions for mcp-forge.
//!
//! This module provides the command-line interface for generating MCP
//! servers from natural-language requests and API documentation.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use serde::Serialize;
use tracing::{info, warn};

use crate::agents::{DEFAULT_CODING_MODEL, DEFAULT_PLANNING_MODEL};
use crate::artifacts::ArtifactWriter;
use crate::docs::{DocumentationSource, ReaderProxyFetcher};
use crate::llm::CompletionClient;
use crate::pipeline::{PipelineConfig, PipelineOrchestrator};
use crate::progress::ProgressStore;
use crate::templates::LocalTemplateStore;

/// Default endpoint for the completions API.
const DEFAULT_API_BASE: &str = "https://openrouter.ai/api/v1";

/// Default output directory for generated servers.
const DEFAULT_OUTPUT_DIR: &str = "./generated";

/// MCP server generator driven by LLM planning and coding stages.
#[derive(Parser)]
#[command(name = "mcp-forge")]
#[command(about = "Generate MCP servers from natural-language requests and API documentation")]
#[command(version)]
#[command(
    long_about = "mcp-forge turns a natural-language request plus API documentation into a runnable\nMCP (Model Context Protocol) server implementation.\n\nA planning model maps the documentation to tool definitions, a coding model turns\nthe plan into Python source files, and the result lands under the output directory\nkeyed by task id.\n\nExample usage:\n  mcp-forge generate --request \"Build an MCP server for the OpenWeather API\" \\\n      --doc-url https://openweathermap.org/api --output ./generated"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Generate an MCP server from a request and API documentation.
    #[command(alias = "gen")]
    Generate(GenerateArgs),

    /// Remove generated artifacts older than a cutoff.
    Clean(CleanArgs),
}

/// Arguments for `mcp-forge generate`.
#[derive(Parser, Debug)]
pub struct GenerateArgs {
    /// Natural-language description of the MCP server to build.
    #[arg(short, long)]
    pub request: String,

    /// URL of the API documentation to ground the server in.
    #[arg(long, conflicts_with = "doc_file")]
    pub doc_url: Option<String>,

    /// Local file containing pre-fetched API documentation.
    #[arg(long)]
    pub doc_file: Option<String>,

    /// Output directory for generated server artifacts.
    #[arg(short = 'o', long, env = "MCP_FORGE_ARTIFACT_ROOT", default_value = DEFAULT_OUTPUT_DIR)]
    pub output: String,

    /// Model for the planning stage.
    #[arg(long, env = "MCP_FORGE_PLANNING_MODEL", default_value = DEFAULT_PLANNING_MODEL)]
    pub planning_model: String,

    /// Model for the coding stage.
    #[arg(long, env = "MCP_FORGE_CODING_MODEL", default_value = DEFAULT_CODING_MODEL)]
    pub coding_model: String,

    /// Base URL of the OpenAI-compatible completions API.
    #[arg(long, env = "MCP_FORGE_API_BASE", default_value = DEFAULT_API_BASE)]
    pub api_base: String,

    /// API key for the completions endpoint.
    #[arg(long, env = "MCP_FORGE_API_KEY")]
    pub api_key: Option<String>,

    /// Track the run under this task id instead of minting one.
    #[arg(long)]
    pub task_id: Option<String>,

    /// Owner recorded on the registered template.
    #[arg(long)]
    pub user: Option<String>,

    /// Overall pipeline deadline in seconds.
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Output the final report as JSON.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Arguments for `mcp-forge clean`.
#[derive(Parser, Debug)]
pub struct CleanArgs {
    /// Remove task directories older than this many hours.
    #[arg(long, default_value = "24")]
    pub max_age_hours: u64,

    /// Artifact directory to clean.
    #[arg(short = 'o', long, env = "MCP_FORGE_ARTIFACT_ROOT", default_value = DEFAULT_OUTPUT_DIR)]
    pub output: String,

    /// Output the summary as JSON.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Parse CLI arguments and return the Cli struct.
///
/// This allows main.rs to access CLI arguments (like log_level) before running commands.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI by parsing arguments and executing the command.
///
/// This is a convenience function that parses CLI args and runs the command.
/// For more control over logging initialization, use `parse_cli()` and `run_with_cli()`.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
///
/// This is the main entry point for the mcp-forge CLI.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Generate(args) => {
            run_generate_command(args).await?;
        }
        Commands::Clean(args) => {
            run_clean_command(args).await?;
        }
    }
    Ok(())
}

// ============================================================================
// Generate Command Implementation
// ============================================================================

async fn run_generate_command(args: GenerateArgs) -> anyhow::Result<()> {
    let documentation = load_documentation(&args).await?;

    let mut config = PipelineConfig::from_env()
        .map_err(|e| anyhow::anyhow!("Invalid pipeline configuration: {}", e))?
        .with_planning_model(&args.planning_model)
        .with_coding_model(&args.coding_model)
        .with_artifact_root(&args.output);
    if let Some(secs) = args.timeout_secs {
        config = config.with_pipeline_timeout(Duration::from_secs(secs));
    }
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid pipeline configuration: {}", e))?;

    if args.api_key.is_none() {
        warn!("No API key configured; the completions endpoint may reject requests");
    }
    let provider = CompletionClient::new(
        args.api_base.clone(),
        args.api_key.clone(),
        args.planning_model.clone(),
    );

    let orchestrator = PipelineOrchestrator::new(
        Arc::new(provider),
        Arc::new(LocalTemplateStore::new()),
        ProgressStore::new(),
        config,
    );

    info!(
        planning_model = %args.planning_model,
        coding_model = %args.coding_model,
        "Starting MCP server generation"
    );
    let report = orchestrator
        .submit(
            args.user.as_deref(),
            &args.request,
            &documentation,
            args.task_id.as_deref(),
        )
        .await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("\n=== MCP Server Generation ===");
    println!("Task:      {}", report.task_id);
    println!("Service:   {}", report.service_name);
    if let Some(summary) = &report.plan_summary {
        println!("Plan:      {}", summary);
    }
    if let Some(template_id) = &report.template_id {
        println!("Template:  {}", template_id);
    }
    if let Some(server_id) = &report.server_id {
        println!("Server:    {}", server_id);
    }
    println!("Status:    {}", report.message);
    println!("Files:     {}", report.files_written.len());
    for file in &report.files_written {
        println!("  {}", file);
    }
    if report.fallback_used {
        println!("Note:      model output was unusable; a placeholder skeleton was written");
    }
    if let Some(error) = &report.error {
        println!("Degraded:  {}", error);
    }
    println!(
        "Artifacts: {}",
        orchestrator.artifacts().task_dir(&report.task_id).display()
    );

    Ok(())
}

/// Resolve the documentation text from `--doc-file` or `--doc-url`.
async fn load_documentation(args: &GenerateArgs) -> anyhow::Result<String> {
    if let Some(path) = &args.doc_file {
        let file = Path::new(path);
        if !file.exists() {
            return Err(anyhow::anyhow!(
                "Documentation file does not exist: {}",
                path
            ));
        }
        let text = fs::read_to_string(file)
            .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", path, e))?;
        return Ok(text);
    }

    if let Some(url) = &args.doc_url {
        let fetcher = ReaderProxyFetcher::from_env();
        let text = fetcher.fetch(url).await.map_err(|e| {
            anyhow::anyhow!("Failed to fetch documentation from {}: {}", url, e)
        })?;
        return Ok(text);
    }

    Err(anyhow::anyhow!(
        "API documentation is required: pass --doc-url or --doc-file"
    ))
}

// ============================================================================
// Clean Command Implementation
// ============================================================================

#[derive(Debug, Clone, Serialize)]
struct CleanOutput {
    removed: usize,
    max_age_hours: u64,
    root: String,
}

async fn run_clean_command(args: CleanArgs) -> anyhow::Result<()> {
    let root = Path::new(&args.output);
    if !root.exists() {
        return Err(anyhow::anyhow!(
            "Artifact directory does not exist: {}",
            args.output
        ));
    }

    let writer = ArtifactWriter::new(root);
    let removed = writer
        .clean_older_than(Duration::from_secs(args.max_age_hours * 3600))
        .await?;

    let output = CleanOutput {
        removed,
        max_age_hours: args.max_age_hours,
        root: args.output.clone(),
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!(
            "Removed {} stale task director{} from {}",
            output.removed,
            if output.removed == 1 { "y" } else { "ies" },
            output.root
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_generate() {
        let cli = Cli::try_parse_from([
            "mcp-forge",
            "generate",
            "--request",
            "Build a weather server",
            "--doc-url",
            "https://example.com/api",
        ])
        .expect("args should parse");

        match cli.command {
            Commands::Generate(args) => {
                assert_eq!(args.request, "Build a weather server");
                assert_eq!(args.doc_url.as_deref(), Some("https://example.com/api"));
                assert!(args.task_id.is_none());
                assert!(!args.json);
            }
            _ => panic!("expected generate command"),
        }
    }

    #[test]
    fn test_cli_generate_alias() {
        let cli = Cli::try_parse_from([
            "mcp-forge",
            "gen",
            "--request",
            "r",
            "--doc-file",
            "./docs.md",
        ])
        .expect("alias should parse");

        assert!(matches!(cli.command, Commands::Generate(_)));
    }

    #[test]
    fn test_cli_rejects_both_doc_sources() {
        let result = Cli::try_parse_from([
            "mcp-forge",
            "generate",
            "--request",
            "r",
            "--doc-url",
            "https://example.com",
            "--doc-file",
            "./docs.md",
        ]);

        assert!(result.is_err());
    }

    #[test]
    fn test_cli_parses_clean() {
        let cli = Cli::try_parse_from(["mcp-forge", "clean", "--max-age-hours", "48"])
            .expect("args should parse");

        match cli.command {
            Commands::Clean(args) => {
                assert_eq!(args.max_age_hours, 48);
                assert_eq!(args.output, DEFAULT_OUTPUT_DIR);
            }
            _ => panic!("expected clean command"),
        }
    }

    #[tokio::test]
    async fn test_load_documentation_requires_source() {
        let args = GenerateArgs {
            request: "r".to_string(),
            doc_url: None,
            doc_file: None,
            output: DEFAULT_OUTPUT_DIR.to_string(),
            planning_model: DEFAULT_PLANNING_MODEL.to_string(),
            coding_model: DEFAULT_CODING_MODEL.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            api_key: None,
            task_id: None,
            user: None,
            timeout_secs: None,
            json: false,
        };

        let result = load_documentation(&args).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_load_documentation_from_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("docs.md");
        fs::write(&path, "# Payments API\nGET /v1/charges").expect("write docs");

        let args = GenerateArgs {
            request: "r".to_string(),
            doc_url: None,
            doc_file: Some(path.to_string_lossy().into_owned()),
            output: DEFAULT_OUTPUT_DIR.to_string(),
            planning_model: DEFAULT_PLANNING_MODEL.to_string(),
            coding_model: DEFAULT_CODING_MODEL.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            api_key: None,
            task_id: None,
            user: None,
            timeout_secs: None,
            json: false,
        };

        let text = load_documentation(&args).await.expect("load docs");
        assert!(text.contains("Payments API"));
    }
}
