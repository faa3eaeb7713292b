//! Command-line interface for mcp-forge.
//!
//! Provides commands for generating MCP servers and cleaning up stale
//! artifacts.

mod commands;

pub use commands::{parse_cli, run, run_with_cli};
