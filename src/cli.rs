//! CLI argument parsing via clap.

use clap::Parser;
use eleven::build_info::{HELP_BUILD_METADATA, LONG_VERSION};

/// Turn natural-language requests into reviewed shell commands.
#[derive(Debug, Parser)]
#[command(name = "eleven", version, long_version = LONG_VERSION, after_help = HELP_BUILD_METADATA)]
pub struct Args {
    /// Query to send. Without one, starts an interactive session.
    pub query: Option<String>,

    /// Execute tool calls without confirmation. Required for DANGEROUS commands.
    #[arg(short = 'f', long = "force")]
    pub force: bool,

    /// Do not append this run to the interaction log.
    #[arg(long = "no-log")]
    pub no_log: bool,

    /// Repeat the query until a reply contains MARKER.
    #[arg(long = "loop", value_name = "MARKER", requires = "query", value_parser = non_blank)]
    pub loop_marker: Option<String>,

    /// Iteration cap for --loop (default from config).
    #[arg(long = "max-iterations", value_name = "N", requires = "loop_marker")]
    pub max_iterations: Option<u32>,

    /// Ask a running loop to stop at its next iteration, then exit.
    #[arg(long = "cancel-loop", value_name = "ID", conflicts_with_all = ["query", "loop_marker"])]
    pub cancel_loop: Option<String>,

    /// Path to config file (default: ./eleven.toml or ~/.config/eleven/eleven.toml).
    #[arg(short = 'c', long = "config")]
    pub config: Option<String>,

    /// Override model name.
    #[arg(short = 'm', long = "model")]
    pub model: Option<String>,

    /// Print keyword-based command suggestions without calling the API.
    #[arg(long = "offline", requires = "query")]
    pub offline: bool,

    /// Disable color output.
    #[arg(long = "no-color")]
    pub no_color: bool,

    /// Write history, loop states and the interaction log to PATH as JSON.
    #[arg(long = "export-data", value_name = "PATH")]
    pub export_data: Option<String>,

    /// Remove all stored history, loop states and logs.
    #[arg(long = "delete-data", conflicts_with = "export_data")]
    pub delete_data: bool,
}

fn non_blank(raw: &str) -> Result<String, String> {
    if raw.trim().is_empty() {
        Err("the completion marker must not be empty".into())
    } else {
        Ok(raw.to_string())
    }
}
