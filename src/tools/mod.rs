//! Tool dispatch.
//!
//! Built-in tools form a closed set ([`BuiltinTool`]); each variant maps to
//! exactly one handler in [`ToolRegistry::execute`]. Config-declared plugins
//! live in a secondary registry that is consulted only when a name does not
//! parse as a built-in.

pub mod files;
pub mod plugin;
pub mod process;
pub mod search;
pub mod shell;

use crate::config::ToolsConfig;
use crate::error::ToolError;
use crate::extract::ToolCall;
use crate::risk::{self, CommandRisk};
use crate::textutil::truncate_with_suffix_by_bytes;
pub use plugin::{PluginRegistry, PluginTool};
pub use process::ExecOutput;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

// ---------------------------------------------------------------------------
// Tool variants
// ---------------------------------------------------------------------------

/// The fixed set of tools the system prompt advertises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinTool {
    Bash,
    View,
    Edit,
    Write,
    Ls,
    Glob,
    Grep,
}

impl BuiltinTool {
    pub const ALL: [BuiltinTool; 7] = [
        Self::Bash,
        Self::View,
        Self::Edit,
        Self::Write,
        Self::Ls,
        Self::Glob,
        Self::Grep,
    ];

    /// Case-insensitive lookup; accepts a few common aliases.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "bash" | "shell" => Some(Self::Bash),
            "view" | "read" => Some(Self::View),
            "edit" => Some(Self::Edit),
            "write" => Some(Self::Write),
            "ls" | "list" => Some(Self::Ls),
            "glob" => Some(Self::Glob),
            "grep" | "search" => Some(Self::Grep),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Bash => "Bash",
            Self::View => "View",
            Self::Edit => "Edit",
            Self::Write => "Write",
            Self::Ls => "Ls",
            Self::Glob => "Glob",
            Self::Grep => "Grep",
        }
    }

    /// Parameter names, in the order the prompt documents them.
    pub fn params(self) -> &'static [&'static str] {
        match self {
            Self::Bash => &["command"],
            Self::View => &["path"],
            Self::Edit => &["path", "old", "new"],
            Self::Write => &["path", "content"],
            Self::Ls => &["path"],
            Self::Glob => &["pattern"],
            Self::Grep => &["query", "dir"],
        }
    }

    pub fn summary(self) -> &'static str {
        match self {
            Self::Bash => "run a shell command",
            Self::View => "read a file",
            Self::Edit => "replace the first occurrence of `old` with `new` in a file",
            Self::Write => "create or overwrite a file",
            Self::Ls => "list a directory",
            Self::Glob => "find paths matching a glob pattern",
            Self::Grep => "search file contents under a directory",
        }
    }
}

impl fmt::Display for BuiltinTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A tool call resolved against the registry.
#[derive(Debug, Clone, Copy)]
pub enum ResolvedTool<'a> {
    Builtin(BuiltinTool),
    Plugin(&'a PluginTool),
}

impl ResolvedTool<'_> {
    pub fn name(&self) -> &str {
        match self {
            Self::Builtin(tool) => tool.name(),
            Self::Plugin(plugin) => &plugin.name,
        }
    }
}

// ---------------------------------------------------------------------------
// Execution context
// ---------------------------------------------------------------------------

/// Settings shared by every handler.
#[derive(Debug, Clone)]
pub struct ToolContext {
    /// Directory relative paths and shell commands resolve against.
    pub cwd: PathBuf,
    /// One wall-clock limit applied to every tool type.
    pub timeout: Duration,
    pub max_output_bytes: usize,
}

impl ToolContext {
    pub fn new(cwd: PathBuf, tools: &ToolsConfig) -> Self {
        Self {
            cwd,
            timeout: tools.timeout(),
            max_output_bytes: tools.max_output_bytes,
        }
    }

    pub fn resolve(&self, raw: &str) -> PathBuf {
        let path = Path::new(raw.trim());
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.cwd.join(path)
        }
    }

    pub(crate) fn clip(&self, text: &str) -> String {
        truncate_with_suffix_by_bytes(text, self.max_output_bytes, "\n...[truncated]")
    }
}

impl ExecOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failed(stderr: impl Into<String>) -> Self {
        Self {
            exit_code: 1,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// Conversation text for this outcome.
    pub fn to_message(&self, tool: &str) -> String {
        let mut text = format!("Tool {tool} finished with exit code {}", self.exit_code);
        if !self.stdout.trim().is_empty() {
            text.push_str("\nstdout:\n");
            text.push_str(self.stdout.trim_end());
        }
        if !self.stderr.trim().is_empty() {
            text.push_str("\nstderr:\n");
            text.push_str(self.stderr.trim_end());
        }
        text
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Built-in dispatch plus the plugin registry.
pub struct ToolRegistry {
    context: ToolContext,
    plugins: PluginRegistry,
}

impl ToolRegistry {
    pub fn new(context: ToolContext, plugins: PluginRegistry) -> Self {
        Self { context, plugins }
    }

    pub fn from_config(cwd: PathBuf, tools: &ToolsConfig) -> Self {
        Self::new(
            ToolContext::new(cwd, tools),
            PluginRegistry::from_specs(&tools.plugins),
        )
    }

    pub fn context(&self) -> &ToolContext {
        &self.context
    }

    pub fn plugins(&self) -> &PluginRegistry {
        &self.plugins
    }

    pub fn resolve(&self, name: &str) -> Option<ResolvedTool<'_>> {
        BuiltinTool::parse(name)
            .map(ResolvedTool::Builtin)
            .or_else(|| self.plugins.get(name).map(ResolvedTool::Plugin))
    }

    /// Shell command text a call would run, if it runs one.
    pub fn command_text(call: &ToolCall) -> Option<&str> {
        match BuiltinTool::parse(&call.name) {
            Some(BuiltinTool::Bash) => call.param("command"),
            _ => None,
        }
    }

    /// Risk of a call. Shell commands are classified by text; file writes
    /// and plugins need a second look; read-only tools are safe.
    pub fn risk_of(&self, call: &ToolCall) -> CommandRisk {
        match self.resolve(&call.name) {
            Some(ResolvedTool::Builtin(BuiltinTool::Bash)) => {
                risk::classify(call.param("command").unwrap_or_default())
            }
            Some(ResolvedTool::Builtin(BuiltinTool::Write | BuiltinTool::Edit)) => {
                CommandRisk::Caution
            }
            Some(ResolvedTool::Plugin(_)) => CommandRisk::Caution,
            Some(ResolvedTool::Builtin(_)) | None => CommandRisk::Safe,
        }
    }

    /// One-line preview shown at the confirmation prompt.
    pub fn describe(&self, call: &ToolCall) -> String {
        match self.resolve(&call.name) {
            Some(ResolvedTool::Builtin(BuiltinTool::Bash)) => {
                call.param("command").unwrap_or_default().to_string()
            }
            Some(ResolvedTool::Builtin(tool)) => {
                let args: Vec<String> = tool
                    .params()
                    .iter()
                    .filter(|key| !matches!(**key, "content" | "old" | "new"))
                    .filter_map(|key| call.param(key).map(|v| format!("{key}={v}")))
                    .collect();
                format!("{tool} {}", args.join(" "))
            }
            Some(ResolvedTool::Plugin(plugin)) => format!("plugin {}", plugin.name),
            None => format!("unknown tool {}", call.name),
        }
    }

    /// Run a call under the shared timeout.
    pub async fn execute(&self, call: &ToolCall) -> Result<ExecOutput, ToolError> {
        let resolved = self
            .resolve(&call.name)
            .ok_or_else(|| ToolError::ExecutionFailed(format!("Unknown tool: {}", call.name)))?;
        let ctx = &self.context;
        let run = async {
            match resolved {
                ResolvedTool::Builtin(BuiltinTool::Bash) => shell::run(call, ctx).await,
                ResolvedTool::Builtin(BuiltinTool::View) => files::view(call, ctx).await,
                ResolvedTool::Builtin(BuiltinTool::Edit) => files::edit(call, ctx).await,
                ResolvedTool::Builtin(BuiltinTool::Write) => files::write(call, ctx).await,
                ResolvedTool::Builtin(BuiltinTool::Ls) => files::list(call, ctx).await,
                ResolvedTool::Builtin(BuiltinTool::Glob) => search::glob(call, ctx).await,
                ResolvedTool::Builtin(BuiltinTool::Grep) => search::grep(call, ctx).await,
                ResolvedTool::Plugin(plugin) => plugin.run(call, ctx).await,
            }
        };
        tokio::time::timeout(ctx.timeout, run).await.map_err(|_| {
            ToolError::Timeout(format!(
                "{} exceeded {}s",
                resolved.name(),
                ctx.timeout.as_secs_f64()
            ))
        })?
    }
}

/// Required string parameter, or `InvalidArguments` with `missing`.
pub(crate) fn required<'a>(
    call: &'a ToolCall,
    keys: &[&str],
    missing: &str,
) -> Result<&'a str, ToolError> {
    call.param_any(keys)
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| ToolError::InvalidArguments(missing.to_string()))
}
