//! Pre/post tool-use hooks.
//!
//! A hook is an executable named `<HookName>.sh` in the hooks directory. It
//! receives a JSON payload on stdin and must finish within the configured
//! timeout. Exit code 0 allows; anything else, a timeout, or a spawn failure
//! denies. Callers decide what a denial means: pre-hooks block execution,
//! post-hook failures are only logged.

use crate::config::HooksConfig;
use crate::error::ToolError;
use crate::extract::ToolCall;
use crate::tools::plugin::params_json;
use crate::tools::process::run_process;
use crate::tools::ExecOutput;
use serde_json::{json, Value};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookName {
    PreToolUse,
    PostToolUse,
}

impl HookName {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PreToolUse => "PreToolUse",
            Self::PostToolUse => "PostToolUse",
        }
    }

    pub fn script_file(self) -> String {
        format!("{}.sh", self.as_str())
    }
}

impl fmt::Display for HookName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one hook invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookVerdict {
    pub allow: bool,
    pub message: String,
}

impl HookVerdict {
    fn allowed(message: impl Into<String>) -> Self {
        Self {
            allow: true,
            message: message.into(),
        }
    }

    fn denied(message: impl Into<String>) -> Self {
        Self {
            allow: false,
            message: message.into(),
        }
    }
}

/// Locates and runs hook scripts.
#[derive(Debug, Clone)]
pub struct HookRunner {
    dir: Option<PathBuf>,
    timeout: Duration,
}

impl HookRunner {
    pub fn new(dir: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            dir: Some(dir.into()),
            timeout,
        }
    }

    /// A runner that never finds a script.
    pub fn disabled() -> Self {
        Self {
            dir: None,
            timeout: Duration::ZERO,
        }
    }

    pub fn from_config(hooks: &HooksConfig, dir: &Path) -> Self {
        if hooks.enabled {
            Self::new(dir, Duration::from_secs(hooks.timeout_secs))
        } else {
            Self::disabled()
        }
    }

    pub fn script_path(&self, hook: HookName) -> Option<PathBuf> {
        self.dir.as_ref().map(|dir| dir.join(hook.script_file()))
    }

    /// Invoke `hook` with `payload` on stdin. A missing script allows.
    pub async fn run(&self, hook: HookName, payload: &Value) -> HookVerdict {
        let Some(script) = self.script_path(hook).filter(|path| path.is_file()) else {
            return HookVerdict::allowed("");
        };
        let stdin = payload.to_string();
        let program = script.to_string_lossy();
        tracing::debug!(hook = %hook, script = %program, "running hook");
        match run_process(&program, &[], Some(stdin.as_bytes()), None, self.timeout).await {
            Ok(output) if output.success() => HookVerdict::allowed(output.stdout.trim()),
            Ok(output) => {
                let detail = if output.stderr.trim().is_empty() {
                    output.stdout.trim()
                } else {
                    output.stderr.trim()
                };
                HookVerdict::denied(format!(
                    "{hook} hook exited with code {}: {detail}",
                    output.exit_code
                ))
            }
            Err(ToolError::Timeout(_)) => HookVerdict::denied(format!(
                "{hook} hook timed out after {}s",
                self.timeout.as_secs_f64()
            )),
            Err(err) => HookVerdict::denied(format!("{hook} hook failed: {err}")),
        }
    }

    /// `{tool, params}` payload for the pre-execution hook.
    pub async fn pre_tool_use(&self, call: &ToolCall) -> HookVerdict {
        let payload = json!({ "tool": call.name, "params": params_json(call) });
        self.run(HookName::PreToolUse, &payload).await
    }

    /// `{tool, result}` payload for the post-execution hook. Failures are
    /// advisory and only logged.
    pub async fn post_tool_use(&self, call: &ToolCall, outcome: &ExecOutput) -> HookVerdict {
        let result = if outcome.success() {
            &outcome.stdout
        } else {
            &outcome.stderr
        };
        let payload = json!({
            "tool": call.name,
            "result": result,
            "exit_code": outcome.exit_code,
        });
        let verdict = self.run(HookName::PostToolUse, &payload).await;
        if !verdict.allow {
            tracing::warn!(tool = %call.name, message = %verdict.message, "post-tool hook failed");
        }
        verdict
    }
}
