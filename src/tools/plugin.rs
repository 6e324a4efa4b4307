//! Config-declared plugin tools.
//!
//! A plugin is an external command. It receives the call's parameters as a
//! JSON object on stdin and answers with its exit code and output streams.

use super::process::{run_process, ExecOutput};
use super::ToolContext;
use crate::config::PluginSpec;
use crate::error::ToolError;
use crate::extract::ToolCall;
use serde_json::{Map, Value};

/// One registered plugin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginTool {
    pub name: String,
    pub command: String,
    pub args: Vec<String>,
    pub description: String,
}

impl PluginTool {
    pub(crate) async fn run(&self, call: &ToolCall, ctx: &ToolContext) -> Result<ExecOutput, ToolError> {
        let payload = params_json(call);
        let stdin = serde_json::to_vec(&payload)
            .map_err(|e| ToolError::InvalidArguments(format!("cannot encode parameters: {e}")))?;
        let output = run_process(&self.command, &self.args, Some(&stdin), Some(&ctx.cwd), ctx.timeout).await?;
        Ok(ExecOutput {
            exit_code: output.exit_code,
            stdout: ctx.clip(&output.stdout),
            stderr: ctx.clip(&output.stderr),
        })
    }
}

/// Parameters as a JSON object; a repeated key keeps its first value.
pub(crate) fn params_json(call: &ToolCall) -> Value {
    let mut map = Map::new();
    for (key, value) in &call.params {
        map.entry(key.clone())
            .or_insert_with(|| Value::String(value.clone()));
    }
    Value::Object(map)
}

/// Plugins by name. Names match case-insensitively.
#[derive(Debug, Clone, Default)]
pub struct PluginRegistry {
    plugins: Vec<PluginTool>,
}

impl PluginRegistry {
    pub fn from_specs(specs: &[PluginSpec]) -> Self {
        let mut registry = Self::default();
        for spec in specs {
            registry.register(PluginTool {
                name: spec.name.trim().to_string(),
                command: spec.command.clone(),
                args: spec.args.clone(),
                description: spec.description.clone(),
            });
        }
        registry
    }

    /// Add a plugin; a later registration under the same name wins.
    pub fn register(&mut self, plugin: PluginTool) {
        self.plugins
            .retain(|existing| !existing.name.eq_ignore_ascii_case(&plugin.name));
        self.plugins.push(plugin);
    }

    pub fn get(&self, name: &str) -> Option<&PluginTool> {
        self.plugins
            .iter()
            .find(|plugin| plugin.name.eq_ignore_ascii_case(name.trim()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &PluginTool> {
        self.plugins.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}
