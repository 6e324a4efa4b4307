//! System prompt templating.
//!
//! The prompt text lives in one template file. It documents the tool-call
//! wire format parsed by [`crate::extract`], so the two must change together.

use crate::tools::{BuiltinTool, PluginRegistry};
use std::collections::BTreeMap;
use std::path::Path;

const SYSTEM_PROMPT_TEMPLATE: &str = include_str!("templates/system_prompt.template");

/// Runtime values substituted into the template.
#[derive(Clone, Debug)]
pub struct SystemPromptParams<'a> {
    pub cwd: &'a Path,
    pub plugins: &'a PluginRegistry,
    pub custom_instructions: Option<&'a str>,
}

pub fn render_system_prompt(params: SystemPromptParams<'_>) -> String {
    let mut vars = BTreeMap::<&str, String>::new();
    vars.insert("ENVIRONMENT_NOTE", render_environment(params.cwd));
    vars.insert("TOOLS_LIST", render_builtin_tools());
    vars.insert("PLUGINS_BLOCK", render_plugins(params.plugins));
    vars.insert(
        "CUSTOM_INSTRUCTIONS_BLOCK",
        render_custom_instructions(params.custom_instructions),
    );
    normalize_blank_lines(&render_template(SYSTEM_PROMPT_TEMPLATE, &vars))
}

fn render_template(template: &str, vars: &BTreeMap<&str, String>) -> String {
    let mut rendered = template.to_string();
    for (key, value) in vars {
        let placeholder = format!("{{{{{key}}}}}");
        rendered = rendered.replace(&placeholder, value);
    }
    rendered
}

fn render_environment(cwd: &Path) -> String {
    let shell = std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".into());
    format!(
        "Environment: {} ({}), shell {shell}, working directory {}.",
        std::env::consts::OS,
        std::env::consts::ARCH,
        cwd.display()
    )
}

fn render_builtin_tools() -> String {
    BuiltinTool::ALL
        .iter()
        .map(|tool| {
            let params = tool
                .params()
                .iter()
                .map(|p| format!("`{p}`"))
                .collect::<Vec<_>>()
                .join(", ");
            format!("- {} ({params}): {}", tool.name(), tool.summary())
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_plugins(plugins: &PluginRegistry) -> String {
    if plugins.is_empty() {
        return String::new();
    }
    let lines = plugins
        .iter()
        .map(|plugin| {
            let description = plugin.description.trim();
            if description.is_empty() {
                format!("- {}", plugin.name)
            } else {
                format!("- {}: {description}", plugin.name)
            }
        })
        .collect::<Vec<_>>()
        .join("\n");
    format!("Plugin tools (parameters are passed through as JSON; use `input` for free text):\n{lines}")
}

fn render_custom_instructions(custom: Option<&str>) -> String {
    let Some(custom) = custom.map(str::trim).filter(|s| !s.is_empty()) else {
        return String::new();
    };
    format!("Additional operator instructions:\n{custom}")
}

fn normalize_blank_lines(text: &str) -> String {
    let mut out = String::new();
    let mut previous_blank = false;

    for line in text.lines() {
        let is_blank = line.trim().is_empty();
        if is_blank && previous_blank {
            continue;
        }
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(line.trim_end());
        previous_blank = is_blank;
    }

    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::extract;
    use crate::tools::plugin::PluginTool;

    fn render(plugins: &PluginRegistry, custom: Option<&str>) -> String {
        render_system_prompt(SystemPromptParams {
            cwd: Path::new("/work"),
            plugins,
            custom_instructions: custom,
        })
    }

    #[test]
    fn documents_every_builtin_tool() {
        let prompt = render(&PluginRegistry::default(), None);
        for tool in BuiltinTool::ALL {
            assert!(prompt.contains(&format!("- {} (", tool.name())), "missing {tool}");
        }
        assert!(prompt.contains("working directory /work"));
        assert!(!prompt.contains("{{"));
        assert!(!prompt.contains("Plugin tools"));
    }

    #[test]
    fn example_block_parses_with_the_extractor() {
        let prompt = render(&PluginRegistry::default(), None);
        let calls = extract(&prompt);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "Bash");
        assert_eq!(calls[0].param("command"), Some("ls -la"));
    }

    #[test]
    fn lists_plugins_and_custom_instructions() {
        let mut plugins = PluginRegistry::default();
        plugins.register(PluginTool {
            name: "deploy".into(),
            command: "deploy.sh".into(),
            args: Vec::new(),
            description: "ship the current branch".into(),
        });
        let prompt = render(&plugins, Some("  Answer in one line. "));
        assert!(prompt.contains("- deploy: ship the current branch"));
        assert!(prompt.contains("Additional operator instructions:\nAnswer in one line."));
    }

    #[test]
    fn blank_runs_collapse() {
        assert_eq!(normalize_blank_lines("a\n\n\n\nb  \n\n"), "a\n\nb");
    }
}
