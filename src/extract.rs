//! Tool-call extraction from model replies.
//!
//! The wire format is a tagged block the system prompt teaches the model:
//!
//! ```text
//! <tool name="Bash"><param name="command">ls -la</param></tool>
//! ```
//!
//! Extraction is pure parsing. Anything that does not form a complete block
//! is skipped with a warning; no input makes these functions fail.

use regex::Regex;
use std::sync::LazyLock;

/// Upper bound on commands recovered from free-form prose.
const MAX_PROSE_COMMANDS: usize = 5;

/// A tool invocation named by the model, with ordered string parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCall {
    pub name: String,
    pub params: Vec<(String, String)>,
}

impl ToolCall {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    /// Shorthand for a `Bash` call running `command`.
    pub fn bash(command: impl Into<String>) -> Self {
        Self::new("Bash").with_param("command", command)
    }

    /// First value for `key`, if present.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// First value among several accepted spellings of one parameter.
    pub fn param_any(&self, keys: &[&str]) -> Option<&str> {
        keys.iter().find_map(|key| self.param(key))
    }

    /// Replace (or add) one parameter, keeping its position.
    pub fn set_param(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match self.params.iter_mut().find(|(k, _)| k == key) {
            Some(slot) => slot.1 = value,
            None => self.params.push((key.to_string(), value)),
        }
    }
}

/// Return every well-formed tool block in `reply`, in order of appearance.
pub fn extract(reply: &str) -> Vec<ToolCall> {
    let mut calls = Vec::new();
    let mut rest = reply;
    while let Some(start) = rest.find("<tool") {
        let after_open = &rest[start + "<tool".len()..];
        // `<tools>` or `<toolbox>` are not markers.
        if !after_open.starts_with(|c: char| c.is_whitespace()) {
            rest = after_open;
            continue;
        }
        let Some(open_end) = after_open.find('>') else {
            tracing::warn!("unterminated tool tag in reply; skipping");
            break;
        };
        let Some(name) = attribute_value(&after_open[..open_end], "name") else {
            tracing::warn!("tool tag without a name attribute; skipping");
            rest = &after_open[open_end + 1..];
            continue;
        };
        let body_start = &after_open[open_end + 1..];
        let Some(close) = body_start.find("</tool>") else {
            tracing::warn!(tool = %name, "tool block is missing </tool>; skipping");
            break;
        };
        match parse_params(&body_start[..close]) {
            Some(params) => calls.push(ToolCall { name, params }),
            None => tracing::warn!(tool = %name, "malformed parameter list; skipping tool block"),
        }
        rest = &body_start[close + "</tool>".len()..];
    }
    calls
}

fn parse_params(body: &str) -> Option<Vec<(String, String)>> {
    let mut params = Vec::new();
    let mut rest = body;
    while let Some(start) = rest.find("<param") {
        let after_open = &rest[start + "<param".len()..];
        let open_end = after_open.find('>')?;
        let key = attribute_value(&after_open[..open_end], "name")?;
        let value_start = &after_open[open_end + 1..];
        let close = value_start.find("</param>")?;
        params.push((key, unescape(trim_block_newlines(&value_start[..close]))));
        rest = &value_start[close + "</param>".len()..];
    }
    Some(params)
}

/// Read `attr="value"`, `attr='value'` or bare `attr=value` from a tag.
fn attribute_value(tag: &str, attr: &str) -> Option<String> {
    let mut search = tag;
    loop {
        let idx = search.find(attr)?;
        let boundary_ok = search[..idx]
            .chars()
            .next_back()
            .map_or(true, char::is_whitespace);
        let after = search[idx + attr.len()..].trim_start();
        if boundary_ok {
            if let Some(value) = after.strip_prefix('=') {
                return read_attr(value.trim_start());
            }
        }
        search = &search[idx + attr.len()..];
    }
}

fn read_attr(raw: &str) -> Option<String> {
    let value = match raw.chars().next()? {
        quote @ ('"' | '\'') => {
            let inner = &raw[1..];
            &inner[..inner.find(quote)?]
        }
        _ => raw
            .split(|c: char| c.is_whitespace() || c == '/')
            .next()
            .unwrap_or_default(),
    };
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// Drop one newline just inside each side of a multi-line value.
fn trim_block_newlines(value: &str) -> &str {
    let value = value.strip_prefix('\n').unwrap_or(value);
    value.strip_suffix('\n').unwrap_or(value)
}

fn unescape(value: &str) -> String {
    if !value.contains('&') {
        return value.to_string();
    }
    value
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

static SHELL_BLOCK: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?s)```(?:bash|sh|shell|zsh)?[ \t]*\n(.*?)```").ok());

static DIRECTIVE_LINE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?im)^\s*(?:\$|(?:run|execute|command)\s*:)\s*(.+?)\s*$").ok()
});

/// Recover shell commands from a reply that carries no tool blocks.
///
/// Recognizes fenced shell blocks (one command per non-comment line) and
/// `$ cmd` / `run: cmd` lines. Results are de-duplicated and capped.
pub fn infer_from_prose(reply: &str) -> Vec<ToolCall> {
    let mut commands: Vec<String> = Vec::new();
    let mut push = |candidate: &str| {
        let candidate = candidate.trim();
        if candidate.is_empty() || candidate.starts_with('#') {
            return;
        }
        if !commands.iter().any(|seen| seen == candidate) {
            commands.push(candidate.to_string());
        }
    };

    let mut prose = reply.to_string();
    if let Some(block) = SHELL_BLOCK.as_ref() {
        for captures in block.captures_iter(reply) {
            if let Some(body) = captures.get(1) {
                body.as_str().lines().for_each(&mut push);
            }
        }
        // Lines inside fences were already taken; avoid reading `$ x` twice.
        prose = block.replace_all(reply, "").into_owned();
    }
    if let Some(directive) = DIRECTIVE_LINE.as_ref() {
        for captures in directive.captures_iter(&prose) {
            if let Some(cmd) = captures.get(1) {
                push(cmd.as_str().trim_matches('`'));
            }
        }
    }

    commands
        .into_iter()
        .take(MAX_PROSE_COMMANDS)
        .map(ToolCall::bash)
        .collect()
}
