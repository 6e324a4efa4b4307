//! Search tools: `Glob` over paths and `Grep` over file contents.

use super::process::ExecOutput;
use super::{required, ToolContext};
use crate::error::ToolError;
use crate::extract::ToolCall;
use regex::RegexBuilder;
use std::path::{Path, PathBuf};

/// Result cap shared by both tools.
const MAX_MATCHES: usize = 200;

/// Directories never worth descending into.
const SKIP_DIRS: &[&str] = &[".git", "target", "node_modules", "__pycache__", ".venv"];

pub(crate) async fn glob(call: &ToolCall, ctx: &ToolContext) -> Result<ExecOutput, ToolError> {
    let pattern = required(call, &["pattern"], "No pattern provided")?.to_string();
    let cwd = ctx.cwd.clone();
    let matches = tokio::task::spawn_blocking(move || glob_blocking(&cwd, &pattern))
        .await
        .map_err(|e| ToolError::ExecutionFailed(format!("glob task failed: {e}")))??;
    if matches.is_empty() {
        return Ok(ExecOutput::ok("No matches"));
    }
    Ok(ExecOutput::ok(ctx.clip(&matches.join("\n"))))
}

fn glob_blocking(cwd: &Path, pattern: &str) -> Result<Vec<String>, ToolError> {
    let full = if Path::new(pattern).is_absolute() {
        pattern.to_string()
    } else {
        cwd.join(pattern).to_string_lossy().into_owned()
    };
    let paths = glob::glob(&full)
        .map_err(|e| ToolError::InvalidArguments(format!("invalid glob pattern '{pattern}': {e}")))?;
    let mut found: Vec<String> = paths
        .filter_map(Result::ok)
        .map(|path| display_relative(cwd, &path))
        .take(MAX_MATCHES)
        .collect();
    found.sort();
    Ok(found)
}

pub(crate) async fn grep(call: &ToolCall, ctx: &ToolContext) -> Result<ExecOutput, ToolError> {
    let query = required(call, &["query", "pattern"], "No query provided")?;
    let dir = call
        .param_any(&["dir", "path"])
        .filter(|dir| !dir.trim().is_empty())
        .unwrap_or(".");
    // Plain text is the common case; fall back to a literal match when the
    // query is not a valid regex.
    let matcher = RegexBuilder::new(query)
        .case_insensitive(true)
        .build()
        .or_else(|_| {
            RegexBuilder::new(&regex::escape(query))
                .case_insensitive(true)
                .build()
        })
        .map_err(|e| ToolError::InvalidArguments(format!("invalid query: {e}")))?;
    let root = ctx.resolve(dir);
    let cwd = ctx.cwd.clone();
    let hits = tokio::task::spawn_blocking(move || {
        let mut hits = Vec::new();
        let mut pending = vec![root];
        while let Some(current) = pending.pop() {
            if hits.len() >= MAX_MATCHES {
                break;
            }
            if current.is_dir() {
                pending.extend(child_paths(&current));
                continue;
            }
            let Ok(bytes) = std::fs::read(&current) else {
                continue;
            };
            if bytes.contains(&0) {
                continue;
            }
            let text = String::from_utf8_lossy(&bytes);
            for (idx, line) in text.lines().enumerate() {
                if matcher.is_match(line) {
                    hits.push(format!("{}:{}:{}", display_relative(&cwd, &current), idx + 1, line.trim_end()));
                    if hits.len() >= MAX_MATCHES {
                        break;
                    }
                }
            }
        }
        hits
    })
    .await
    .map_err(|e| ToolError::ExecutionFailed(format!("grep task failed: {e}")))?;

    if hits.is_empty() {
        return Ok(ExecOutput {
            exit_code: 1,
            stdout: String::new(),
            stderr: format!("No matches for '{query}'"),
        });
    }
    Ok(ExecOutput::ok(ctx.clip(&hits.join("\n"))))
}

/// Children in reverse name order, so popping from the stack visits them
/// alphabetically.
fn child_paths(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut children: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .filter(|entry| {
            let name = entry.file_name();
            !SKIP_DIRS.iter().any(|skip| name == **skip)
        })
        .map(|entry| entry.path())
        .collect();
    children.sort();
    children.reverse();
    children
}

fn display_relative(cwd: &Path, path: &Path) -> String {
    path.strip_prefix(cwd)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ToolsConfig;
    use crate::testsupport::TestTempDir;

    fn ctx(dir: &TestTempDir) -> ToolContext {
        ToolContext::new(dir.path().to_path_buf(), &ToolsConfig::default())
    }

    #[tokio::test]
    async fn glob_lists_matching_paths_relative_to_cwd() {
        let dir = TestTempDir::new("search-glob");
        dir.write_text("src/a.rs", "");
        dir.write_text("src/b.rs", "");
        dir.write_text("src/c.txt", "");
        let call = ToolCall::new("Glob").with_param("pattern", "src/*.rs");
        assert_eq!(glob(&call, &ctx(&dir)).await.unwrap().stdout, "src/a.rs\nsrc/b.rs");
    }

    #[tokio::test]
    async fn glob_rejects_bad_patterns() {
        let dir = TestTempDir::new("search-glob-bad");
        let call = ToolCall::new("Glob").with_param("pattern", "a/***");
        assert!(matches!(
            glob(&call, &ctx(&dir)).await,
            Err(ToolError::InvalidArguments(_))
        ));
    }

    #[tokio::test]
    async fn grep_reports_path_line_and_text() {
        let dir = TestTempDir::new("search-grep");
        dir.write_text("a.txt", "one\nTODO two\n");
        dir.write_text("sub/b.txt", "todo three\n");
        dir.write_text(".git/config", "todo hidden\n");
        let call = ToolCall::new("Grep").with_param("query", "todo");
        let out = grep(&call, &ctx(&dir)).await.unwrap();
        assert_eq!(out.stdout, "a.txt:2:TODO two\nsub/b.txt:1:todo three");
    }

    #[tokio::test]
    async fn grep_treats_invalid_regex_as_literal() {
        let dir = TestTempDir::new("search-grep-literal");
        dir.write_text("a.txt", "call(x\n");
        let call = ToolCall::new("Grep").with_param("query", "call(");
        assert_eq!(grep(&call, &ctx(&dir)).await.unwrap().stdout, "a.txt:1:call(x");
    }

    #[tokio::test]
    async fn grep_without_matches_fails_softly() {
        let dir = TestTempDir::new("search-grep-none");
        dir.write_text("a.txt", "nothing\n");
        let call = ToolCall::new("Grep").with_param("query", "zzz");
        let out = grep(&call, &ctx(&dir)).await.unwrap();
        assert_eq!(out.exit_code, 1);
        let err = grep(&ToolCall::new("Grep"), &ctx(&dir)).await.unwrap_err();
        assert_eq!(err.to_string(), "invalid arguments: No query provided");
    }
}
