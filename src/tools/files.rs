//! File tools: `View`, `Edit`, `Write` and `Ls`.
//!
//! Missing parameters are argument errors. Filesystem failures are reported
//! as a failed outcome (exit code 1) so the model sees them as tool output.

use super::process::ExecOutput;
use super::{required, ToolContext};
use crate::error::ToolError;
use crate::extract::ToolCall;
use tokio::fs;

pub(crate) async fn view(call: &ToolCall, ctx: &ToolContext) -> Result<ExecOutput, ToolError> {
    let raw = required(call, &["path", "file"], "No path provided")?;
    let path = ctx.resolve(raw);
    match fs::read(&path).await {
        Ok(bytes) => Ok(ExecOutput::ok(ctx.clip(&String::from_utf8_lossy(&bytes)))),
        Err(err) => Ok(ExecOutput::failed(format!("cannot read {raw}: {err}"))),
    }
}

pub(crate) async fn edit(call: &ToolCall, ctx: &ToolContext) -> Result<ExecOutput, ToolError> {
    let raw = required(call, &["path", "file"], "No path provided")?;
    let old = call
        .param_any(&["old", "old_string"])
        .filter(|old| !old.is_empty())
        .ok_or_else(|| ToolError::InvalidArguments("No text to replace provided".into()))?;
    let new = call.param_any(&["new", "new_string"]).unwrap_or_default();
    let path = ctx.resolve(raw);

    let current = match fs::read_to_string(&path).await {
        Ok(text) => text,
        Err(err) => return Ok(ExecOutput::failed(format!("cannot read {raw}: {err}"))),
    };
    let occurrences = current.matches(old).count();
    if occurrences == 0 {
        return Ok(ExecOutput::failed(format!("text to replace not found in {raw}")));
    }
    let updated = current.replacen(old, new, 1);
    if let Err(err) = fs::write(&path, updated).await {
        return Ok(ExecOutput::failed(format!("cannot write {raw}: {err}")));
    }
    let mut note = format!("Edited {raw}");
    if occurrences > 1 {
        note.push_str(&format!(" (first of {occurrences} matches replaced)"));
    }
    Ok(ExecOutput::ok(note))
}

pub(crate) async fn write(call: &ToolCall, ctx: &ToolContext) -> Result<ExecOutput, ToolError> {
    let raw = required(call, &["path", "file"], "No path provided")?;
    let content = call.param("content").unwrap_or_default();
    let path = ctx.resolve(raw);
    if let Some(parent) = path.parent() {
        if let Err(err) = fs::create_dir_all(parent).await {
            return Ok(ExecOutput::failed(format!("cannot create {}: {err}", parent.display())));
        }
    }
    match fs::write(&path, content).await {
        Ok(()) => Ok(ExecOutput::ok(format!("Wrote {} bytes to {raw}", content.len()))),
        Err(err) => Ok(ExecOutput::failed(format!("cannot write {raw}: {err}"))),
    }
}

pub(crate) async fn list(call: &ToolCall, ctx: &ToolContext) -> Result<ExecOutput, ToolError> {
    let raw = call.param_any(&["path", "dir", "directory"]).unwrap_or(".");
    let raw = if raw.trim().is_empty() { "." } else { raw };
    let path = ctx.resolve(raw);
    let mut entries = match fs::read_dir(&path).await {
        Ok(entries) => entries,
        Err(err) => return Ok(ExecOutput::failed(format!("cannot list {raw}: {err}"))),
    };
    let mut names = Vec::new();
    loop {
        match entries.next_entry().await {
            Ok(Some(entry)) => {
                let mut name = entry.file_name().to_string_lossy().into_owned();
                if entry.file_type().await.is_ok_and(|kind| kind.is_dir()) {
                    name.push('/');
                }
                names.push(name);
            }
            Ok(None) => break,
            Err(err) => return Ok(ExecOutput::failed(format!("cannot list {raw}: {err}"))),
        }
    }
    names.sort();
    Ok(ExecOutput::ok(ctx.clip(&names.join("\n"))))
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
    async fn view_reads_relative_paths() {
        let dir = TestTempDir::new("files-view");
        dir.write_text("notes/a.txt", "hello");
        let call = ToolCall::new("View").with_param("path", "notes/a.txt");
        assert_eq!(view(&call, &ctx(&dir)).await.unwrap(), ExecOutput::ok("hello"));
    }

    #[tokio::test]
    async fn view_reports_missing_files_as_failed_outcome() {
        let dir = TestTempDir::new("files-view-missing");
        let call = ToolCall::new("View").with_param("path", "nope.txt");
        let out = view(&call, &ctx(&dir)).await.unwrap();
        assert_eq!(out.exit_code, 1);
        assert!(out.stderr.contains("cannot read nope.txt"));
    }

    #[tokio::test]
    async fn view_without_path_is_an_argument_error() {
        let dir = TestTempDir::new("files-view-noarg");
        let err = view(&ToolCall::new("View"), &ctx(&dir)).await.unwrap_err();
        assert_eq!(err.to_string(), "invalid arguments: No path provided");
    }

    #[tokio::test]
    async fn edit_replaces_first_occurrence() {
        let dir = TestTempDir::new("files-edit");
        let path = dir.write_text("a.rs", "x = 1; x = 1;");
        let call = ToolCall::new("Edit")
            .with_param("path", "a.rs")
            .with_param("old", "x = 1")
            .with_param("new", "y = 2");
        let out = edit(&call, &ctx(&dir)).await.unwrap();
        assert!(out.success());
        assert!(out.stdout.contains("first of 2"));
        assert_eq!(std::fs::read_to_string(path).unwrap(), "y = 2; x = 1;");
    }

    #[tokio::test]
    async fn edit_fails_when_text_absent() {
        let dir = TestTempDir::new("files-edit-absent");
        dir.write_text("a.rs", "abc");
        let call = ToolCall::new("Edit")
            .with_param("path", "a.rs")
            .with_param("old", "zzz")
            .with_param("new", "y");
        assert_eq!(edit(&call, &ctx(&dir)).await.unwrap().exit_code, 1);
    }

    #[tokio::test]
    async fn write_creates_parent_directories() {
        let dir = TestTempDir::new("files-write");
        let call = ToolCall::new("Write")
            .with_param("path", "deep/nested/out.txt")
            .with_param("content", "data");
        let out = write(&call, &ctx(&dir)).await.unwrap();
        assert_eq!(out.stdout, "Wrote 4 bytes to deep/nested/out.txt");
        assert_eq!(
            std::fs::read_to_string(dir.child("deep/nested/out.txt")).unwrap(),
            "data"
        );
    }

    #[tokio::test]
    async fn list_marks_directories_and_sorts() {
        let dir = TestTempDir::new("files-list");
        dir.write_text("b.txt", "");
        dir.write_text("a/inner.txt", "");
        let call = ToolCall::new("Ls").with_param("dir", ".");
        assert_eq!(list(&call, &ctx(&dir)).await.unwrap().stdout, "a/\nb.txt");
        // No parameter lists the working directory.
        assert_eq!(
            list(&ToolCall::new("Ls"), &ctx(&dir)).await.unwrap().stdout,
            "a/\nb.txt"
        );
    }
}
