//! `Bash`: run a shell command and capture its output.

use super::process::{run_shell, ExecOutput};
use super::{required, ToolContext};
use crate::error::ToolError;
use crate::extract::ToolCall;

pub(crate) async fn run(call: &ToolCall, ctx: &ToolContext) -> Result<ExecOutput, ToolError> {
    let command = required(call, &["command", "cmd"], "No command provided")?;
    tracing::debug!(command, "running shell command");
    let output = run_shell(command, Some(&ctx.cwd), ctx.timeout).await?;
    Ok(ExecOutput {
        exit_code: output.exit_code,
        stdout: ctx.clip(&output.stdout),
        stderr: ctx.clip(&output.stderr),
    })
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::config::ToolsConfig;
    use crate::testsupport::TestTempDir;

    fn ctx(dir: &TestTempDir, max_output_bytes: usize) -> ToolContext {
        let tools = ToolsConfig {
            max_output_bytes,
            ..ToolsConfig::default()
        };
        ToolContext::new(dir.path().to_path_buf(), &tools)
    }

    #[tokio::test]
    async fn runs_in_the_working_directory() {
        let dir = TestTempDir::new("shell-cwd");
        dir.write_text("here.txt", "");
        let out = run(&ToolCall::bash("ls"), &ctx(&dir, 4000)).await.unwrap();
        assert_eq!(out.exit_code, 0);
        assert!(out.stdout.contains("here.txt"));
    }

    #[tokio::test]
    async fn long_output_is_truncated() {
        let dir = TestTempDir::new("shell-trunc");
        let out = run(&ToolCall::bash("yes x | head -c 5000"), &ctx(&dir, 100))
            .await
            .unwrap();
        assert!(out.stdout.ends_with("\n...[truncated]"));
        assert_eq!(out.stdout.len(), 100 + "\n...[truncated]".len());
    }

    #[tokio::test]
    async fn missing_command_is_rejected() {
        let dir = TestTempDir::new("shell-missing");
        let err = run(&ToolCall::new("Bash"), &ctx(&dir, 4000)).await.unwrap_err();
        assert_eq!(err.to_string(), "invalid arguments: No command provided");
    }
}
