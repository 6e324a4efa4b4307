//! Subprocess execution shared by the shell tool, plugins and hooks.

use crate::error::ToolError;
use std::path::Path;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::{timeout, Duration};

/// Captured result of one finished process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Run `sh -c <command>` with a bounded wall-clock limit.
pub(crate) async fn run_shell(
    command: &str,
    cwd: Option<&Path>,
    limit: Duration,
) -> Result<ExecOutput, ToolError> {
    run_process("sh", &["-c".into(), command.into()], None, cwd, limit).await
}

/// Spawn `program`, optionally feed `stdin`, and collect its output.
///
/// The child is killed if the limit elapses or the future is dropped.
pub(crate) async fn run_process(
    program: &str,
    args: &[String],
    stdin: Option<&[u8]>,
    cwd: Option<&Path>,
    limit: Duration,
) -> Result<ExecOutput, ToolError> {
    let mut cmd = Command::new(program);
    cmd.kill_on_drop(true);
    cmd.args(args).stdout(Stdio::piped()).stderr(Stdio::piped());
    cmd.stdin(if stdin.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    });
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }

    let mut child = cmd
        .spawn()
        .map_err(|e| ToolError::ExecutionFailed(format!("{program}: {e}")))?;

    let run = async {
        if let Some(input) = stdin {
            if let Some(mut child_stdin) = child.stdin.take() {
                // A child that exits without reading stdin closes the pipe;
                // that is its choice, not a spawn failure.
                if let Err(err) = child_stdin.write_all(input).await {
                    tracing::debug!(program, error = %err, "child closed stdin early");
                }
            }
        }
        child
            .wait_with_output()
            .await
            .map_err(|e| ToolError::ExecutionFailed(format!("{program}: {e}")))
    };

    let output = timeout(limit, run).await.map_err(|_| {
        ToolError::Timeout(format!("{program} exceeded {}s", limit.as_secs_f64()))
    })??;

    Ok(ExecOutput {
        exit_code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
    })
}
