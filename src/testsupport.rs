//! Shared test fixtures: temp directories, SSE wire blocks and a scripted
//! model client.

use crate::api::{ModelClient, SendOptions};
use crate::error::ApiError;
use crate::types::Message;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::fs;
use std::sync::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

static TEST_DIR_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Temporary directory removed on drop. Std-only on purpose.
#[derive(Debug)]
pub struct TestTempDir {
    path: PathBuf,
}

impl TestTempDir {
    pub fn new(prefix: &str) -> Self {
        let suffix = TEST_DIR_COUNTER.fetch_add(1, Ordering::Relaxed);
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        let dir = std::env::temp_dir().join(format!(
            "eleven-{prefix}-{}-{millis}-{suffix}",
            std::process::id()
        ));
        fs::create_dir_all(&dir).expect("failed to create temporary fixture directory");
        Self { path: dir }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn child(&self, relative: &str) -> PathBuf {
        self.path.join(relative)
    }

    /// Write UTF-8 text to a child path, creating parent directories as needed.
    pub fn write_text(&self, relative: &str, content: &str) -> PathBuf {
        let path = self.child(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("failed to create parent directories for fixture");
        }
        fs::write(&path, content).expect("failed to write fixture file");
        path
    }

    /// Write an executable shell script (mode 0755).
    #[cfg(unix)]
    pub fn write_script(&self, relative: &str, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = self.write_text(relative, &format!("#!/bin/sh\n{body}\n"));
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755))
            .expect("failed to mark fixture script executable");
        path
    }
}

impl Drop for TestTempDir {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.path);
    }
}

/// One chat-completions stream frame carrying a content delta.
pub fn sse_delta_block(content: &str) -> String {
    let payload = serde_json::json!({
        "choices": [{ "index": 0, "delta": { "content": content } }]
    });
    format!("data: {payload}\n\n")
}

/// Stream terminator used by OpenAI-compatible servers.
pub fn sse_done_block() -> &'static str {
    "data: [DONE]\n\n"
}

/// Model client that replays canned replies in order and records every
/// request. An exhausted script answers with a 503.
#[derive(Debug, Default)]
pub struct ScriptedModel {
    replies: Mutex<VecDeque<Result<String, ApiError>>>,
    requests: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedModel {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_results(replies.into_iter().map(|r| Ok(r.into())))
    }

    pub fn with_results(replies: impl IntoIterator<Item = Result<String, ApiError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<Vec<Message>> {
        self.requests.lock().expect("requests lock").clone()
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().expect("requests lock").len()
    }
}

#[async_trait]
impl ModelClient for ScriptedModel {
    async fn send(&self, messages: &[Message], _options: &SendOptions) -> Result<String, ApiError> {
        self.requests
            .lock()
            .expect("requests lock")
            .push(messages.to_vec());
        self.replies
            .lock()
            .expect("replies lock")
            .pop_front()
            .unwrap_or_else(|| Err(ApiError::status(503, "script exhausted".into(), None)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temp_dir_fixture_writes_and_cleans_up() {
        let root;
        {
            let fixture = TestTempDir::new("fixture");
            let file = fixture.write_text("nested/file.txt", "hello");
            assert_eq!(fs::read_to_string(file).unwrap(), "hello");
            root = fixture.path().to_path_buf();
        }
        assert!(!root.exists());
    }

    #[test]
    fn sse_helpers_emit_expected_wire_format() {
        let block = sse_delta_block("hi");
        assert!(block.starts_with("data: {"));
        assert!(block.contains("\"content\":\"hi\""));
        assert!(block.ends_with("\n\n"));
        assert_eq!(sse_done_block(), "data: [DONE]\n\n");
    }
}
