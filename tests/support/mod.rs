//! Shared fixtures for the end-to-end scenarios: an isolated data directory,
//! a scripted model and a one-shot HTTP fake for the real client.

#![allow(dead_code)]

use async_trait::async_trait;
use eleven::api::{ModelClient, SendOptions};
use eleven::config::{Config, HistoryConfig};
use eleven::error::ApiError;
use eleven::types::Message;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

static NEXT_ID: AtomicUsize = AtomicUsize::new(0);

/// Scenario root holding `data/` (history, loops, log) and `work/` (cwd).
pub struct Sandbox {
    root: PathBuf,
}

impl Sandbox {
    pub fn new(name: &str) -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        let root = std::env::temp_dir().join(format!(
            "eleven-it-{name}-{}-{nanos}-{}",
            std::process::id(),
            NEXT_ID.fetch_add(1, Ordering::SeqCst)
        ));
        std::fs::create_dir_all(root.join("work")).expect("create sandbox");
        Self { root }
    }

    pub fn data_dir(&self) -> PathBuf {
        self.root.join("data")
    }

    pub fn work_dir(&self) -> PathBuf {
        self.root.join("work")
    }

    pub fn write_work_file(&self, relative: &str, content: &str) -> PathBuf {
        let path = self.work_dir().join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create parent");
        }
        std::fs::write(&path, content).expect("write file");
        path
    }

    /// Defaults with all persistence redirected into the sandbox.
    pub fn config(&self) -> Config {
        let mut config = Config {
            data_dir: self.data_dir(),
            ..Config::default()
        };
        config.hooks.enabled = false;
        config.loop_mode.delay_ms = 0;
        config.history = HistoryConfig {
            lock_timeout_ms: 500,
            ..HistoryConfig::default()
        };
        config
    }
}

impl Drop for Sandbox {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.root);
    }
}

/// Model that answers from a fixed script and records every request.
#[derive(Default)]
pub struct ScriptedModel {
    replies: Mutex<VecDeque<String>>,
    requests: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedModel {
    pub fn new<const N: usize>(replies: [&str; N]) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
            requests: Mutex::new(Vec::new()),
        })
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
            .ok_or_else(|| ApiError::status(503, "script exhausted".into(), None))
    }
}

/// Chat-completions body with a single assistant message.
pub fn completion_body(content: &str) -> String {
    serde_json::json!({
        "id": "chatcmpl-it",
        "choices": [{"index": 0, "message": {"role": "assistant", "content": content}, "finish_reason": "stop"}]
    })
    .to_string()
}

/// Serve each canned body once, in order, then stop accepting. Returns the
/// base URL and a counter of accepted connections.
pub async fn fake_chat_server(bodies: Vec<String>) -> (String, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    tokio::spawn(async move {
        for body in bodies {
            let Ok((mut stream, _)) = listener.accept().await else {
                return;
            };
            counter.fetch_add(1, Ordering::SeqCst);
            drain_request(&mut stream).await;
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = stream.write_all(response.as_bytes()).await;
            let _ = stream.shutdown().await;
        }
    });
    (format!("http://{addr}/v1"), hits)
}

async fn drain_request(stream: &mut TcpStream) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let Ok(n) = stream.read(&mut chunk).await else {
            return;
        };
        if n == 0 {
            return;
        }
        buf.extend_from_slice(&chunk[..n]);
        let text = String::from_utf8_lossy(&buf);
        let Some(header_end) = text.find("\r\n\r\n") else {
            continue;
        };
        let declared = text[..header_end]
            .lines()
            .find_map(|line| {
                let (name, value) = line.split_once(':')?;
                name.eq_ignore_ascii_case("content-length")
                    .then(|| value.trim().parse::<usize>().ok())
                    .flatten()
            })
            .unwrap_or(0);
        if buf.len() >= header_end + 4 + declared {
            return;
        }
    }
}
