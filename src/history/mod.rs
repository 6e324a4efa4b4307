//! Persistent conversation history.
//!
//! The history file is a JSON array of `{role, content}` records kept under
//! the data directory with owner-only permissions. Every write goes through
//! the exclusive lock plus temp-file-and-rename sequence in [`lock`]. A file
//! that fails structural validation is never partially trusted: it is moved
//! aside and the session starts from an empty history.

pub mod compact;
pub mod lock;

use crate::api::{ModelClient, SendOptions};
use crate::config::HistoryConfig;
use crate::error::StoreError;
use crate::types::{Message, Role};
use lock::{write_json_atomic, FileLock};
use serde_json::Value;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// What [`read_history`] found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    Missing,
    Loaded(Vec<Message>),
    /// The file exists but at least one record is invalid.
    Corrupt(String),
}

/// Result of one compaction pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactionReport {
    pub before: usize,
    pub after: usize,
    /// False when the model call failed and a local digest was used.
    pub model_summary: bool,
}

/// Bounded, file-backed message sequence for one session.
#[derive(Debug)]
pub struct HistoryStore {
    path: PathBuf,
    limit: usize,
    compact_threshold: usize,
    keep_recent: usize,
    lock_timeout: Duration,
    messages: Vec<Message>,
    /// False after a read failed for a reason other than corruption. The
    /// file may still hold valid history, so writes re-read it first.
    synced: bool,
}

impl HistoryStore {
    /// Open the store at `path` and load whatever valid history it holds.
    pub fn open(path: impl Into<PathBuf>, config: &HistoryConfig) -> Self {
        let mut store = Self {
            path: path.into(),
            limit: config.message_limit.max(1),
            compact_threshold: config.compact_threshold,
            keep_recent: config.keep_recent,
            lock_timeout: Duration::from_millis(config.lock_timeout_ms),
            messages: Vec::new(),
            synced: false,
        };
        store.load();
        store
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reload from disk. Corrupt or unreadable files yield an empty history;
    /// an unreadable one is retried before the next write instead of being
    /// overwritten.
    pub fn load(&mut self) -> &[Message] {
        self.synced = true;
        self.messages = match read_history(&self.path, self.lock_timeout) {
            Ok(LoadOutcome::Missing) => Vec::new(),
            Ok(LoadOutcome::Loaded(mut messages)) => {
                enforce_limit(&mut messages, self.limit);
                messages
            }
            Ok(LoadOutcome::Corrupt(reason)) => {
                tracing::error!(
                    path = %self.path.display(),
                    %reason,
                    "history file is corrupt; starting with an empty history"
                );
                quarantine(&self.path);
                Vec::new()
            }
            Err(err) => {
                tracing::error!(
                    path = %self.path.display(),
                    error = %err,
                    "cannot read history; writes wait until it can be read"
                );
                self.synced = false;
                Vec::new()
            }
        };
        &self.messages
    }

    /// True once the on-disk history has been read or found absent.
    pub fn is_synced(&self) -> bool {
        self.synced
    }

    /// Retry a failed load and fold this session's messages onto what the
    /// file holds. On failure nothing changes and the error is returned.
    fn resync(&mut self) -> Result<(), StoreError> {
        if self.synced {
            return Ok(());
        }
        let disk = match read_history(&self.path, self.lock_timeout)? {
            LoadOutcome::Missing => Vec::new(),
            LoadOutcome::Loaded(messages) => messages,
            LoadOutcome::Corrupt(reason) => {
                tracing::error!(path = %self.path.display(), %reason, "history file is corrupt");
                quarantine(&self.path);
                Vec::new()
            }
        };
        let pending = std::mem::replace(&mut self.messages, disk);
        for message in pending {
            if message.role == Role::System && !compact::is_summary(&message) {
                self.set_system_prompt(&message.content);
            } else {
                self.messages.push(message);
            }
        }
        enforce_limit(&mut self.messages, self.limit);
        self.synced = true;
        tracing::info!(messages = self.messages.len(), "history reloaded");
        Ok(())
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Put `prompt` at the head of the conversation, replacing an older
    /// system prompt. Not persisted until the next write.
    pub fn set_system_prompt(&mut self, prompt: &str) {
        match self.messages.first_mut() {
            Some(first) if first.role == Role::System && !compact::is_summary(first) => {
                first.content = prompt.to_string();
            }
            _ => self.messages.insert(0, Message::system(prompt)),
        }
    }

    /// Append one message and persist, dropping the oldest non-system
    /// messages past the limit.
    /// While the file is unreadable the message stays in memory only.
    pub fn append(&mut self, message: Message) -> Result<(), StoreError> {
        self.messages.push(message);
        self.resync()?;
        enforce_limit(&mut self.messages, self.limit);
        self.persist()
    }

    pub fn replace_all(&mut self, messages: Vec<Message>) -> Result<(), StoreError> {
        self.resync()?;
        self.messages = messages;
        enforce_limit(&mut self.messages, self.limit);
        self.persist()
    }

    /// Drop everything except the system prompt.
    pub fn clear(&mut self) -> Result<(), StoreError> {
        self.resync()?;
        self.messages
            .retain(|m| m.role == Role::System && !compact::is_summary(m));
        self.messages.truncate(1);
        self.persist()
    }

    /// Summarize older messages once the history passes the threshold.
    pub async fn compact_if_needed(
        &mut self,
        client: &dyn ModelClient,
        options: &SendOptions,
    ) -> Result<Option<CompactionReport>, StoreError> {
        self.resync()?;
        let Some(plan) = compact::plan(&self.messages, self.compact_threshold, self.keep_recent)
        else {
            return Ok(None);
        };
        let older = &self.messages[plan.older.clone()];
        let request = compact::summary_request(older);
        let options = options.clone().uncached();
        let (summary, model_summary) = match client.send(&request, &options).await {
            Ok(text) if !text.trim().is_empty() => (text, true),
            Ok(_) => {
                tracing::warn!("model returned an empty history summary; using local digest");
                (compact::local_digest(older), false)
            }
            Err(err) => {
                tracing::warn!(error = %err, "history summary request failed; using local digest");
                (compact::local_digest(older), false)
            }
        };
        let before = self.messages.len();
        let compacted = compact::apply(&self.messages, &plan, &summary);
        self.replace_all(compacted)?;
        tracing::info!(before, after = self.messages.len(), model_summary, "history compacted");
        Ok(Some(CompactionReport {
            before,
            after: self.messages.len(),
            model_summary,
        }))
    }

    fn persist(&self) -> Result<(), StoreError> {
        let _lock = FileLock::exclusive(&self.path, self.lock_timeout)?;
        write_json_atomic(&self.path, &self.messages)
    }
}

/// Read and validate the history file under a shared lock.
pub fn read_history(path: &Path, lock_timeout: Duration) -> Result<LoadOutcome, StoreError> {
    if !path.exists() {
        return Ok(LoadOutcome::Missing);
    }
    let raw = {
        let _lock = FileLock::shared(path, lock_timeout)?;
        match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(LoadOutcome::Missing),
            Err(err) if err.kind() == ErrorKind::InvalidData => {
                return Ok(LoadOutcome::Corrupt("file is not valid UTF-8".into()));
            }
            Err(err) => return Err(err.into()),
        }
    };
    if raw.trim().is_empty() {
        return Ok(LoadOutcome::Loaded(Vec::new()));
    }
    Ok(match validate(&raw) {
        Ok(messages) => LoadOutcome::Loaded(messages),
        Err(reason) => LoadOutcome::Corrupt(reason),
    })
}

/// Every record must be an object with a known role and string content.
fn validate(raw: &str) -> Result<Vec<Message>, String> {
    let value: Value = serde_json::from_str(raw).map_err(|e| format!("invalid JSON: {e}"))?;
    let Value::Array(records) = value else {
        return Err("top level is not an array".into());
    };
    records
        .iter()
        .enumerate()
        .map(|(idx, record)| {
            let role = record
                .get("role")
                .and_then(Value::as_str)
                .ok_or_else(|| format!("record {idx} has no role"))?;
            let role =
                Role::parse(role).ok_or_else(|| format!("record {idx} has unknown role '{role}'"))?;
            let content = record
                .get("content")
                .and_then(Value::as_str)
                .ok_or_else(|| format!("record {idx} has no content"))?;
            Ok(Message::new(role, content))
        })
        .collect()
}

/// Keep at most `limit` messages: the leading system prompt survives and the
/// oldest messages after it go first.
pub fn enforce_limit(messages: &mut Vec<Message>, limit: usize) {
    if messages.len() <= limit {
        return;
    }
    let pinned = usize::from(limit > 1 && messages.first().is_some_and(|m| m.role == Role::System));
    let excess = messages.len() - limit;
    messages.drain(pinned..pinned + excess);
}

fn quarantine(path: &Path) {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".corrupt");
    let target = path.with_file_name(name);
    match fs::rename(path, &target) {
        Ok(()) => tracing::warn!(saved = %target.display(), "corrupt history moved aside"),
        Err(err) => tracing::warn!(error = %err, "could not move corrupt history aside"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testsupport::{ScriptedModel, TestTempDir};
    use crate::error::ApiError;

    fn config(limit: usize, threshold: usize, keep_recent: usize) -> HistoryConfig {
        HistoryConfig {
            message_limit: limit,
            compact_threshold: threshold,
            keep_recent,
            lock_timeout_ms: 500,
        }
    }

    fn options() -> SendOptions {
        SendOptions {
            model: "m".into(),
            temperature: 0.1,
            max_tokens: None,
            use_cache: true,
        }
    }

    #[test]
    fn append_persists_and_reopen_restores() {
        let dir = TestTempDir::new("history-roundtrip");
        let path = dir.child("history.json");
        let mut store = HistoryStore::open(&path, &HistoryConfig::default());
        assert!(store.is_empty());
        store.set_system_prompt("sys");
        store.append(Message::user("list files")).unwrap();
        store.append(Message::assistant("ls -la")).unwrap();

        let reopened = HistoryStore::open(&path, &HistoryConfig::default());
        assert_eq!(
            reopened.messages(),
            &[
                Message::system("sys"),
                Message::user("list files"),
                Message::assistant("ls -la")
            ]
        );
    }

    #[test]
    fn limit_drops_oldest_after_system_prompt() {
        let dir = TestTempDir::new("history-limit");
        let mut store = HistoryStore::open(dir.child("h.json"), &config(4, 3, 1));
        store.set_system_prompt("sys");
        for i in 0..6 {
            store.append(Message::user(format!("m{i}"))).unwrap();
        }
        let contents: Vec<&str> = store.messages().iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["sys", "m3", "m4", "m5"]);
    }

    #[test]
    fn oversized_file_is_trimmed_on_load() {
        let dir = TestTempDir::new("history-trim-load");
        let path = dir.child("h.json");
        let records: Vec<Message> = (0..10).map(|i| Message::user(format!("m{i}"))).collect();
        fs::write(&path, serde_json::to_string(&records).unwrap()).unwrap();
        let store = HistoryStore::open(&path, &config(3, 2, 1));
        assert_eq!(store.len(), 3);
        assert_eq!(store.messages()[0].content, "m7");
    }

    #[test]
    fn corrupt_records_discard_the_whole_file() {
        for body in [
            r#"[{"role":"user","content":"ok"},{"role":"tool","content":"x"}]"#,
            r#"[{"content":"no role"}]"#,
            r#"[{"role":"user","content":null}]"#,
            r#"{"role":"user","content":"not an array"}"#,
            "[{ truncated",
        ] {
            let dir = TestTempDir::new("history-corrupt");
            let path = dir.write_text("h.json", body);
            let store = HistoryStore::open(&path, &HistoryConfig::default());
            assert!(store.is_empty(), "accepted: {body}");
            assert!(!path.exists());
            assert_eq!(fs::read_to_string(dir.child("h.json.corrupt")).unwrap(), body);
        }
    }

    #[test]
    fn clear_keeps_only_system_prompt() {
        let dir = TestTempDir::new("history-clear");
        let path = dir.child("h.json");
        let mut store = HistoryStore::open(&path, &HistoryConfig::default());
        store.set_system_prompt("sys");
        store.append(Message::user("a")).unwrap();
        store.clear().unwrap();
        assert_eq!(store.messages(), &[Message::system("sys")]);
        assert_eq!(HistoryStore::open(&path, &HistoryConfig::default()).len(), 1);
    }

    #[test]
    fn system_prompt_is_replaced_not_duplicated() {
        let dir = TestTempDir::new("history-prompt");
        let mut store = HistoryStore::open(dir.child("h.json"), &HistoryConfig::default());
        store.set_system_prompt("v1");
        store.set_system_prompt("v2");
        assert_eq!(store.messages(), &[Message::system("v2")]);
    }

    #[tokio::test]
    async fn compaction_uses_model_summary() {
        let dir = TestTempDir::new("history-compact");
        let mut store = HistoryStore::open(dir.child("h.json"), &config(40, 6, 2));
        store.set_system_prompt("sys");
        for i in 0..4 {
            store.append(Message::user(format!("q{i}"))).unwrap();
            store.append(Message::assistant(format!("a{i}"))).unwrap();
        }
        let model = ScriptedModel::new(["- user asked four questions"]);
        let report = store.compact_if_needed(&model, &options()).await.unwrap().unwrap();
        assert_eq!(report, CompactionReport { before: 9, after: 4, model_summary: true });
        assert_eq!(store.messages()[0], Message::system("sys"));
        assert_eq!(
            store.messages()[1].content,
            format!("{}\n- user asked four questions", compact::SUMMARY_PREFIX)
        );
        assert_eq!(store.messages()[3], Message::assistant("a3"));
        assert!(model.requests()[0][1].content.contains("user: q0"));

        let again = store.compact_if_needed(&model, &options()).await.unwrap();
        assert_eq!(again, None);
        assert_eq!(model.calls(), 1);
    }

    #[tokio::test]
    async fn compaction_falls_back_to_local_digest() {
        let dir = TestTempDir::new("history-compact-offline");
        let mut store = HistoryStore::open(dir.child("h.json"), &config(40, 3, 1));
        for i in 0..5 {
            store.append(Message::user(format!("q{i}"))).unwrap();
        }
        let model = ScriptedModel::with_results([Err(ApiError::status(500, "down".into(), None))]);
        let report = store.compact_if_needed(&model, &options()).await.unwrap().unwrap();
        assert!(!report.model_summary);
        assert_eq!(store.len(), 2);
        assert!(store.messages()[0].content.contains("- user: q0"));
        assert_eq!(store.messages()[1], Message::user("q4"));
    }

    #[test]
    fn write_fails_cleanly_while_another_writer_holds_the_lock() {
        let dir = TestTempDir::new("history-locked");
        let path = dir.child("h.json");
        let mut store = HistoryStore::open(&path, &config(10, 5, 1));
        let _held = FileLock::exclusive(&path, Duration::from_millis(100)).unwrap();
        let err = store.append(Message::user("x")).unwrap_err();
        assert!(matches!(err, StoreError::Lock(_)));
    }

    #[test]
    fn locked_file_at_open_is_merged_not_overwritten() {
        let dir = TestTempDir::new("history-open-locked");
        let path = dir.child("h.json");
        let quick = HistoryConfig {
            lock_timeout_ms: 50,
            ..config(100, 90, 4)
        };
        let mut writer = HistoryStore::open(&path, &quick);
        for i in 0..5 {
            writer.append(Message::user(format!("old {i}"))).unwrap();
        }

        let held = FileLock::exclusive(&path, Duration::from_millis(100)).unwrap();
        let mut store = HistoryStore::open(&path, &quick);
        assert!(store.is_empty());
        assert!(!store.is_synced());

        let err = store.append(Message::user("early")).unwrap_err();
        assert!(matches!(err, StoreError::Lock(_)));
        drop(held);
        assert_eq!(HistoryStore::open(&path, &quick).len(), 5);

        store.append(Message::user("new")).unwrap();
        assert!(store.is_synced());
        let reopened = HistoryStore::open(&path, &quick);
        assert_eq!(reopened.len(), 7);
        assert_eq!(reopened.messages()[0], Message::user("old 0"));
        assert_eq!(reopened.messages()[5], Message::user("early"));
        assert_eq!(reopened.messages()[6], Message::user("new"));
    }

    #[test]
    fn system_prompt_set_before_resync_lands_at_the_head() {
        let dir = TestTempDir::new("history-resync-system");
        let path = dir.child("h.json");
        let quick = HistoryConfig {
            lock_timeout_ms: 50,
            ..config(100, 90, 4)
        };
        let mut writer = HistoryStore::open(&path, &quick);
        writer.set_system_prompt("old sys");
        writer.append(Message::user("q")).unwrap();

        let held = FileLock::exclusive(&path, Duration::from_millis(100)).unwrap();
        let mut store = HistoryStore::open(&path, &quick);
        drop(held);
        store.set_system_prompt("new sys");
        store.append(Message::assistant("a")).unwrap();

        let reopened = HistoryStore::open(&path, &quick);
        assert_eq!(
            reopened.messages(),
            &[Message::system("new sys"), Message::user("q"), Message::assistant("a")]
        );
    }

    #[cfg(feature = "fuzz-tests")]
    mod prop_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(32))]

            #[test]
            fn history_never_exceeds_limit(
                limit in 1usize..12,
                roles in proptest::collection::vec(0u8..3, 0..40),
            ) {
                let mut messages = Vec::new();
                for (i, role) in roles.iter().enumerate() {
                    let role = match role {
                        0 => Role::System,
                        1 => Role::User,
                        _ => Role::Assistant,
                    };
                    messages.push(Message::new(role, format!("m{i}")));
                    enforce_limit(&mut messages, limit);
                    prop_assert!(messages.len() <= limit);
                }
            }
        }
    }
}
