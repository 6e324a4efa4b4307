//! Loop-state persistence under `<data_dir>/loops/`.
//!
//! One `<id>.json` per running loop, rewritten after every iteration. A
//! cancel request is a sibling `<id>.cancel` marker so it never races the
//! controller's own state writes. Finished loops move to `archive/`.

use crate::error::StoreError;
use crate::history::lock::{save_json_locked, FileLock};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

const STATE_EXT: &str = "json";
const CANCEL_EXT: &str = "cancel";
const ARCHIVE_DIR: &str = "archive";

/// Controller state, persisted with every iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopStatus {
    Init,
    Iterating,
    Completed,
    Cancelled,
    Exhausted,
}

impl LoopStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Exhausted)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Init => "INIT",
            Self::Iterating => "ITERATING",
            Self::Completed => "COMPLETED",
            Self::Cancelled => "CANCELLED",
            Self::Exhausted => "EXHAUSTED",
        }
    }
}

/// What one iteration produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IterationRecord {
    pub index: u32,
    pub reply: String,
    #[serde(default)]
    pub tool_output: String,
}

impl IterationRecord {
    fn render(&self) -> String {
        let mut text = format!("Iteration {}:\n{}", self.index, self.reply.trim());
        if !self.tool_output.trim().is_empty() {
            text.push_str("\nExecution output:\n");
            text.push_str(self.tool_output.trim());
        }
        text
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopState {
    pub id: String,
    pub prompt: String,
    pub completion_marker: String,
    pub iteration_count: u32,
    pub max_iterations: u32,
    pub status: LoopStatus,
    #[serde(default)]
    pub iterations: Vec<IterationRecord>,
    #[serde(default)]
    pub completion_reason: Option<String>,
    /// How many recent iterations the next prompt replays.
    #[serde(default = "default_context_iterations")]
    pub context_iterations: usize,
    /// Condensed recent iterations, refreshed by [`LoopState::record`].
    #[serde(default)]
    pub context_summary: String,
    pub started_at_millis: u64,
    pub updated_at_millis: u64,
}

impl LoopState {
    pub fn new(prompt: &str, completion_marker: &str, max_iterations: u32) -> Self {
        let now = now_unix_millis();
        Self {
            id: generate_loop_id(),
            prompt: prompt.to_string(),
            completion_marker: completion_marker.to_string(),
            iteration_count: 0,
            max_iterations,
            status: LoopStatus::Init,
            iterations: Vec::new(),
            completion_reason: None,
            context_iterations: default_context_iterations(),
            context_summary: String::new(),
            started_at_millis: now,
            updated_at_millis: now,
        }
    }

    pub fn with_context_iterations(mut self, keep: usize) -> Self {
        self.context_iterations = keep;
        self.context_summary = self.recent_iterations();
        self
    }

    pub fn record(&mut self, reply: String, tool_output: String) {
        self.iteration_count += 1;
        self.iterations.push(IterationRecord {
            index: self.iteration_count,
            reply,
            tool_output,
        });
        self.context_summary = self.recent_iterations();
    }

    fn recent_iterations(&self) -> String {
        let start = self.iterations.len().saturating_sub(self.context_iterations);
        self.iterations[start..]
            .iter()
            .map(IterationRecord::render)
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Prompt for the next iteration.
    pub fn build_prompt(&self) -> String {
        let context = &self.context_summary;
        let marker = &self.completion_marker;
        if context.is_empty() {
            format!("{}\n\nOutput '{marker}' when complete.", self.prompt)
        } else {
            format!(
                "{}\n\nPrevious iterations:\n{context}\n\nContinue working on this task. Output '{marker}' when complete.",
                self.prompt
            )
        }
    }
}

fn default_context_iterations() -> usize {
    5
}

/// Filesystem-backed storage for loop states.
#[derive(Debug, Clone)]
pub struct LoopStore {
    dir: PathBuf,
    lock_timeout: Duration,
}

impl LoopStore {
    pub fn new(dir: impl Into<PathBuf>, lock_timeout: Duration) -> Self {
        Self {
            dir: dir.into(),
            lock_timeout,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn state_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.{STATE_EXT}"))
    }

    pub fn archive_path(&self, id: &str) -> PathBuf {
        self.dir.join(ARCHIVE_DIR).join(format!("{id}.{STATE_EXT}"))
    }

    fn cancel_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.{CANCEL_EXT}"))
    }

    pub fn save(&self, state: &mut LoopState) -> Result<(), StoreError> {
        validate_loop_id(&state.id)?;
        state.updated_at_millis = now_unix_millis();
        save_json_locked(&self.state_path(&state.id), state, self.lock_timeout)
    }

    /// Load a live loop. Missing or corrupt files yield `None`.
    pub fn load(&self, id: &str) -> Result<Option<LoopState>, StoreError> {
        validate_loop_id(id)?;
        let path = self.state_path(id);
        read_state(&path, self.lock_timeout)
    }

    /// Live loops that have not reached a terminal state, oldest first.
    pub fn list_active(&self) -> Result<Vec<LoopState>, StoreError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };
        let mut active = Vec::new();
        for entry in entries.filter_map(Result::ok) {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(STATE_EXT) {
                continue;
            }
            if let Ok(Some(state)) = read_state(&path, self.lock_timeout) {
                if !state.status.is_terminal() {
                    active.push(state);
                }
            }
        }
        active.sort_by(|a, b| {
            a.started_at_millis
                .cmp(&b.started_at_millis)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(active)
    }

    /// Ask a running loop to stop at its next iteration boundary. Returns
    /// false when no live loop has this id.
    pub fn request_cancel(&self, id: &str) -> Result<bool, StoreError> {
        validate_loop_id(id)?;
        if !self.state_path(id).is_file() {
            return Ok(false);
        }
        fs::write(self.cancel_path(id), b"cancel\n")?;
        tracing::info!(loop_id = id, "loop cancellation requested");
        Ok(true)
    }

    pub fn cancel_requested(&self, id: &str) -> bool {
        self.cancel_path(id).exists()
    }

    /// Move a finished loop into `archive/` and drop its cancel marker.
    pub fn archive(&self, state: &mut LoopState) -> Result<PathBuf, StoreError> {
        validate_loop_id(&state.id)?;
        state.updated_at_millis = now_unix_millis();
        let target = self.archive_path(&state.id);
        save_json_locked(&target, state, self.lock_timeout)?;
        let live = self.state_path(&state.id);
        {
            let _lock = FileLock::exclusive(&live, self.lock_timeout)?;
            remove_if_present(&live)?;
        }
        remove_if_present(&self.cancel_path(&state.id))?;
        remove_if_present(&crate::history::lock::lock_path(&live))?;
        Ok(target)
    }
}

fn read_state(path: &Path, lock_timeout: Duration) -> Result<Option<LoopState>, StoreError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = {
        let _lock = FileLock::shared(path, lock_timeout)?;
        match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        }
    };
    match serde_json::from_str::<LoopState>(&raw) {
        Ok(state) => Ok(Some(state)),
        Err(err) => {
            tracing::error!(path = %path.display(), error = %err, "loop state is corrupt; ignoring it");
            Ok(None)
        }
    }
}

fn remove_if_present(path: &Path) -> Result<(), StoreError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err.into()),
    }
}

/// Ids come from the command line; keep them to one path component.
fn validate_loop_id(id: &str) -> Result<(), StoreError> {
    let valid = !id.is_empty()
        && id != "."
        && id != ".."
        && id
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' || ch == '.');
    if valid {
        Ok(())
    } else {
        Err(StoreError::Io(std::io::Error::new(
            ErrorKind::InvalidInput,
            format!("invalid loop id '{id}'"),
        )))
    }
}

/// `loop_<unix seconds>_<4 hex>`.
pub fn generate_loop_id() -> String {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    let suffix: u16 = rand::thread_rng().gen();
    format!("loop_{secs}_{suffix:04x}")
}

fn now_unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testsupport::TestTempDir;

    fn store(dir: &TestTempDir) -> LoopStore {
        LoopStore::new(dir.child("loops"), Duration::from_millis(500))
    }

    #[test]
    fn save_load_and_list_active() {
        let dir = TestTempDir::new("loops-save");
        let store = store(&dir);
        let mut state = LoopState::new("refactor", "DONE", 5);
        store.save(&mut state).unwrap();
        let loaded = store.load(&state.id).unwrap().unwrap();
        assert_eq!(loaded, state);
        assert_eq!(store.list_active().unwrap().len(), 1);

        state.status = LoopStatus::Completed;
        store.save(&mut state).unwrap();
        assert!(store.list_active().unwrap().is_empty());
    }

    #[test]
    fn archive_moves_state_and_clears_cancel_marker() {
        let dir = TestTempDir::new("loops-archive");
        let store = store(&dir);
        let mut state = LoopState::new("task", "DONE", 3);
        store.save(&mut state).unwrap();
        assert!(store.request_cancel(&state.id).unwrap());
        assert!(store.cancel_requested(&state.id));

        state.status = LoopStatus::Cancelled;
        let archived = store.archive(&mut state).unwrap();
        assert_eq!(archived, store.archive_path(&state.id));
        assert!(archived.is_file());
        assert!(!store.state_path(&state.id).exists());
        assert!(!store.cancel_requested(&state.id));
        assert_eq!(store.load(&state.id).unwrap(), None);
    }

    #[test]
    fn cancel_of_unknown_loop_reports_false() {
        let dir = TestTempDir::new("loops-cancel-unknown");
        assert!(!store(&dir).request_cancel("loop_1_abcd").unwrap());
    }

    #[test]
    fn path_like_ids_are_rejected() {
        let dir = TestTempDir::new("loops-bad-id");
        let store = store(&dir);
        assert!(store.load("../history").is_err());
        assert!(store.request_cancel("a/b").is_err());
    }

    #[test]
    fn corrupt_state_is_ignored() {
        let dir = TestTempDir::new("loops-corrupt");
        let store = store(&dir);
        dir.write_text("loops/loop_1_0000.json", "{\"id\": 3");
        assert_eq!(store.load("loop_1_0000").unwrap(), None);
        assert!(store.list_active().unwrap().is_empty());
    }

    #[test]
    fn prompt_replays_only_recent_iterations() {
        let mut state = LoopState::new("fix tests", "ALL GREEN", 10).with_context_iterations(2);
        assert_eq!(
            state.build_prompt(),
            "fix tests\n\nOutput 'ALL GREEN' when complete."
        );
        for i in 0..4 {
            state.record(format!("reply {i}"), if i == 3 { "ok".into() } else { String::new() });
        }
        let prompt = state.build_prompt();
        assert!(!prompt.contains("reply 1"));
        assert!(prompt.contains("Iteration 3:\nreply 2\n\nIteration 4:\nreply 3\nExecution output:\nok"));
        assert!(prompt.ends_with("Continue working on this task. Output 'ALL GREEN' when complete."));
    }

    #[test]
    fn context_summary_is_saved_with_the_state() {
        let dir = TestTempDir::new("loops-summary");
        let store = store(&dir);
        let mut state = LoopState::new("task", "DONE", 5).with_context_iterations(1);
        state.record("first".into(), String::new());
        state.record("second".into(), "built".into());
        assert_eq!(state.context_summary, "Iteration 2:\nsecond\nExecution output:\nbuilt");

        state.status = LoopStatus::Exhausted;
        let archived = store.archive(&mut state).unwrap();
        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(archived).unwrap()).unwrap();
        assert_eq!(raw["context_summary"], state.context_summary.as_str());
        assert_eq!(raw["context_iterations"], 1);
    }

    #[test]
    fn generated_ids_are_valid() {
        let id = generate_loop_id();
        assert!(id.starts_with("loop_"));
        assert!(validate_loop_id(&id).is_ok());
    }
}
