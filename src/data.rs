//! Export and deletion of everything eleven stores about the user.

use crate::config::Config;
use crate::error::StoreError;
use crate::history::lock::{lock_path, write_json_atomic};
use crate::history::{read_history, LoadOutcome};
use crate::interaction_log::{InteractionEntry, InteractionLog};
use crate::types::Message;
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::Value;
use std::fs;
use std::io::{BufRead, ErrorKind};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Word the user must type to confirm deletion.
pub const DELETE_CONFIRMATION: &str = "DELETE";

/// Locations of user data under the data directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPaths {
    pub history: PathBuf,
    pub loops: PathBuf,
    pub interaction_log: PathBuf,
}

impl DataPaths {
    pub fn from_config(config: &Config) -> Self {
        Self {
            history: config.history_path(),
            loops: config.loops_dir(),
            interaction_log: config.interaction_log_path(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ExportBundle {
    pub exported_at: String,
    pub history: Vec<Message>,
    /// Live and archived loop states, as stored.
    pub loops: Vec<Value>,
    pub interactions: Vec<InteractionEntry>,
}

/// Counts reported after an export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportSummary {
    pub messages: usize,
    pub loops: usize,
    pub interactions: usize,
}

pub fn collect(paths: &DataPaths, lock_timeout: Duration) -> Result<ExportBundle, StoreError> {
    let history = match read_history(&paths.history, lock_timeout)? {
        LoadOutcome::Loaded(messages) => messages,
        LoadOutcome::Missing => Vec::new(),
        LoadOutcome::Corrupt(reason) => {
            tracing::warn!(%reason, "history is corrupt; exporting without it");
            Vec::new()
        }
    };
    let mut loops = read_json_dir(&paths.loops)?;
    loops.extend(read_json_dir(&paths.loops.join("archive"))?);
    let interactions = InteractionLog::new(&paths.interaction_log, true).read_all()?;
    Ok(ExportBundle {
        exported_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        history,
        loops,
        interactions,
    })
}

/// Write a JSON bundle of all user data to `dest` (owner-only).
pub fn export(paths: &DataPaths, dest: &Path, lock_timeout: Duration) -> Result<ExportSummary, StoreError> {
    let bundle = collect(paths, lock_timeout)?;
    write_json_atomic(dest, &bundle)?;
    tracing::info!(dest = %dest.display(), "user data exported");
    Ok(ExportSummary {
        messages: bundle.history.len(),
        loops: bundle.loops.len(),
        interactions: bundle.interactions.len(),
    })
}

/// Remove history, loop states and the interaction log. Returns what was
/// actually removed.
pub fn delete(paths: &DataPaths) -> Result<Vec<PathBuf>, StoreError> {
    let mut removed = Vec::new();
    let mut corrupt_name = paths.history.as_os_str().to_os_string();
    corrupt_name.push(".corrupt");
    for file in [
        paths.history.clone(),
        lock_path(&paths.history),
        PathBuf::from(corrupt_name),
        paths.interaction_log.clone(),
    ] {
        match fs::remove_file(&file) {
            Ok(()) => removed.push(file),
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }
    }
    match fs::remove_dir_all(&paths.loops) {
        Ok(()) => removed.push(paths.loops.clone()),
        Err(err) if err.kind() == ErrorKind::NotFound => {}
        Err(err) => return Err(err.into()),
    }
    tracing::info!(count = removed.len(), "user data deleted");
    Ok(removed)
}

/// True when the next line of `input` is exactly [`DELETE_CONFIRMATION`].
pub fn confirm_delete(input: &mut impl BufRead) -> bool {
    let mut line = String::new();
    match input.read_line(&mut line) {
        Ok(0) | Err(_) => false,
        Ok(_) => line.trim() == DELETE_CONFIRMATION,
    }
}

fn read_json_dir(dir: &Path) -> Result<Vec<Value>, StoreError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err.into()),
    };
    let mut paths: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| p.is_file() && p.extension().and_then(|e| e.to_str()) == Some("json"))
        .collect();
    paths.sort();
    Ok(paths
        .iter()
        .filter_map(|p| fs::read_to_string(p).ok())
        .filter_map(|raw| serde_json::from_str(&raw).ok())
        .collect())
}
