//! Append-only JSONL record of completed queries.

use crate::error::StoreError;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionEntry {
    pub timestamp: String,
    pub query: String,
    pub response: String,
    /// First command the reply proposed, if any.
    pub command: Option<String>,
}

impl InteractionEntry {
    pub fn now(query: &str, response: &str, command: Option<&str>) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            query: query.to_string(),
            response: response.to_string(),
            command: command.map(str::to_string),
        }
    }
}

/// Writer for `eleven.log`. A disabled log accepts and drops entries.
#[derive(Debug, Clone)]
pub struct InteractionLog {
    path: PathBuf,
    enabled: bool,
}

impl InteractionLog {
    pub fn new(path: impl Into<PathBuf>, enabled: bool) -> Self {
        Self {
            path: path.into(),
            enabled,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn append(&self, entry: &InteractionEntry) -> Result<(), StoreError> {
        if !self.enabled {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let line = serde_json::to_string(entry)?;
        let mut file = open_append(&self.path)?;
        writeln!(file, "{line}")?;
        Ok(())
    }

    /// Best-effort append; failures are logged and swallowed.
    pub fn record(&self, query: &str, response: &str, command: Option<&str>) {
        if let Err(err) = self.append(&InteractionEntry::now(query, response, command)) {
            tracing::warn!(path = %self.path.display(), error = %err, "could not write interaction log");
        }
    }

    /// All parseable entries; malformed lines are skipped.
    pub fn read_all(&self) -> Result<Vec<InteractionEntry>, StoreError> {
        let file = match fs::File::open(&self.path) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };
        let mut entries = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(&line) {
                Ok(entry) => entries.push(entry),
                Err(err) => tracing::debug!(error = %err, "skipping malformed interaction log line"),
            }
        }
        Ok(entries)
    }
}

#[cfg(unix)]
fn open_append(path: &Path) -> Result<fs::File, StoreError> {
    use std::os::unix::fs::OpenOptionsExt;
    Ok(OpenOptions::new()
        .create(true)
        .append(true)
        .mode(0o600)
        .open(path)?)
}

#[cfg(not(unix))]
fn open_append(path: &Path) -> Result<fs::File, StoreError> {
    Ok(OpenOptions::new().create(true).append(true).open(path)?)
}
