//! Advisory locking and atomic JSON writes for on-disk state.
//!
//! Writers take an exclusive `fs2` lock on a sibling `<file>.lock`, write a
//! temporary file in the same directory, fsync it and rename it into place.
//! Readers take a shared lock. Lock acquisition polls up to a deadline so a
//! stuck peer can never hang the session. A contended wait inside a
//! multi-threaded tokio runtime runs through `block_in_place` so other tasks
//! keep their worker.

use crate::error::StoreError;
use fs2::FileExt;
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};
use tokio::runtime::{Handle, RuntimeFlavor};

const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Held advisory lock; released on drop.
#[derive(Debug)]
pub struct FileLock {
    file: File,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LockMode {
    Shared,
    Exclusive,
}

impl FileLock {
    pub fn exclusive(target: &Path, timeout: Duration) -> Result<Self, StoreError> {
        Self::acquire(target, timeout, LockMode::Exclusive)
    }

    pub fn shared(target: &Path, timeout: Duration) -> Result<Self, StoreError> {
        Self::acquire(target, timeout, LockMode::Shared)
    }

    fn acquire(target: &Path, timeout: Duration, mode: LockMode) -> Result<Self, StoreError> {
        let path = lock_path(target);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        // The lock file is left in place: unlinking it would let a waiter
        // lock a different inode than the next opener.
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;
        if try_lock(&file, mode).is_ok() {
            return Ok(Self { file });
        }
        let deadline = Instant::now() + timeout;
        off_the_runtime(|| loop {
            match try_lock(&file, mode) {
                Ok(()) => return Ok(()),
                Err(err) if Instant::now() >= deadline => {
                    return Err(StoreError::Lock(format!(
                        "could not lock {} within {}ms: {err}",
                        path.display(),
                        timeout.as_millis()
                    )));
                }
                Err(_) => thread::sleep(LOCK_POLL_INTERVAL),
            }
        })?;
        Ok(Self { file })
    }
}

fn try_lock(file: &File, mode: LockMode) -> std::io::Result<()> {
    match mode {
        LockMode::Shared => FileExt::try_lock_shared(file),
        LockMode::Exclusive => FileExt::try_lock_exclusive(file),
    }
}

/// Run a blocking wait without starving the async workers. A
/// current-thread runtime has no spare worker, so the wait runs inline.
fn off_the_runtime<R>(wait: impl FnOnce() -> R) -> R {
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(wait)
        }
        _ => wait(),
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

pub fn lock_path(target: &Path) -> PathBuf {
    let mut name = target
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".lock");
    target.with_file_name(name)
}

/// Serialize `value` and atomically replace `path` with owner-only
/// permissions. The caller must hold the exclusive lock.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StoreError> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)?;
    let body = serde_json::to_vec_pretty(value)?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "state".into());
    let tmp = parent.join(format!(".{file_name}.{}.tmp", std::process::id()));

    let result = (|| -> Result<(), StoreError> {
        let mut file = create_private(&tmp)?;
        file.write_all(&body)?;
        file.sync_all()?;
        drop(file);
        fs::rename(&tmp, path)?;
        Ok(())
    })();
    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}

/// Locked convenience wrapper around [`write_json_atomic`].
pub fn save_json_locked<T: Serialize + ?Sized>(
    path: &Path,
    value: &T,
    timeout: Duration,
) -> Result<(), StoreError> {
    let _lock = FileLock::exclusive(path, timeout)?;
    write_json_atomic(path, value)
}

#[cfg(unix)]
fn create_private(path: &Path) -> Result<File, StoreError> {
    use std::os::unix::fs::OpenOptionsExt;
    Ok(OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?)
}

#[cfg(not(unix))]
fn create_private(path: &Path) -> Result<File, StoreError> {
    Ok(File::create(path)?)
}
