//! Default configuration constants.
//!
//! Shared by the serde `Default` impls and by tests, so literals live in
//! exactly one place.

/// Default OpenAI-compatible API base URL (xAI).
pub(super) const DEFAULT_API_BASE_URL: &str = "https://api.x.ai/v1";
pub(super) const DEFAULT_MODEL: &str = "grok-code-fast-1";
pub(super) const DEFAULT_TEMPERATURE: f64 = 0.1;
pub(super) const DEFAULT_MAX_TOKENS: u32 = 2048;
pub(super) const DEFAULT_API_TIMEOUT_SECS: u64 = 60;
pub(super) const DEFAULT_MAX_RETRIES: u32 = 3;
pub(super) const DEFAULT_BACKOFF_BASE_MS: u64 = 1000;
pub(super) const DEFAULT_BACKOFF_MAX_MS: u64 = 30_000;
/// Ceiling on the serialized request body.
pub(super) const DEFAULT_MAX_REQUEST_BYTES: usize = 1024 * 1024;
/// Ceiling on the reply body (buffered or accumulated stream).
pub(super) const DEFAULT_MAX_RESPONSE_BYTES: usize = 4 * 1024 * 1024;

pub(super) const DEFAULT_CACHE_MAX_ENTRIES: usize = 100;
pub(super) const DEFAULT_CACHE_TTL_SECS: u64 = 300;

/// Hard cap on persisted history messages; oldest dropped first.
pub(super) const DEFAULT_HISTORY_MESSAGE_LIMIT: usize = 40;
/// Message count above which compaction runs.
pub(super) const DEFAULT_HISTORY_COMPACT_THRESHOLD: usize = 20;
pub(super) const DEFAULT_HISTORY_KEEP_RECENT: usize = 6;
pub(super) const DEFAULT_HISTORY_LOCK_TIMEOUT_MS: u64 = 2000;

pub(super) const DEFAULT_TOOL_TIMEOUT_SECS: u64 = 30;
pub(super) const DEFAULT_TOOL_MAX_OUTPUT_BYTES: usize = 4000;

pub(super) const DEFAULT_HOOK_TIMEOUT_SECS: u64 = 10;

pub(super) const DEFAULT_LOOP_MAX_ITERATIONS: u32 = 20;
pub(super) const DEFAULT_LOOP_CONTEXT_ITERATIONS: usize = 5;
pub(super) const DEFAULT_LOOP_DELAY_MS: u64 = 500;

pub(super) const DEFAULT_LOG_LEVEL: &str = "warn";

/// Per-user data directory name under `$HOME`.
pub(super) const DATA_DIR_NAME: &str = ".eleven";
/// Config file name, both local and under the XDG config root.
pub(super) const CONFIG_FILE_NAME: &str = "eleven.toml";
