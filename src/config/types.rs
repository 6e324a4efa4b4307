//! Configuration data model.
//!
//! Struct/enum definitions plus default values only. Source precedence and
//! env overrides live in `config::mod`.

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use super::defaults::*;

/// Top-level runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub api: ApiConfig,
    pub cache: CacheConfig,
    pub history: HistoryConfig,
    pub tools: ToolsConfig,
    pub hooks: HooksConfig,
    pub loop_mode: LoopConfig,
    pub display: DisplayConfig,
    pub logging: LoggingConfig,
    /// Root for history, loop states, hooks and the interaction log.
    pub data_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            cache: CacheConfig::default(),
            history: HistoryConfig::default(),
            tools: ToolsConfig::default(),
            hooks: HooksConfig::default(),
            loop_mode: LoopConfig::default(),
            display: DisplayConfig::default(),
            logging: LoggingConfig::default(),
            data_dir: PathBuf::from(DATA_DIR_NAME),
        }
    }
}

impl Config {
    pub fn history_path(&self) -> PathBuf {
        self.data_dir.join("history.json")
    }

    pub fn loops_dir(&self) -> PathBuf {
        self.data_dir.join("loops")
    }

    pub fn interaction_log_path(&self) -> PathBuf {
        self.data_dir.join("eleven.log")
    }

    /// Hook directory: explicit `[hooks] dir` or `<data_dir>/hooks`.
    pub fn hooks_dir(&self) -> PathBuf {
        match self.hooks.dir.as_deref().map(str::trim) {
            Some(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => self.data_dir.join("hooks"),
        }
    }
}

/// Model endpoint settings under `[api]`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub api_key: String,
    /// Name of an environment variable holding the key.
    pub api_key_env: Option<String>,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub timeout_secs: u64,
    /// Retries after the first attempt for transient failures.
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    pub max_request_bytes: usize,
    pub max_response_bytes: usize,
    /// Stream replies as server-sent events.
    pub stream: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE_URL.into(),
            api_key: String::new(),
            api_key_env: None,
            model: DEFAULT_MODEL.into(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            timeout_secs: DEFAULT_API_TIMEOUT_SECS,
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_base_ms: DEFAULT_BACKOFF_BASE_MS,
            backoff_max_ms: DEFAULT_BACKOFF_MAX_MS,
            max_request_bytes: DEFAULT_MAX_REQUEST_BYTES,
            max_response_bytes: DEFAULT_MAX_RESPONSE_BYTES,
            stream: true,
        }
    }
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn has_api_key(&self) -> bool {
        !self.api_key.trim().is_empty()
    }
}

/// Response cache settings under `[cache]`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub max_entries: usize,
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: DEFAULT_CACHE_MAX_ENTRIES,
            ttl_secs: DEFAULT_CACHE_TTL_SECS,
        }
    }
}

/// Conversation persistence under `[history]`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub message_limit: usize,
    pub compact_threshold: usize,
    /// Most recent messages kept verbatim by compaction.
    pub keep_recent: usize,
    pub lock_timeout_ms: u64,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            message_limit: DEFAULT_HISTORY_MESSAGE_LIMIT,
            compact_threshold: DEFAULT_HISTORY_COMPACT_THRESHOLD,
            keep_recent: DEFAULT_HISTORY_KEEP_RECENT,
            lock_timeout_ms: DEFAULT_HISTORY_LOCK_TIMEOUT_MS,
        }
    }
}

/// Tool execution settings under `[tools]`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// One limit for every tool kind, plugins included.
    pub timeout_secs: u64,
    pub max_output_bytes: usize,
    pub plugins: Vec<PluginSpec>,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TOOL_TIMEOUT_SECS,
            max_output_bytes: DEFAULT_TOOL_MAX_OUTPUT_BYTES,
            plugins: Vec::new(),
        }
    }
}

impl ToolsConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// A user-declared external tool (`[[tools.plugins]]`).
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct PluginSpec {
    pub name: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub description: String,
}

/// Hook runner settings under `[hooks]`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HooksConfig {
    pub enabled: bool,
    pub dir: Option<String>,
    pub timeout_secs: u64,
}

impl Default for HooksConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: None,
            timeout_secs: DEFAULT_HOOK_TIMEOUT_SECS,
        }
    }
}

/// Iteration-mode settings under `[loop]`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoopConfig {
    pub max_iterations: u32,
    /// Prior iterations replayed into each prompt.
    pub context_iterations: usize,
    pub delay_ms: u64,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_LOOP_MAX_ITERATIONS,
            context_iterations: DEFAULT_LOOP_CONTEXT_ITERATIONS,
            delay_ms: DEFAULT_LOOP_DELAY_MS,
        }
    }
}

/// Display / rendering preferences.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub color: bool,
    /// Print stream deltas as they arrive.
    pub stream_output: bool,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            color: true,
            stream_output: true,
        }
    }
}

/// Diagnostic logging and interaction log settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing` filter directive used when `ELEVEN_LOG` is unset.
    pub level: String,
    /// Append each completed query to the interaction log.
    pub interactions: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.into(),
            interactions: true,
        }
    }
}

/// On-disk shape of `eleven.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(super) struct FileConfig {
    pub(super) data_dir: Option<String>,
    pub(super) api: ApiConfig,
    pub(super) cache: CacheConfig,
    pub(super) history: HistoryConfig,
    pub(super) tools: ToolsConfig,
    pub(super) hooks: HooksConfig,
    #[serde(rename = "loop")]
    pub(super) loop_mode: LoopConfig,
    pub(super) display: DisplayConfig,
    pub(super) logging: LoggingConfig,
}
