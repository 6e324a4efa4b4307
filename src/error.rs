//! Unified error types for the agent.

use std::fmt;
use std::sync::Arc;

// ---------------------------------------------------------------------------
// ToolError
// ---------------------------------------------------------------------------

/// Errors arising from tool execution.
#[derive(Debug, Clone)]
pub enum ToolError {
    /// The tool call carried missing or unusable parameters.
    InvalidArguments(String),
    /// The tool ran but encountered a failure.
    ExecutionFailed(String),
    /// The tool did not finish within the configured limit.
    Timeout(String),
}

impl fmt::Display for ToolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArguments(msg) => write!(f, "invalid arguments: {msg}"),
            Self::ExecutionFailed(msg) => write!(f, "execution failed: {msg}"),
            Self::Timeout(msg) => write!(f, "timed out: {msg}"),
        }
    }
}

impl std::error::Error for ToolError {}

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// Errors when loading or parsing configuration.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Toml(toml::de::Error),
    Invalid(String),
    /// No credential could be resolved for the API.
    MissingApiKey,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "io: {e}"),
            Self::Toml(e) => write!(f, "toml: {e}"),
            Self::Invalid(msg) => write!(f, "invalid config: {msg}"),
            Self::MissingApiKey => write!(
                f,
                "no API key found; set ELEVEN_API_KEY or `api_key` under [api] in eleven.toml"
            ),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        Self::Toml(e)
    }
}

// ---------------------------------------------------------------------------
// ApiError
// ---------------------------------------------------------------------------

/// Errors from the HTTP API layer.
///
/// Cloneable so one failed upstream call can be handed to every waiter that
/// joined the same in-flight request.
#[derive(Debug, Clone)]
pub enum ApiError {
    /// Network / reqwest-level error.
    Http(Arc<reqwest::Error>),
    /// Non-2xx status from the API.
    Status {
        code: u16,
        body: String,
        retry_after_secs: Option<u64>,
    },
    /// The body could not be parsed into a reply.
    InvalidResponse(String),
    /// The serialized request exceeded the configured ceiling; nothing was sent.
    RequestTooLarge { size: usize, limit: usize },
    /// The reply exceeded the configured ceiling.
    ResponseTooLarge { size: usize, limit: usize },
}

impl ApiError {
    pub fn status(code: u16, body: String, retry_after_secs: Option<u64>) -> Self {
        Self::Status {
            code,
            body,
            retry_after_secs,
        }
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status { code, .. } => Some(*code),
            _ => None,
        }
    }

    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            Self::Status {
                retry_after_secs, ..
            } => *retry_after_secs,
            _ => None,
        }
    }

    /// True for rate limiting, server errors and connection-level failures,
    /// including a body cut off mid-read.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(inner) => {
                inner.is_timeout() || inner.is_connect() || inner.is_request() || inner.is_body()
            }
            Self::Status { code, .. } => *code == 429 || (500..=599).contains(code),
            Self::InvalidResponse(_) | Self::RequestTooLarge { .. } | Self::ResponseTooLarge { .. } => {
                false
            }
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Http(e) => write!(f, "http: {e}"),
            Self::Status { code, body, .. } => write!(f, "status {code}: {body}"),
            Self::InvalidResponse(msg) => write!(f, "invalid response: {msg}"),
            Self::RequestTooLarge { size, limit } => {
                write!(f, "request too large: {size} bytes exceeds limit of {limit}")
            }
            Self::ResponseTooLarge { size, limit } => {
                write!(f, "response too large: {size} bytes exceeds limit of {limit}")
            }
        }
    }
}

impl std::error::Error for ApiError {}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        Self::Http(Arc::new(e))
    }
}

// ---------------------------------------------------------------------------
// StoreError
// ---------------------------------------------------------------------------

/// Errors from the on-disk history and loop-state stores.
#[derive(Debug)]
pub enum StoreError {
    Io(std::io::Error),
    Json(serde_json::Error),
    /// The advisory lock could not be acquired in time.
    Lock(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "io: {e}"),
            Self::Json(e) => write!(f, "json: {e}"),
            Self::Lock(msg) => write!(f, "lock: {msg}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e)
    }
}

// ---------------------------------------------------------------------------
// AgentError
// ---------------------------------------------------------------------------

/// Top-level error type for the agent.
#[derive(Debug)]
pub enum AgentError {
    Config(ConfigError),
    Api(ApiError),
    Tool(ToolError),
    Store(StoreError),
    /// Model returned no choices in the response.
    EmptyResponse,
}

impl fmt::Display for AgentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => write!(f, "config: {e}"),
            Self::Api(e) => write!(f, "api: {e}"),
            Self::Tool(e) => write!(f, "tool: {e}"),
            Self::Store(e) => write!(f, "store: {e}"),
            Self::EmptyResponse => write!(f, "model returned empty response"),
        }
    }
}

impl std::error::Error for AgentError {}

impl From<ConfigError> for AgentError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

impl From<ApiError> for AgentError {
    fn from(e: ApiError) -> Self {
        Self::Api(e)
    }
}

impl From<ToolError> for AgentError {
    fn from(e: ToolError) -> Self {
        Self::Tool(e)
    }
}

impl From<StoreError> for AgentError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}
