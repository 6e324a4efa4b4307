//! HTTP client for OpenAI-compatible chat APIs.
//!
//! The API layer is split into cohesive pieces:
//! - `cache`: TTL + LRU response cache keyed by request fingerprint
//! - `dedup`: in-flight request collapsing
//! - `stream`: SSE decoding and the reply chunk stream
//! - `client`: retries, size ceilings and dispatch orchestration

use crate::error::ApiError;
use crate::types::Message;
use async_trait::async_trait;

pub mod cache;
mod client;
pub mod dedup;
pub mod stream;

pub use cache::{CacheStats, Fingerprint, ResponseCache};
pub use client::{ApiClient, SizeLimits};
pub use dedup::RequestDeduplicator;
pub use stream::{ReplyStream, SseDecoder, SseEvent};

/// Per-call model parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct SendOptions {
    pub model: String,
    pub temperature: f64,
    pub max_tokens: Option<u32>,
    /// Set to `false` for requests whose reply must not be reused, such as
    /// history summaries.
    pub use_cache: bool,
}

impl SendOptions {
    pub fn from_config(api: &crate::config::ApiConfig) -> Self {
        Self {
            model: api.model.clone(),
            temperature: api.temperature,
            max_tokens: Some(api.max_tokens),
            use_cache: true,
        }
    }

    pub fn uncached(mut self) -> Self {
        self.use_cache = false;
        self
    }
}

/// Minimal model API interface used by the agent and loop controller.
///
/// This trait lets tests provide deterministic scripted replies without
/// network calls while the production path uses [`ApiClient`].
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn send(&self, messages: &[Message], options: &SendOptions) -> Result<String, ApiError>;

    /// Stream the reply. Clients without native streaming yield the whole
    /// reply as one chunk.
    async fn send_streaming(
        &self,
        messages: &[Message],
        options: &SendOptions,
    ) -> Result<ReplyStream, ApiError> {
        let text = self.send(messages, options).await?;
        Ok(ReplyStream::from_text(text))
    }

    fn cache_stats(&self) -> Option<CacheStats> {
        None
    }
}
