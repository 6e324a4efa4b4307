//! API client orchestration: cache, deduplication, retries and size limits.
//!
//! The facade stays small:
//! - wire details live in `transport`.
//! - retry policy logic lives in `retry`.

mod retry;
mod transport;

use super::cache::{CacheStats, Fingerprint, ResponseCache};
use super::dedup::{Registration, RequestDeduplicator};
use super::stream::{decode_sse_body, CompletionHook, ReplyStream};
use super::{ModelClient, SendOptions};
use crate::config::{ApiConfig, CacheConfig};
use crate::error::ApiError;
use crate::types::{ChatRequest, Message};
use async_trait::async_trait;
use futures_util::StreamExt;
pub(crate) use retry::RetryPolicy;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

/// Request/response ceilings enforced around every call.
#[derive(Debug, Clone, Copy)]
pub struct SizeLimits {
    pub max_request_bytes: usize,
    pub max_response_bytes: usize,
}

/// Client for OpenAI-compatible model APIs.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    retry_policy: RetryPolicy,
    limits: SizeLimits,
    cache: Option<Arc<ResponseCache>>,
    dedup: RequestDeduplicator<Result<String, ApiError>>,
    attempts: AtomicU64,
}

impl ApiClient {
    /// Build a client from resolved API and cache configuration.
    pub fn new(api: &ApiConfig, cache: &CacheConfig) -> Self {
        let retry_policy = RetryPolicy {
            max_retries: api.max_retries,
            base_delay: Duration::from_millis(api.backoff_base_ms),
            max_delay: Duration::from_millis(api.backoff_max_ms),
        };
        let response_cache = cache.enabled.then(|| {
            Arc::new(ResponseCache::new(
                cache.max_entries,
                Duration::from_secs(cache.ttl_secs),
            ))
        });
        Self::with_parts(api, retry_policy, response_cache)
    }

    pub(crate) fn with_parts(
        api: &ApiConfig,
        retry_policy: RetryPolicy,
        cache: Option<Arc<ResponseCache>>,
    ) -> Self {
        Self {
            http: transport::build_http_client(api.timeout()),
            base_url: api.base_url.trim_end_matches('/').to_string(),
            api_key: api.api_key.trim().to_string(),
            retry_policy,
            limits: SizeLimits {
                max_request_bytes: api.max_request_bytes,
                max_response_bytes: api.max_response_bytes,
            },
            cache,
            dedup: RequestDeduplicator::new(),
            attempts: AtomicU64::new(0),
        }
    }

    /// Total HTTP attempts made, retries included.
    pub fn upstream_attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }

    /// Buffered request: cache, then dedup, then retried dispatch.
    pub async fn send(&self, messages: &[Message], options: &SendOptions) -> Result<String, ApiError> {
        let key = Fingerprint::for_request(messages, &options.model, options.temperature);
        if let Some(hit) = self.cached(&key, options) {
            return Ok(hit);
        }
        self.dedup
            .execute_once(key.clone(), || async {
                let result = self.send_uncached(messages, options).await;
                if let Ok(text) = &result {
                    self.remember(&key, text, options);
                }
                result
            })
            .await
    }

    /// Streaming request. Only the connection stage is retried; once bytes
    /// flow, errors surface through the stream.
    ///
    /// Shares the in-flight table with [`ApiClient::send`]: the leader
    /// streams live and, when its stream ends, hands the assembled text (or
    /// the error) to every identical request that arrived meanwhile. Those
    /// get it as a single chunk.
    pub async fn send_streaming(
        &self,
        messages: &[Message],
        options: &SendOptions,
    ) -> Result<ReplyStream, ApiError> {
        let key = Fingerprint::for_request(messages, &options.model, options.temperature);
        if let Some(hit) = self.cached(&key, options) {
            return Ok(ReplyStream::from_text(hit));
        }
        let ticket = loop {
            match self.dedup.register(key.clone()) {
                Registration::Leader(ticket) => break ticket,
                Registration::Follower(receiver) => match receiver.await {
                    Ok(result) => return result.map(ReplyStream::from_text),
                    Err(_) => tracing::debug!(key = %key, "streaming leader went away; retrying"),
                },
            }
        };

        let body = match self.encode_request(messages, options, true) {
            Ok(body) => body,
            Err(err) => {
                ticket.finish(&Err(err.clone()));
                return Err(err);
            }
        };
        let response = match self
            .with_retries(|| transport::post_chat(&self.http, &self.base_url, &self.api_key, body.clone()))
            .await
        {
            Ok(response) => response,
            Err(err) => {
                ticket.finish(&Err(err.clone()));
                return Err(err);
            }
        };

        let bytes = response
            .bytes_stream()
            .map(|chunk| chunk.map(|b| b.to_vec()).map_err(ApiError::from))
            .boxed();
        let cache = self.cache.clone().filter(|_| options.use_cache);
        let on_complete: CompletionHook = Box::new(move |done: Result<&str, &ApiError>| {
            let shared = done.map(str::to_string).map_err(ApiError::clone);
            if let (Some(cache), Ok(text)) = (&cache, &shared) {
                if !text.is_empty() {
                    cache.store(key, text.clone(), cache.default_ttl());
                }
            }
            ticket.finish(&shared);
        });
        Ok(decode_sse_body(bytes, self.limits.max_response_bytes, Some(on_complete)))
    }

    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.cache.as_ref().map(|cache| cache.stats())
    }

    fn cached(&self, key: &Fingerprint, options: &SendOptions) -> Option<String> {
        if !options.use_cache {
            return None;
        }
        let hit = self.cache.as_ref()?.lookup(key);
        if hit.is_some() {
            tracing::debug!(key = %key, "response cache hit");
        }
        hit
    }

    fn remember(&self, key: &Fingerprint, text: &str, options: &SendOptions) {
        if let (Some(cache), true) = (&self.cache, options.use_cache) {
            cache.store(key.clone(), text.to_string(), cache.default_ttl());
        }
    }

    async fn send_uncached(&self, messages: &[Message], options: &SendOptions) -> Result<String, ApiError> {
        let body = self.encode_request(messages, options, false)?;
        let limit = self.limits.max_response_bytes;
        self.with_retries(|| async {
            let response =
                transport::post_chat(&self.http, &self.base_url, &self.api_key, body.clone()).await?;
            let text = transport::read_body_capped(response, limit).await?;
            transport::parse_chat_body(&text)
        })
        .await
    }

    fn encode_request(
        &self,
        messages: &[Message],
        options: &SendOptions,
        stream: bool,
    ) -> Result<Vec<u8>, ApiError> {
        let mut request = ChatRequest::new(options.model.clone(), messages.to_vec())
            .with_temperature(options.temperature);
        request.max_tokens = options.max_tokens;
        request.stream = stream;
        let body = serde_json::to_vec(&request)
            .map_err(|e| ApiError::InvalidResponse(format!("failed to encode request: {e}")))?;
        if body.len() > self.limits.max_request_bytes {
            return Err(ApiError::RequestTooLarge {
                size: body.len(),
                limit: self.limits.max_request_bytes,
            });
        }
        Ok(body)
    }

    async fn with_retries<T, F, Fut>(&self, mut dispatch: F) -> Result<T, ApiError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, ApiError>>,
    {
        let mut attempt: u32 = 0;
        loop {
            self.attempts.fetch_add(1, Ordering::Relaxed);
            match dispatch().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    if !self.retry_policy.should_retry(&err, attempt) {
                        return Err(err);
                    }
                    let delay = self.retry_policy.retry_delay_for(attempt, &err);
                    tracing::warn!(
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient API failure; retrying"
                    );
                    attempt = attempt.saturating_add(1);
                    sleep(delay).await;
                }
            }
        }
    }
}

#[async_trait]
impl ModelClient for ApiClient {
    async fn send(&self, messages: &[Message], options: &SendOptions) -> Result<String, ApiError> {
        ApiClient::send(self, messages, options).await
    }

    async fn send_streaming(
        &self,
        messages: &[Message],
        options: &SendOptions,
    ) -> Result<ReplyStream, ApiError> {
        ApiClient::send_streaming(self, messages, options).await
    }

    fn cache_stats(&self) -> Option<CacheStats> {
        ApiClient::cache_stats(self)
    }
}
