//! HTTP transport helpers for `/chat/completions`.

use crate::error::ApiError;
use crate::types::ChatResponse;
use futures_util::StreamExt;
use reqwest::header::{HeaderMap, CONTENT_TYPE, RETRY_AFTER};
use std::time::{Duration, SystemTime};

/// Build an HTTP client with timeout applied.
pub(super) fn build_http_client(timeout: Duration) -> reqwest::Client {
    // Fall back to reqwest defaults if builder creation fails for any reason.
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("eleven/", env!("CARGO_PKG_VERSION")))
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

/// POST a pre-serialized chat body and return the response once its status
/// is known to be successful.
pub(super) async fn post_chat(
    http: &reqwest::Client,
    base_url: &str,
    api_key: &str,
    body: Vec<u8>,
) -> Result<reqwest::Response, ApiError> {
    let url = format!("{base_url}/chat/completions");
    let mut req = http
        .post(&url)
        .header(CONTENT_TYPE, "application/json")
        .body(body);
    if !api_key.trim().is_empty() {
        req = req.bearer_auth(api_key);
    }

    let response = req.send().await?;
    if !response.status().is_success() {
        let status = response.status().as_u16();
        let retry_after_secs = parse_retry_after_secs(response.headers());
        let body = response.text().await.unwrap_or_default();
        return Err(ApiError::status(status, upstream_message(&body), retry_after_secs));
    }
    Ok(response)
}

/// Read a buffered body, failing once it grows past `limit` bytes.
pub(super) async fn read_body_capped(
    response: reqwest::Response,
    limit: usize,
) -> Result<String, ApiError> {
    if let Some(declared) = response.content_length() {
        let declared = usize::try_from(declared).unwrap_or(usize::MAX);
        if declared > limit {
            return Err(ApiError::ResponseTooLarge {
                size: declared,
                limit,
            });
        }
    }
    let mut body = Vec::new();
    let mut chunks = response.bytes_stream();
    while let Some(chunk) = chunks.next().await {
        let chunk = chunk?;
        if body.len() + chunk.len() > limit {
            return Err(ApiError::ResponseTooLarge {
                size: body.len() + chunk.len(),
                limit,
            });
        }
        body.extend_from_slice(&chunk);
    }
    String::from_utf8(body).map_err(|e| ApiError::InvalidResponse(format!("body is not UTF-8: {e}")))
}

/// Extract the assistant text from a `/chat/completions` body.
pub(super) fn parse_chat_body(body: &str) -> Result<String, ApiError> {
    let parsed: ChatResponse = serde_json::from_str(body)
        .map_err(|e| ApiError::InvalidResponse(format!("unparseable reply: {e}")))?;
    parsed
        .text()
        .map(str::to_string)
        .ok_or_else(|| ApiError::InvalidResponse("reply carried no message content".into()))
}

/// Parse `Retry-After` as delta-seconds or an HTTP date.
pub(crate) fn parse_retry_after_secs(headers: &HeaderMap) -> Option<u64> {
    let raw = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();
    if let Ok(seconds) = raw.parse::<u64>() {
        return Some(seconds);
    }
    let at = httpdate::parse_http_date(raw).ok()?;
    Some(
        at.duration_since(SystemTime::now())
            .map(|delta| delta.as_secs())
            .unwrap_or(0),
    )
}

/// Prefer the provider's `error.message` over a raw JSON dump.
fn upstream_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| {
            value
                .pointer("/error/message")
                .or_else(|| value.get("error"))
                .and_then(|v| v.as_str().map(str::to_string))
        })
        .unwrap_or_else(|| body.trim().to_string())
}
