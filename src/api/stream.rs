//! Streaming replies: SSE frame decoding and the chunk stream handed to callers.

use crate::error::ApiError;
use crate::types::StreamChunk;
use futures_util::stream::{self, BoxStream, Stream, StreamExt};
use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};

/// One decoded server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    /// A non-empty content delta.
    Delta(String),
    /// The `[DONE]` terminator.
    Done,
}

/// Incremental SSE decoder.
///
/// Buffers raw bytes, so a network chunk may end anywhere, including in the
/// middle of a multi-byte character or a JSON token.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend(bytes.iter().copied().filter(|b| *b != b'\r'));
        let mut events = Vec::new();
        while let Some(split) = find_frame_end(&self.buffer) {
            let frame: Vec<u8> = self.buffer.drain(..split + 2).collect();
            if let Some(event) = decode_frame(&frame[..split]) {
                events.push(event);
            }
        }
        events
    }

    /// Flush a trailing frame that was not followed by a blank line.
    pub fn finish(&mut self) -> Vec<SseEvent> {
        let rest = std::mem::take(&mut self.buffer);
        decode_frame(&rest).into_iter().collect()
    }
}

fn find_frame_end(buffer: &[u8]) -> Option<usize> {
    buffer.windows(2).position(|pair| pair == b"\n\n")
}

fn decode_frame(frame: &[u8]) -> Option<SseEvent> {
    let text = String::from_utf8_lossy(frame);
    let data: Vec<&str> = text
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .collect();
    if data.is_empty() {
        return None;
    }
    let payload = data.join("\n");
    if payload == "[DONE]" {
        return Some(SseEvent::Done);
    }
    match serde_json::from_str::<StreamChunk>(&payload) {
        Ok(chunk) => chunk
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.delta.content)
            .filter(|content| !content.is_empty())
            .map(SseEvent::Delta),
        Err(err) => {
            tracing::warn!(error = %err, "skipping malformed stream frame");
            None
        }
    }
}

/// Forward-only, lazily pulled sequence of reply text chunks.
///
/// Concatenating every chunk yields the full reply; consumers start from an
/// empty accumulator and must not assume chunk boundaries align with words.
pub struct ReplyStream {
    inner: BoxStream<'static, Result<String, ApiError>>,
}

impl ReplyStream {
    pub fn new(inner: BoxStream<'static, Result<String, ApiError>>) -> Self {
        Self { inner }
    }

    /// A stream yielding `text` as one chunk (used for cache hits).
    pub fn from_text(text: String) -> Self {
        Self::new(stream::once(async move { Ok(text) }).boxed())
    }

    pub async fn next_chunk(&mut self) -> Option<Result<String, ApiError>> {
        self.inner.next().await
    }

    /// Drain the stream, calling `on_chunk` for each delta, and return the
    /// assembled text.
    pub async fn collect_with<F>(mut self, mut on_chunk: F) -> Result<String, ApiError>
    where
        F: FnMut(&str),
    {
        let mut text = String::new();
        while let Some(chunk) = self.next_chunk().await {
            let chunk = chunk?;
            on_chunk(&chunk);
            text.push_str(&chunk);
        }
        Ok(text)
    }

    pub async fn collect_text(self) -> Result<String, ApiError> {
        self.collect_with(|_| {}).await
    }
}

impl Stream for ReplyStream {
    type Item = Result<String, ApiError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

/// Runs once when the stream ends: with the full text on success, or with
/// the error that cut it short.
pub(crate) type CompletionHook = Box<dyn FnOnce(Result<&str, &ApiError>) + Send>;

/// Pull state for turning a body byte stream into text chunks.
struct DecodeState {
    body: BoxStream<'static, Result<Vec<u8>, ApiError>>,
    decoder: SseDecoder,
    pending: VecDeque<String>,
    assembled: String,
    received: usize,
    limit: usize,
    finished: bool,
    on_complete: Option<CompletionHook>,
}

impl DecodeState {
    fn absorb(&mut self, events: Vec<SseEvent>) {
        for event in events {
            if self.finished {
                break;
            }
            match event {
                SseEvent::Delta(text) => {
                    self.assembled.push_str(&text);
                    self.pending.push_back(text);
                }
                SseEvent::Done => self.complete(),
            }
        }
    }

    fn complete(&mut self) {
        self.finished = true;
        if let Some(hook) = self.on_complete.take() {
            hook(Ok(&self.assembled));
        }
    }

    fn fail(&mut self, err: &ApiError) {
        self.finished = true;
        if let Some(hook) = self.on_complete.take() {
            hook(Err(err));
        }
    }
}

/// Decode an SSE body into a [`ReplyStream`].
///
/// `on_complete` runs once: with the full text if the stream reached its
/// terminator or a clean end of body, otherwise with the first error. A
/// stream dropped before either never calls it.
pub(crate) fn decode_sse_body(
    body: BoxStream<'static, Result<Vec<u8>, ApiError>>,
    max_bytes: usize,
    on_complete: Option<CompletionHook>,
) -> ReplyStream {
    let state = DecodeState {
        body,
        decoder: SseDecoder::default(),
        pending: VecDeque::new(),
        assembled: String::new(),
        received: 0,
        limit: max_bytes,
        finished: false,
        on_complete,
    };
    let chunks = stream::unfold(state, |mut state| async move {
        loop {
            if let Some(chunk) = state.pending.pop_front() {
                return Some((Ok(chunk), state));
            }
            if state.finished {
                return None;
            }
            match state.body.next().await {
                Some(Ok(bytes)) => {
                    state.received = state.received.saturating_add(bytes.len());
                    if state.received > state.limit {
                        let err = ApiError::ResponseTooLarge {
                            size: state.received,
                            limit: state.limit,
                        };
                        state.fail(&err);
                        return Some((Err(err), state));
                    }
                    let events = state.decoder.feed(&bytes);
                    state.absorb(events);
                }
                Some(Err(err)) => {
                    state.fail(&err);
                    return Some((Err(err), state));
                }
                None => {
                    let events = state.decoder.finish();
                    state.absorb(events);
                    if !state.finished {
                        state.complete();
                    }
                }
            }
        }
    });
    ReplyStream::new(chunks.boxed())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testsupport::{sse_delta_block, sse_done_block};
    use std::sync::{Arc, Mutex};

    fn body_from(parts: Vec<Vec<u8>>) -> BoxStream<'static, Result<Vec<u8>, ApiError>> {
        stream::iter(parts.into_iter().map(Ok)).boxed()
    }

    #[test]
    fn decoder_handles_frames_split_mid_token() {
        let wire = format!(
            "{}{}{}",
            sse_delta_block("Hel"),
            sse_delta_block("lo \u{1F642}"),
            sse_done_block()
        );
        let bytes = wire.as_bytes();
        let mut decoder = SseDecoder::default();
        let mut events = Vec::new();
        // Three-byte slices cut through JSON tokens and the emoji.
        for piece in bytes.chunks(3) {
            events.extend(decoder.feed(piece));
        }
        assert_eq!(
            events,
            vec![
                SseEvent::Delta("Hel".into()),
                SseEvent::Delta("lo \u{1F642}".into()),
                SseEvent::Done
            ]
        );
    }

    #[test]
    fn decoder_skips_malformed_and_empty_frames() {
        let mut decoder = SseDecoder::default();
        let events = decoder.feed(b"data: {not json\n\n: keep-alive\n\ndata: {\"choices\":[]}\n\n");
        assert!(events.is_empty());
    }

    #[test]
    fn decoder_accepts_crlf_framing() {
        let mut decoder = SseDecoder::default();
        let wire = sse_delta_block("x").replace('\n', "\r\n");
        assert_eq!(decoder.feed(wire.as_bytes()), vec![SseEvent::Delta("x".into())]);
    }

    #[tokio::test]
    async fn reply_stream_assembles_chunks_and_reports_completion() {
        let wire = format!(
            "{}{}{}",
            sse_delta_block("ls "),
            sse_delta_block("-la"),
            sse_done_block()
        );
        let parts = wire.as_bytes().chunks(7).map(<[u8]>::to_vec).collect();
        let seen = Arc::new(Mutex::new(None));
        let sink = seen.clone();
        let stream = decode_sse_body(
            body_from(parts),
            1024,
            Some(Box::new(move |done: Result<&str, &ApiError>| {
                *sink.lock().unwrap() = done.ok().map(str::to_string);
            })),
        );
        let mut deltas = Vec::new();
        let text = stream
            .collect_with(|chunk| deltas.push(chunk.to_string()))
            .await
            .unwrap();
        assert_eq!(text, "ls -la");
        assert_eq!(deltas, vec!["ls ", "-la"]);
        assert_eq!(seen.lock().unwrap().as_deref(), Some("ls -la"));
    }

    #[tokio::test]
    async fn oversized_stream_reports_the_failure_to_the_hook() {
        let wire = sse_delta_block(&"x".repeat(200));
        let seen = Arc::new(Mutex::new(None));
        let sink = seen.clone();
        let stream = decode_sse_body(
            body_from(vec![wire.into_bytes()]),
            64,
            Some(Box::new(move |done: Result<&str, &ApiError>| {
                *sink.lock().unwrap() = Some(done.map(str::to_string).map_err(ApiError::clone));
            })),
        );
        let err = stream.collect_text().await.unwrap_err();
        assert!(matches!(err, ApiError::ResponseTooLarge { limit: 64, .. }));
        let reported = seen.lock().unwrap().take().expect("hook ran");
        assert!(matches!(reported, Err(ApiError::ResponseTooLarge { limit: 64, .. })));
    }

    #[tokio::test]
    async fn from_text_yields_single_chunk() {
        let mut stream = ReplyStream::from_text("cached".into());
        assert_eq!(stream.next_chunk().await.unwrap().unwrap(), "cached");
        assert!(stream.next_chunk().await.is_none());
    }
}
