//! Framing for newline-delimited JSON response bodies.
//!
//! Only decodes bytes into records. Requests, auth, and retries belong to the
//! caller.

use std::collections::VecDeque;
use std::fmt::Display;
use std::pin::Pin;

use futures::StreamExt as _;
use futures::stream;
use tracing::warn;

use crate::errors::StreamError;
use crate::event::StreamEvent;
use crate::normalize::normalize;

/// Incremental splitter of a chunked body into JSON records, one per line.
///
/// Lines that are blank, SSE comments, or not valid JSON are skipped.
#[derive(Default)]
pub struct LineDecoder {
    buf: Vec<u8>,
    skipped: u64,
}

impl LineDecoder {
    /// Appends a chunk and returns every record completed by it.
    pub fn push_chunk(&mut self, chunk: &[u8]) -> Vec<serde_json::Value> {
        self.buf.extend_from_slice(chunk);
        let mut records = Vec::new();
        while let Some(idx) = self.buf.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=idx).collect();
            if let Some(record) = self.parse_line(&line[..idx]) {
                records.push(record);
            }
        }
        records
    }

    /// Flushes a trailing line that was never terminated.
    pub fn finish(&mut self) -> Option<serde_json::Value> {
        let rest = std::mem::take(&mut self.buf);
        self.parse_line(&rest)
    }

    /// Number of non-empty lines dropped because they were not JSON.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    fn parse_line(&mut self, bytes: &[u8]) -> Option<serde_json::Value> {
        let text = String::from_utf8_lossy(bytes);
        let line = text.trim_end_matches('\r').trim();
        if line.is_empty() || line.starts_with(':') {
            return None;
        }
        let payload = line.strip_prefix("data:").map(str::trim_start).unwrap_or(line);
        if payload == "[DONE]" {
            return None;
        }
        match serde_json::from_str(payload) {
            Ok(value) => Some(value),
            Err(e) => {
                self.skipped += 1;
                warn!(error = %e, len = payload.len(), "skipping undecodable stream line");
                None
            }
        }
    }
}

type ByteStream<E> = Pin<Box<dyn futures::Stream<Item = Result<bytes::Bytes, E>> + Send + 'static>>;

/// Adapts a chunked byte body into normalized events.
///
/// A failing chunk ends the stream with `StreamError::Transport`.
pub fn ndjson_events<S, E>(
    bytes_stream: S,
) -> impl futures::Stream<Item = Result<StreamEvent, StreamError>> + Send
where
    S: futures::Stream<Item = Result<bytes::Bytes, E>> + Send + 'static,
    E: Display + Send + 'static,
{
    struct State<E> {
        bytes_stream: ByteStream<E>,
        decoder: LineDecoder,
        pending: VecDeque<StreamEvent>,
        done: bool,
    }

    stream::try_unfold(
        State {
            bytes_stream: Box::pin(bytes_stream),
            decoder: LineDecoder::default(),
            pending: VecDeque::new(),
            done: false,
        },
        |mut state| async move {
            loop {
                if let Some(event) = state.pending.pop_front() {
                    return Ok(Some((event, state)));
                }
                if state.done {
                    return Ok(None);
                }

                match state.bytes_stream.next().await {
                    Some(Ok(chunk)) => {
                        for record in state.decoder.push_chunk(&chunk) {
                            state.pending.push_back(normalize(&record));
                        }
                    }
                    Some(Err(e)) => {
                        return Err(StreamError::transport(format!(
                            "stream body read failed: {e}"
                        )));
                    }
                    None => {
                        if let Some(record) = state.decoder.finish() {
                            state.pending.push_back(normalize(&record));
                        }
                        state.done = true;
                    }
                }
            }
        },
    )
}

/// Adapts a streaming HTTP response body into normalized events.
pub fn response_events(
    response: reqwest::Response,
) -> impl futures::Stream<Item = Result<StreamEvent, StreamError>> + Send {
    ndjson_events(response.bytes_stream())
}
