//! Evidence stream consumer.
//!
//! Reads a search upstream's server-sent-event body line by line, forwards
//! text deltas as they arrive, and accumulates a deduplicated, first-seen
//! ordered list of citation URLs. A plain JSON body is accepted as a
//! single-shot fallback with the same extraction rules.

use std::collections::{HashSet, VecDeque};

use futures::StreamExt;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::ChatError;
use crate::search::{ByteStream, UpstreamBody};

/// Longest event line accepted before the stream is abandoned.
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

/// One incremental piece of a streamed answer.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StreamChunk {
    /// Text fragment to forward as-is.
    pub text: Option<String>,
    /// Citation URLs first seen in this frame.
    pub new_citations: Vec<String>,
}

/// Everything a finished stream produced.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StreamOutcome {
    pub text: String,
    pub citations: Vec<String>,
}

/// Insertion-ordered set of citation URLs.
#[derive(Debug, Default)]
pub struct CitationSet {
    seen: HashSet<String>,
    ordered: Vec<String>,
}

impl CitationSet {
    /// Add a URL; returns `false` for empty or already-seen URLs.
    pub fn insert(&mut self, url: &str) -> bool {
        if url.is_empty() || self.seen.contains(url) {
            return false;
        }
        self.seen.insert(url.to_string());
        self.ordered.push(url.to_string());
        true
    }

    /// Merge `citations[]` and `search_results[].url` of one completion
    /// frame, returning the URLs that were new.
    pub fn absorb(&mut self, frame: &Value) -> Vec<String> {
        let mut fresh = Vec::new();
        let citations = frame.get("citations").and_then(Value::as_array);
        for url in citations.into_iter().flatten().filter_map(Value::as_str) {
            if self.insert(url) {
                fresh.push(url.to_string());
            }
        }
        let results = frame.get("search_results").and_then(Value::as_array);
        for url in results
            .into_iter()
            .flatten()
            .filter_map(|r| r.get("url").and_then(Value::as_str))
        {
            if self.insert(url) {
                fresh.push(url.to_string());
            }
        }
        fresh
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    pub fn into_vec(self) -> Vec<String> {
        self.ordered
    }
}

enum Source {
    Events(ByteStream),
    Json(Option<bytes::Bytes>),
}

enum Line {
    Continue,
    Done,
}

/// Pull-based reader over one upstream search body.
///
/// Call [`next_chunk`](Self::next_chunk) until it yields `None`, then
/// [`finish`](Self::finish) to take the aggregate.
pub struct EvidenceStreamConsumer {
    source: Source,
    buffer: Vec<u8>,
    pending: VecDeque<StreamChunk>,
    text: String,
    citations: CitationSet,
    done: bool,
}

impl EvidenceStreamConsumer {
    pub fn new(body: UpstreamBody) -> Self {
        let source = match body {
            UpstreamBody::EventStream(stream) => Source::Events(stream),
            UpstreamBody::Json(bytes) => Source::Json(Some(bytes)),
        };
        Self {
            source,
            buffer: Vec::new(),
            pending: VecDeque::new(),
            text: String::new(),
            citations: CitationSet::default(),
            done: false,
        }
    }

    /// Next chunk carrying text or new citations, `None` once the upstream
    /// signalled completion or closed the body.
    ///
    /// An error frame from the upstream, a body read failure, or an
    /// unparseable JSON fallback body is terminal.
    pub async fn next_chunk(&mut self) -> Result<Option<StreamChunk>, ChatError> {
        loop {
            if let Some(chunk) = self.pending.pop_front() {
                return Ok(Some(chunk));
            }
            if self.done {
                return Ok(None);
            }

            match &mut self.source {
                Source::Json(body) => {
                    self.done = true;
                    if let Some(bytes) = body.take() {
                        let frame: Value = serde_json::from_slice(&bytes).map_err(|e| {
                            ChatError::SearchStream(format!("non-stream body is not JSON: {}", e))
                        })?;
                        self.apply_frame(&frame, false)?;
                    }
                }
                Source::Events(stream) => {
                    if let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
                        let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
                        let line = String::from_utf8_lossy(&raw).into_owned();
                        if let Line::Done = self.process_line(&line)? {
                            self.done = true;
                        }
                        continue;
                    }
                    if self.buffer.len() > MAX_LINE_BYTES {
                        self.done = true;
                        return Err(ChatError::SearchStream(format!(
                            "event line exceeds {} bytes",
                            MAX_LINE_BYTES
                        )));
                    }
                    match stream.next().await {
                        Some(Ok(bytes)) => self.buffer.extend_from_slice(&bytes),
                        Some(Err(e)) => {
                            self.done = true;
                            return Err(e);
                        }
                        None => {
                            self.done = true;
                            if !self.buffer.is_empty() {
                                let raw = std::mem::take(&mut self.buffer);
                                let line = String::from_utf8_lossy(&raw).into_owned();
                                self.process_line(&line)?;
                            }
                        }
                    }
                }
            }
        }
    }

    /// Consume the reader and return the accumulated answer.
    pub fn finish(self) -> StreamOutcome {
        debug!(
            chars = self.text.len(),
            citations = self.citations.len(),
            "Evidence stream finished"
        );
        StreamOutcome {
            text: self.text,
            citations: self.citations.into_vec(),
        }
    }

    fn process_line(&mut self, line: &str) -> Result<Line, ChatError> {
        let line = line.trim_end_matches(['\r', '\n']).trim();
        if line.is_empty() || line.starts_with(':') {
            return Ok(Line::Continue);
        }
        let Some(data) = line.strip_prefix("data:") else {
            return Ok(Line::Continue);
        };
        let data = data.trim();
        if data == "[DONE]" {
            return Ok(Line::Done);
        }
        match serde_json::from_str::<Value>(data) {
            Ok(frame) => {
                self.apply_frame(&frame, true)?;
            }
            Err(e) => {
                warn!(error = %e, "Skipping unparseable event-stream frame");
            }
        }
        Ok(Line::Continue)
    }

    fn apply_frame(&mut self, frame: &Value, streaming: bool) -> Result<(), ChatError> {
        if let Some(err) = frame.get("error").filter(|v| !v.is_null()) {
            let message = err
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| err.to_string());
            return Err(ChatError::SearchStream(message));
        }

        let new_citations = self.citations.absorb(frame);

        let mut delta = String::new();
        let choices = frame.get("choices").and_then(Value::as_array);
        if streaming {
            for choice in choices.into_iter().flatten() {
                if let Some(s) = choice.pointer("/delta/content").and_then(Value::as_str) {
                    delta.push_str(s);
                }
            }
        } else if let Some(s) = choices
            .and_then(|c| c.first())
            .and_then(|c| c.pointer("/message/content"))
            .and_then(Value::as_str)
        {
            delta.push_str(s);
        }

        self.text.push_str(&delta);
        if !delta.is_empty() || !new_citations.is_empty() {
            self.pending.push_back(StreamChunk {
                text: (!delta.is_empty()).then_some(delta),
                new_citations,
            });
        }
        Ok(())
    }
}
