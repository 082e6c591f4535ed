//! In-test fakes for the upstream gateways and the client connection.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{stream, StreamExt};

use orgscout_core::types::{OrgListing, OutboundFrame, Turn};

use crate::error::ChatError;
use crate::llm::LlmGateway;
use crate::search::{SearchGateway, UpstreamBody};
use crate::session::FrameSink;
use crate::sink::TurnSink;

/// Language model answering routing prompts with one canned reply and
/// extraction prompts with another.
pub struct FakeLlm {
    routing: String,
    extraction: Option<String>,
    prompts: Mutex<Vec<String>>,
}

impl FakeLlm {
    pub fn routing(reply: &str) -> Self {
        Self {
            routing: reply.to_string(),
            extraction: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn with_extraction(mut self, reply: &str) -> Self {
        self.extraction = Some(reply.to_string());
        self
    }

    /// Routing prompts received so far.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmGateway for FakeLlm {
    async fn complete(&self, prompt: &str) -> Result<String, ChatError> {
        if prompt.starts_with("Convert the following") {
            return self
                .extraction
                .clone()
                .ok_or_else(|| ChatError::Classifier("no extraction reply".to_string()));
        }
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok(self.routing.clone())
    }
}

/// Search upstream replaying a fixed event stream or listing.
#[derive(Default)]
pub struct FakeSearch {
    events: Option<Vec<&'static str>>,
    listing: Option<OrgListing>,
    stream_queries: Mutex<Vec<String>>,
    listing_calls: AtomicUsize,
}

impl FakeSearch {
    pub fn with_events(events: Vec<&'static str>) -> Self {
        Self {
            events: Some(events),
            ..Self::default()
        }
    }

    pub fn with_listing(listing: OrgListing) -> Self {
        Self {
            listing: Some(listing),
            ..Self::default()
        }
    }

    pub fn stream_calls(&self) -> usize {
        self.stream_queries.lock().unwrap().len()
    }

    pub fn stream_queries(&self) -> Vec<String> {
        self.stream_queries.lock().unwrap().clone()
    }

    pub fn listing_calls(&self) -> usize {
        self.listing_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SearchGateway for FakeSearch {
    async fn open_stream(&self, query: &str) -> Result<UpstreamBody, ChatError> {
        self.stream_queries.lock().unwrap().push(query.to_string());
        let events = self
            .events
            .clone()
            .ok_or_else(|| ChatError::Search("no stream configured".to_string()))?;
        let chunks: Vec<Result<Bytes, ChatError>> = events
            .into_iter()
            .map(|e| Ok(Bytes::from_static(e.as_bytes())))
            .collect();
        Ok(UpstreamBody::EventStream(stream::iter(chunks).boxed()))
    }

    async fn search_organizations(&self, _query: &str) -> Result<OrgListing, ChatError> {
        self.listing_calls.fetch_add(1, Ordering::SeqCst);
        self.listing
            .clone()
            .ok_or_else(|| ChatError::Search("no listing configured".to_string()))
    }
}

#[derive(Default)]
pub struct RecordingSink {
    turns: Mutex<Vec<Turn>>,
}

impl RecordingSink {
    pub fn turns(&self) -> Vec<Turn> {
        self.turns.lock().unwrap().clone()
    }
}

#[async_trait]
impl TurnSink for RecordingSink {
    async fn persist(&self, turn: Turn) -> Result<(), ChatError> {
        self.turns.lock().unwrap().push(turn);
        Ok(())
    }
}

/// Client connection collecting frames, or failing every write.
#[derive(Default)]
pub struct VecFrames {
    pub frames: Vec<OutboundFrame>,
    pub attempts: usize,
    fail: bool,
}

impl VecFrames {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }
}

#[async_trait]
impl FrameSink for VecFrames {
    async fn send(&mut self, frame: &OutboundFrame) -> Result<(), ChatError> {
        self.attempts += 1;
        if self.fail {
            return Err(ChatError::Transport("connection closed".to_string()));
        }
        self.frames.push(frame.clone());
        Ok(())
    }
}

/// Poll `probe` until it yields a value; detached tasks finish shortly
/// after the turn that spawned them.
pub async fn wait_for<T>(mut probe: impl FnMut() -> Option<T>) -> T {
    for _ in 0..200 {
        if let Some(value) = probe() {
            return value;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached within 2s");
}
