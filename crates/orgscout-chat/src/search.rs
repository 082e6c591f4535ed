//! Search-augmented upstream gateway.
//!
//! Two request shapes share one system instruction and search options: a
//! streamed single-organization answer, and a structured listing of many
//! organizations decoded against a JSON schema.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde_json::{json, Value};
use tracing::{debug, info};

use orgscout_core::config::SearchConfig;
use orgscout_core::types::{OrgInfo, OrgListing};

use crate::error::ChatError;
use crate::llm::strip_code_fences;
use crate::stream::CitationSet;

/// Raw response body chunks of a streamed search call.
pub type ByteStream = BoxStream<'static, Result<Bytes, ChatError>>;

/// Body of a search call that asked for an event stream.
pub enum UpstreamBody {
    /// The upstream honored `Accept: text/event-stream`.
    EventStream(ByteStream),
    /// The upstream answered with a single JSON completion instead.
    Json(Bytes),
}

impl std::fmt::Debug for UpstreamBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UpstreamBody::EventStream(_) => f.write_str("EventStream(..)"),
            UpstreamBody::Json(b) => write!(f, "Json({} bytes)", b.len()),
        }
    }
}

#[async_trait]
pub trait SearchGateway: Send + Sync {
    /// Start a streamed answer about a single organization.
    async fn open_stream(&self, query: &str) -> Result<UpstreamBody, ChatError>;

    /// Fetch a structured list of organizations matching the query.
    async fn search_organizations(&self, query: &str) -> Result<OrgListing, ChatError>;
}

const SYSTEM_INSTRUCTION: &str = "\
Answer questions about organizations located in Uzbekistan using only reliable, verifiable \
sources such as official registries, reputable news outlets and recognized business \
directories. Cite every source you use. Do not guess or invent details; if no reliable \
source is found, answer exactly: \"No reliable information available.\" Only describe \
organizations physically located in Uzbekistan, stay on the user's request, and keep a \
neutral tone. Answer in the language of the question.";

/// Chat-completions client for the Perplexity API.
pub struct PerplexityGateway {
    client: reqwest::Client,
    config: SearchConfig,
}

impl PerplexityGateway {
    pub fn new(config: &SearchConfig) -> Result<Self, ChatError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(15))
            .user_agent(format!("orgscout/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ChatError::Search(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    async fn post(&self, payload: &Value, accept: &str) -> Result<reqwest::Response, ChatError> {
        let response = self
            .client
            .post(&self.config.endpoint)
            .bearer_auth(&self.config.api_key)
            .header(ACCEPT, accept)
            .json(payload)
            .send()
            .await
            .map_err(|e| ChatError::Search(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ChatError::Search(format!(
                "upstream returned {}: {}",
                status.as_u16(),
                text
            )));
        }
        Ok(response)
    }
}

#[async_trait]
impl SearchGateway for PerplexityGateway {
    async fn open_stream(&self, query: &str) -> Result<UpstreamBody, ChatError> {
        let payload = stream_payload(&self.config, query);
        let response = self.post(&payload, "text/event-stream").await?;

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();

        if content_type.starts_with("text/event-stream") {
            debug!("Search upstream opened an event stream");
            let stream = response
                .bytes_stream()
                .map_err(|e| ChatError::SearchStream(e.to_string()))
                .boxed();
            Ok(UpstreamBody::EventStream(stream))
        } else {
            info!(content_type = %content_type, "Search upstream did not stream, reading whole body");
            let body = response
                .bytes()
                .await
                .map_err(|e| ChatError::Search(e.to_string()))?;
            Ok(UpstreamBody::Json(body))
        }
    }

    async fn search_organizations(&self, query: &str) -> Result<OrgListing, ChatError> {
        let payload = listing_payload(&self.config, query);
        let response = self.post(&payload, "application/json").await?;
        let body: Value = response
            .json()
            .await
            .map_err(|e| ChatError::Search(e.to_string()))?;
        parse_listing(&body)
    }
}

// =============================================================================
// Request payloads
// =============================================================================

fn base_payload(config: &SearchConfig, query: &str, context_size: &str) -> Value {
    json!({
        "model": config.model,
        "messages": [
            { "role": "system", "content": SYSTEM_INSTRUCTION },
            { "role": "user", "content": query }
        ],
        "web_search_options": {
            "user_location": { "country": config.country },
            "search_context_size": context_size,
            "search_domain_filter": config.search_domain_filter,
        }
    })
}

/// Payload for the streamed single-organization path.
pub fn stream_payload(config: &SearchConfig, query: &str) -> Value {
    let mut payload = base_payload(config, query, &config.stream_context_size);
    payload["stream"] = Value::Bool(true);
    payload
}

/// Payload for the structured multi-organization path.
pub fn listing_payload(config: &SearchConfig, query: &str) -> Value {
    let mut payload = base_payload(config, query, &config.listing_context_size);
    payload["stream"] = Value::Bool(false);
    payload["response_format"] = json!({
        "type": "json_schema",
        "json_schema": { "schema": org_list_schema() }
    });
    payload
}

fn org_list_schema() -> Value {
    let string = json!({ "type": "string" });
    let string_array = json!({ "type": "array", "items": { "type": "string" } });
    json!({
        "type": "array",
        "items": {
            "type": "object",
            "properties": {
                "name": string,
                "address": string,
                "location": {
                    "type": "object",
                    "properties": {
                        "latitude": { "type": "number" },
                        "longitude": { "type": "number" }
                    },
                    "required": ["latitude", "longitude"]
                },
                "phone": string,
                "email": string,
                "description": string,
                "website": string,
                "sources": string_array,
                "images_url": string_array
            },
            "required": ["name", "address"]
        }
    })
}

// =============================================================================
// Response decoding
// =============================================================================

/// Decode a structured listing completion.
pub fn parse_listing(body: &Value) -> Result<OrgListing, ChatError> {
    let content = body
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .ok_or_else(|| ChatError::Search("completion has no message content".to_string()))?;

    let data: Vec<OrgInfo> = serde_json::from_str(strip_code_fences(content))
        .map_err(|e| ChatError::Search(format!("failed to parse structured content: {}", e)))?;

    let mut citations = CitationSet::default();
    citations.absorb(body);

    Ok(OrgListing {
        citations: citations.into_vec(),
        data,
    })
}
