//! Generative-language gateway used for routing and entity extraction.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use orgscout_core::config::LlmConfig;

use crate::error::ChatError;

/// A single-prompt, single-reply text model.
#[async_trait]
pub trait LlmGateway: Send + Sync {
    /// Send one prompt and return the model's full textual reply.
    async fn complete(&self, prompt: &str) -> Result<String, ChatError>;
}

/// `generateContent` client for the Gemini API.
pub struct GeminiGateway {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
}

impl GeminiGateway {
    pub fn new(config: &LlmConfig) -> Result<Self, ChatError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .user_agent(format!("orgscout/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ChatError::Classifier(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
        })
    }

    fn url(&self) -> String {
        format!("{}/models/{}:generateContent", self.endpoint, self.model)
    }
}

#[async_trait]
impl LlmGateway for GeminiGateway {
    async fn complete(&self, prompt: &str) -> Result<String, ChatError> {
        let body = json!({
            "contents": [{
                "role": "user",
                "parts": [{ "text": prompt }]
            }]
        });

        let response = self
            .client
            .post(self.url())
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|e| ChatError::Classifier(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ChatError::Classifier(format!(
                "model returned {}: {}",
                status.as_u16(),
                text
            )));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| ChatError::Classifier(e.to_string()))?;
        let text = candidate_text(&payload);
        debug!(model = %self.model, chars = text.len(), "Model reply received");
        if text.trim().is_empty() {
            return Err(ChatError::Classifier("model returned no text".to_string()));
        }
        Ok(text)
    }
}

/// Concatenate every text part of every candidate.
fn candidate_text(payload: &Value) -> String {
    let mut out = String::new();
    let candidates = payload
        .get("candidates")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    for candidate in candidates {
        let parts = candidate
            .pointer("/content/parts")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        for part in parts {
            if let Some(text) = part.get("text").and_then(Value::as_str) {
                out.push_str(text);
            }
        }
    }
    out
}

/// Strip optional markdown code fences and a leading `json` tag from a
/// model reply that is supposed to be bare JSON.
pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim().trim_matches(|c: char| c == '`' || c.is_whitespace());
    let without_tag = trimmed
        .strip_prefix("json")
        .or_else(|| trimmed.strip_prefix("JSON"))
        .unwrap_or(trimmed);
    without_tag.trim()
}
