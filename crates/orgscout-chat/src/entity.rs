//! Organization extraction from streamed answers.
//!
//! The extracted record becomes the newest entry in the conversation's
//! entity memory, which the classifier uses as the referent for
//! follow-up questions.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use orgscout_core::types::OrgInfo;

use crate::llm::{strip_code_fences, LlmGateway};

/// Answer the search upstream gives when it found nothing usable.
const NO_INFORMATION: &str = "No reliable information available.";

pub struct EntityExtractor {
    llm: Arc<dyn LlmGateway>,
}

impl EntityExtractor {
    pub fn new(llm: Arc<dyn LlmGateway>) -> Self {
        Self { llm }
    }

    /// Convert a free-text answer about one organization into an
    /// [`OrgInfo`]. Best-effort: every failure yields `None`.
    pub async fn extract(&self, answer: &str) -> Option<OrgInfo> {
        let answer = answer.trim();
        if answer.is_empty() || answer.contains(NO_INFORMATION) {
            return None;
        }

        let reply = match self.llm.complete(&build_prompt(answer)).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = %e, "Entity extraction call failed");
                return None;
            }
        };

        let org = parse_entity(&reply);
        match &org {
            Some(o) => debug!(name = %o.name, "Organization extracted"),
            None => debug!("Extraction reply held no organization"),
        }
        org
    }
}

fn build_prompt(answer: &str) -> String {
    format!(
        "Convert the following answer about one organization into a single JSON object \
with these fields: name (string), address (string), location ({{\"latitude\": number, \
\"longitude\": number}}), phone, email, description, website (strings), sources and \
images_url (arrays of strings). Omit fields the answer does not mention. Do not invent \
data. Reply with the JSON object only, without markdown.\n\nAnswer:\n{}\n",
        answer
    )
}

/// Decode an extraction reply. A top-level array is accepted and its
/// first element used.
pub fn parse_entity(raw: &str) -> Option<OrgInfo> {
    let value: Value = serde_json::from_str(strip_code_fences(raw)).ok()?;
    let object = match value {
        Value::Array(items) => items.into_iter().next()?,
        other => other,
    };
    let org: OrgInfo = serde_json::from_value(object).ok()?;
    if org.name.trim().is_empty() {
        return None;
    }
    Some(org)
}
