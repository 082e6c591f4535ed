//! Turn classifier.
//!
//! Asks the language model whether a message can be answered directly or
//! must go to the search upstream, and if so, how to phrase the query and
//! whether the user expects one organization or a list.

use std::fmt::Write as _;
use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, warn};

use orgscout_core::types::{OrgInfo, RoutingDecision};

use crate::error::ChatError;
use crate::llm::{strip_code_fences, LlmGateway};

/// Wire shape of the model's routing reply. Each route accepts only its
/// own fields.
#[derive(Debug, Deserialize)]
#[serde(tag = "route")]
enum ClassifierReply {
    #[serde(rename = "gemini", alias = "direct")]
    Direct(DirectReply),
    #[serde(rename = "sonar", alias = "search")]
    Search(SearchReply),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DirectReply {
    explanation: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SearchReply {
    enriched_query: String,
    expects_multiple: bool,
}

pub struct TurnClassifier {
    llm: Arc<dyn LlmGateway>,
}

impl TurnClassifier {
    pub fn new(llm: Arc<dyn LlmGateway>) -> Self {
        Self { llm }
    }

    /// Classify one message.
    ///
    /// `history` and `entities` are most-recent-first; the first entity is
    /// the implicit referent of pronouns and bare follow-ups. Either may be
    /// empty.
    pub async fn classify(
        &self,
        message: &str,
        history: &[String],
        entities: &[OrgInfo],
    ) -> Result<RoutingDecision, ChatError> {
        let prompt = build_prompt(message, history, entities);
        let reply = self.llm.complete(&prompt).await?;
        let decision = parse_reply(&reply).inspect_err(|e| {
            warn!(error = %e, reply = %reply, "Classifier reply rejected");
        })?;
        debug!(route = decision.route().as_str(), "Message classified");
        Ok(decision)
    }
}

/// Build the routing instruction.
pub fn build_prompt(message: &str, history: &[String], entities: &[OrgInfo]) -> String {
    let mut prompt = String::from(
        "You are a router in front of a web-search assistant that answers questions \
about organizations in Uzbekistan.\n\
\n\
Decide how the user's message must be handled:\n\
- Greetings, questions about what you can do, and anything unrelated to organizations \
in Uzbekistan are answered by you. Reply with \
{\"route\": \"gemini\", \"explanation\": \"<your answer to the user>\"}. \
When the message is off-topic, politely say that you only help with organizations in Uzbekistan.\n\
- Questions about organizations in Uzbekistan (names, addresses, contacts, rankings, \
size, type) go to search. Rewrite the message into a complete, self-contained search \
query and reply with \
{\"route\": \"sonar\", \"enriched_query\": \"<query>\", \"expects_multiple\": <true|false>}.\n\
\n\
expects_multiple is true when the question is about a category, a ranking, a list or a \
comparison of organizations, and false when it is about one specific organization.\n",
    );

    if let Some(referent) = entities.first() {
        let _ = write!(
            prompt,
            "\nIf the message is short or refers to something implicitly (\"it\", \"there\", \
\"address?\", \"phone number?\"), it is about \"{}\". Include that name in the enriched query.\n",
            referent.name
        );
    }

    if !history.is_empty() {
        prompt.push_str("\nPrevious questions in this conversation, newest first:\n");
        for query in history {
            let _ = writeln!(prompt, "- {}", query);
        }
    }

    if !entities.is_empty() {
        let known = serde_json::to_string(entities).unwrap_or_default();
        let _ = writeln!(
            prompt,
            "\nOrganizations already discussed, most recent first:\n{}",
            known
        );
    }

    let _ = write!(
        prompt,
        "\nUser message:\n{}\n\n\
Reply with a single JSON object and nothing else. Write the explanation and the \
enriched query in the language of the user's message.\n",
        message
    );
    prompt
}

/// Decode the model's reply into a [`RoutingDecision`].
pub fn parse_reply(raw: &str) -> Result<RoutingDecision, ChatError> {
    let clean = strip_code_fences(raw);
    let reply: ClassifierReply =
        serde_json::from_str(clean).map_err(|e| ChatError::MalformedReply(e.to_string()))?;

    match reply {
        ClassifierReply::Direct(DirectReply { explanation }) => {
            if explanation.trim().is_empty() {
                return Err(ChatError::MalformedReply("empty explanation".to_string()));
            }
            Ok(RoutingDecision::Direct {
                answer: explanation,
            })
        }
        ClassifierReply::Search(SearchReply {
            enriched_query,
            expects_multiple,
        }) => {
            if enriched_query.trim().is_empty() {
                return Err(ChatError::MalformedReply("empty enriched_query".to_string()));
            }
            Ok(RoutingDecision::Search {
                enriched_query,
                expects_multiple,
            })
        }
    }
}
