//! Chat orchestrator: runs one turn from inbound text to outbound frames.
//!
//! Wires the admission gate, memory, classifier, search upstream, evidence
//! resolver and persistence sink together. Persistence and memory updates
//! are detached so they never delay the next frame.

use std::sync::Arc;

use tracing::{debug, info, warn};

use orgscout_core::config::OrgscoutConfig;
use orgscout_core::types::{
    InboundFrame, OrgInfo, OutboundFrame, RoutingDecision, Turn, TurnContent,
};
use orgscout_storage::MemoryStore;

use crate::browser::BrowserCoordinates;
use crate::classifier::TurnClassifier;
use crate::entity::EntityExtractor;
use crate::error::ChatError;
use crate::evidence::EvidenceResolver;
use crate::gate::{AllowAll, Admission, TurnGate};
use crate::llm::LlmGateway;
use crate::search::SearchGateway;
use crate::session::FrameSink;
use crate::sink::TurnSink;
use crate::stream::EvidenceStreamConsumer;

/// Per-turn tunables.
#[derive(Clone, Debug)]
pub struct OrchestratorSettings {
    /// Prior queries handed to the classifier.
    pub history_turns: usize,
    /// Known organizations handed to the classifier.
    pub entity_turns: usize,
    pub max_message_chars: usize,
}

impl OrchestratorSettings {
    pub fn from_config(config: &OrgscoutConfig) -> Self {
        Self {
            history_turns: config.memory.history_turns,
            entity_turns: config.memory.entity_turns,
            max_message_chars: config.limits.max_message_chars,
        }
    }
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self::from_config(&OrgscoutConfig::default())
    }
}

/// Shared across every connection; holds no per-conversation state itself.
pub struct ChatOrchestrator {
    classifier: TurnClassifier,
    search: Arc<dyn SearchGateway>,
    resolver: EvidenceResolver,
    extractor: Arc<EntityExtractor>,
    memory: Arc<MemoryStore>,
    sink: Arc<dyn TurnSink>,
    gate: Arc<dyn TurnGate>,
    settings: OrchestratorSettings,
}

impl ChatOrchestrator {
    pub fn new(
        llm: Arc<dyn LlmGateway>,
        search: Arc<dyn SearchGateway>,
        memory: Arc<MemoryStore>,
        sink: Arc<dyn TurnSink>,
    ) -> Self {
        Self {
            classifier: TurnClassifier::new(Arc::clone(&llm)),
            search,
            resolver: EvidenceResolver::new(),
            extractor: Arc::new(EntityExtractor::new(llm)),
            memory,
            sink,
            gate: Arc::new(AllowAll),
            settings: OrchestratorSettings::default(),
        }
    }

    pub fn with_gate(mut self, gate: Arc<dyn TurnGate>) -> Self {
        self.gate = gate;
        self
    }

    pub fn with_browser(mut self, browser: Arc<dyn BrowserCoordinates>) -> Self {
        self.resolver = EvidenceResolver::with_browser(browser);
        self
    }

    pub fn with_settings(mut self, settings: OrchestratorSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Handle one inbound text frame.
    ///
    /// Unparseable frames are logged and ignored. Turn failures are written
    /// to the client as a single error frame. Only a failed write is
    /// returned, and it means the connection is gone.
    pub async fn handle_text(
        &self,
        conversation_id: &str,
        raw: &str,
        out: &mut dyn FrameSink,
    ) -> Result<(), ChatError> {
        let frame: InboundFrame = match serde_json::from_str(raw) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(conversation_id, error = %e, "Ignoring malformed inbound frame");
                return Ok(());
            }
        };

        match self.run_turn(conversation_id, &frame.message, out).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_transport() => Err(e),
            Err(e) => {
                warn!(conversation_id, error = %e, "Turn failed");
                out.send(&OutboundFrame::error(e.to_string())).await
            }
        }
    }

    async fn run_turn(
        &self,
        conversation_id: &str,
        message: &str,
        out: &mut dyn FrameSink,
    ) -> Result<(), ChatError> {
        self.validate(message)?;

        if let Admission::Refused(reason) = self.gate.admit(conversation_id).await? {
            return out.send(&OutboundFrame::warning(reason)).await;
        }

        let history = self
            .memory
            .recent_queries(conversation_id, self.settings.history_turns)
            .unwrap_or_else(|e| {
                warn!(conversation_id, error = %e, "Query memory unavailable");
                Vec::new()
            });
        let entities = self
            .memory
            .recent_entities(conversation_id, self.settings.entity_turns)
            .unwrap_or_else(|e| {
                warn!(conversation_id, error = %e, "Entity memory unavailable");
                Vec::new()
            });

        let decision = self.classifier.classify(message, &history, &entities).await?;
        info!(conversation_id, route = decision.route().as_str(), "Turn routed");

        let mut turn = Turn::new(conversation_id, message);
        match &decision {
            RoutingDecision::Direct { answer } => {
                out.send(&OutboundFrame::Content {
                    content: TurnContent::text_only(answer.clone()),
                })
                .await?;
                out.send(&OutboundFrame::end()).await?;
                turn.answer = answer.clone();
            }
            RoutingDecision::Search {
                enriched_query,
                expects_multiple: true,
            } => {
                turn.enriched_query = enriched_query.clone();
                self.answer_listing(&mut turn, out).await?;
            }
            RoutingDecision::Search {
                enriched_query,
                expects_multiple: false,
            } => {
                turn.enriched_query = enriched_query.clone();
                self.answer_streamed(&mut turn, out).await?;
            }
        }

        self.remember(conversation_id, decision.memory_text(message));
        self.persist(turn);
        Ok(())
    }

    fn validate(&self, message: &str) -> Result<(), ChatError> {
        if message.trim().is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        let max = self.settings.max_message_chars;
        if max > 0 && message.chars().count() > max {
            return Err(ChatError::MessageTooLong(max));
        }
        Ok(())
    }

    /// Structured multi-organization path.
    async fn answer_listing(&self, turn: &mut Turn, out: &mut dyn FrameSink) -> Result<(), ChatError> {
        let listing = self.search.search_organizations(&turn.enriched_query).await?;
        debug!(
            conversation_id = %turn.conversation_id,
            organizations = listing.data.len(),
            citations = listing.citations.len(),
            "Listing received"
        );

        out.send(&OutboundFrame::Listing {
            response: listing.clone(),
        })
        .await?;
        out.send(&OutboundFrame::end()).await?;

        turn.answer = listing
            .data
            .iter()
            .map(|org| org.name.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        turn.citations = listing.citations;

        self.remember_entities(&turn.conversation_id, listing.data.clone());
        turn.organizations = Some(listing.data);
        Ok(())
    }

    /// Streamed single-organization path.
    async fn answer_streamed(&self, turn: &mut Turn, out: &mut dyn FrameSink) -> Result<(), ChatError> {
        let body = self.search.open_stream(&turn.enriched_query).await?;
        let mut consumer = EvidenceStreamConsumer::new(body);
        while let Some(chunk) = consumer.next_chunk().await? {
            if let Some(text) = chunk.text {
                out.send(&OutboundFrame::delta(text)).await?;
            }
        }
        let outcome = consumer.finish();
        let evidence = self.resolver.resolve(&outcome.citations).await;

        out.send(&OutboundFrame::Data {
            data: TurnContent {
                text: outcome.text.clone(),
                citations: Some(outcome.citations.clone()),
                location: evidence.locations.clone(),
                images_url: evidence.images.clone(),
                organizations: None,
            },
        })
        .await?;
        out.send(&OutboundFrame::end()).await?;

        self.extract_entity(&turn.conversation_id, &outcome.text);
        turn.answer = outcome.text;
        turn.citations = outcome.citations;
        turn.locations = evidence.locations;
        turn.images = evidence.images;
        Ok(())
    }

    // =========================================================================
    // Detached side effects
    // =========================================================================

    fn persist(&self, turn: Turn) {
        let sink = Arc::clone(&self.sink);
        tokio::spawn(async move {
            let id = turn.id;
            if let Err(e) = sink.persist(turn).await {
                warn!(turn_id = %id, error = %e, "Failed to persist turn");
            }
        });
    }

    fn remember(&self, conversation_id: &str, text: &str) {
        let memory = Arc::clone(&self.memory);
        let conversation = conversation_id.to_string();
        let text = text.to_string();
        tokio::spawn(async move {
            if let Err(e) = memory.append_query(&conversation, &text) {
                warn!(conversation_id = %conversation, error = %e, "Failed to remember query");
            }
        });
    }

    fn remember_entities(&self, conversation_id: &str, orgs: Vec<OrgInfo>) {
        let memory = Arc::clone(&self.memory);
        let conversation = conversation_id.to_string();
        tokio::spawn(async move {
            // Oldest-last, so the first listed organization becomes the most
            // recent entity.
            for org in orgs.into_iter().rev() {
                if let Err(e) = memory.append_entity(&conversation, org) {
                    warn!(conversation_id = %conversation, error = %e, "Failed to remember organization");
                    return;
                }
            }
        });
    }

    fn extract_entity(&self, conversation_id: &str, answer: &str) {
        let extractor = Arc::clone(&self.extractor);
        let memory = Arc::clone(&self.memory);
        let conversation = conversation_id.to_string();
        let answer = answer.to_string();
        tokio::spawn(async move {
            let Some(org) = extractor.extract(&answer).await else {
                return;
            };
            if let Err(e) = memory.append_entity(&conversation, org) {
                warn!(conversation_id = %conversation, error = %e, "Failed to remember organization");
            }
        });
    }
}
