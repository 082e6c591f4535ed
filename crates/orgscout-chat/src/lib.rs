//! Turn orchestration for Orgscout.
//!
//! Classifies each inbound message, answers it directly or through the
//! search upstream, resolves evidence from citations, and hands the
//! finished turn to persistence and short-term memory.

pub mod browser;
pub mod classifier;
pub mod entity;
pub mod error;
pub mod evidence;
pub mod gate;
pub mod llm;
pub mod orchestrator;
pub mod search;
pub mod session;
pub mod sink;
pub mod stream;

#[cfg(test)]
mod testing;

pub use browser::{BrowserCoordinates, BrowserError, WebDriverResolver};
pub use classifier::TurnClassifier;
pub use entity::EntityExtractor;
pub use error::ChatError;
pub use evidence::{Evidence, EvidenceResolver};
pub use gate::{Admission, AllowAll, TurnGate, TurnLimitGate};
pub use llm::{GeminiGateway, LlmGateway};
pub use orchestrator::{ChatOrchestrator, OrchestratorSettings};
pub use search::{PerplexityGateway, SearchGateway, UpstreamBody};
pub use session::{run_session, FrameSink};
pub use sink::{SqliteTurnSink, TurnSink};
pub use stream::{EvidenceStreamConsumer, StreamChunk, StreamOutcome};
