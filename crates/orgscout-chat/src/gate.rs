//! Turn admission.
//!
//! A gate runs before classification and may refuse a turn with a warning
//! that is shown to the user as-is.

use async_trait::async_trait;
use tracing::{debug, warn};

use orgscout_storage::TurnRepository;

use crate::error::ChatError;

/// Outcome of an admission check.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Admission {
    Allowed,
    /// Refused; the string is the user-visible warning.
    Refused(String),
}

#[async_trait]
pub trait TurnGate: Send + Sync {
    async fn admit(&self, conversation_id: &str) -> Result<Admission, ChatError>;
}

/// Gate that admits every turn.
pub struct AllowAll;

#[async_trait]
impl TurnGate for AllowAll {
    async fn admit(&self, _conversation_id: &str) -> Result<Admission, ChatError> {
        Ok(Admission::Allowed)
    }
}

/// Refuses turns once a conversation has `max_turns` persisted turns.
/// A limit of zero disables the check.
pub struct TurnLimitGate {
    repo: TurnRepository,
    max_turns: u64,
}

impl TurnLimitGate {
    pub fn new(repo: TurnRepository, max_turns: u64) -> Self {
        Self { repo, max_turns }
    }
}

#[async_trait]
impl TurnGate for TurnLimitGate {
    async fn admit(&self, conversation_id: &str) -> Result<Admission, ChatError> {
        if self.max_turns == 0 {
            return Ok(Admission::Allowed);
        }

        let repo = self.repo.clone();
        let conversation = conversation_id.to_string();
        let count = tokio::task::spawn_blocking(move || repo.count_for_conversation(&conversation))
            .await
            .map_err(|e| ChatError::Storage(e.to_string()))??;

        if count >= self.max_turns {
            warn!(conversation_id, count, limit = self.max_turns, "Turn limit reached");
            return Ok(Admission::Refused(format!(
                "This conversation has reached its limit of {} messages. Please start a new chat.",
                self.max_turns
            )));
        }
        debug!(conversation_id, count, "Turn admitted");
        Ok(Admission::Allowed)
    }
}
