//! Turn persistence sink.

use async_trait::async_trait;
use tracing::debug;

use orgscout_core::types::Turn;
use orgscout_storage::TurnRepository;

use crate::error::ChatError;

/// Durable destination for completed turns. Calls are fire-and-forget from
/// the session's point of view; errors are only logged, never retried.
#[async_trait]
pub trait TurnSink: Send + Sync {
    async fn persist(&self, turn: Turn) -> Result<(), ChatError>;
}

/// Sink writing to the SQLite turn log on the blocking pool.
pub struct SqliteTurnSink {
    repo: TurnRepository,
}

impl SqliteTurnSink {
    pub fn new(repo: TurnRepository) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl TurnSink for SqliteTurnSink {
    async fn persist(&self, turn: Turn) -> Result<(), ChatError> {
        let repo = self.repo.clone();
        let id = turn.id;
        tokio::task::spawn_blocking(move || repo.save(&turn))
            .await
            .map_err(|e| ChatError::Storage(e.to_string()))??;
        debug!(turn_id = %id, "Turn persisted");
        Ok(())
    }
}
