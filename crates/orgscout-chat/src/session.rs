//! Per-connection read loop, independent of the transport.

use std::sync::Arc;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use tracing::{info, warn};

use orgscout_core::types::OutboundFrame;

use crate::error::ChatError;
use crate::orchestrator::ChatOrchestrator;

/// Outbound half of a client connection.
///
/// Implementations return [`ChatError::Transport`] when the frame cannot be
/// written; the session treats that as a dead connection.
#[async_trait]
pub trait FrameSink: Send {
    async fn send(&mut self, frame: &OutboundFrame) -> Result<(), ChatError>;
}

/// Drive one conversation until the inbound stream ends or a write fails.
///
/// `inbound` yields the text of each client frame. Turns are handled
/// strictly one after another, so every frame of turn N is written before
/// the next inbound frame is read.
pub async fn run_session<S>(
    orchestrator: Arc<ChatOrchestrator>,
    conversation_id: &str,
    mut inbound: S,
    out: &mut dyn FrameSink,
) where
    S: Stream<Item = String> + Unpin + Send,
{
    info!(conversation_id, "Session opened");
    let mut frames = 0u64;
    while let Some(text) = inbound.next().await {
        frames += 1;
        if let Err(e) = orchestrator.handle_text(conversation_id, &text, out).await {
            warn!(conversation_id, error = %e, "Connection lost, ending session");
            break;
        }
    }
    info!(conversation_id, frames, "Session closed");
}
