//! Application state shared across all route handlers.

use std::sync::Arc;
use std::time::Instant;

use orgscout_chat::ChatOrchestrator;

/// Shared application state, passed to handlers via axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    /// Turn pipeline shared by every open connection.
    pub orchestrator: Arc<ChatOrchestrator>,
    /// Bearer token required on protected routes; `None` disables auth.
    pub api_token: Option<String>,
    /// Server start time for uptime calculation.
    pub start_time: Instant,
}

impl AppState {
    pub fn new(orchestrator: ChatOrchestrator, api_token: Option<String>) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
            api_token: api_token.filter(|t| !t.is_empty()),
            start_time: Instant::now(),
        }
    }
}
