//! Route handlers: health check and the per-room WebSocket session.

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::stream::SplitSink;
use futures::{future, SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use orgscout_chat::{run_session, ChatError, ChatOrchestrator, FrameSink};
use orgscout_core::types::OutboundFrame;

use crate::error::ApiError;
use crate::state::AppState;

const MAX_ROOM_ID_LEN: usize = 128;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
}

/// GET /health - liveness and uptime.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

/// Fallback for unknown routes.
pub async fn not_found() -> ApiError {
    ApiError::NotFound("No such route".to_string())
}

/// GET /ws/{chat_room_id} - upgrade to a chat session.
///
/// The room id doubles as the conversation id for memory and persistence.
pub async fn ws_chat(
    State(state): State<AppState>,
    Path(chat_room_id): Path<String>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    if !is_valid_room_id(&chat_room_id) {
        return ApiError::BadRequest(format!("Invalid chat room id: {chat_room_id:?}"))
            .into_response();
    }
    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return rejection.into_response(),
    };

    let orchestrator = Arc::clone(&state.orchestrator);
    ws.on_upgrade(move |socket| handle_socket(socket, orchestrator, chat_room_id))
}

fn is_valid_room_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_ROOM_ID_LEN
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

async fn handle_socket(
    socket: WebSocket,
    orchestrator: Arc<ChatOrchestrator>,
    chat_room_id: String,
) {
    let (sender, receiver) = socket.split();
    let mut sink = SocketFrames { sender };

    // Text frames feed the session; a close frame or read error ends it.
    let inbound = receiver
        .take_while(|msg| future::ready(matches!(msg, Ok(m) if !matches!(m, Message::Close(_)))))
        .filter_map(|msg| {
            future::ready(match msg {
                Ok(Message::Text(text)) => Some(text.as_str().to_owned()),
                _ => None,
            })
        })
        .boxed();

    run_session(orchestrator, &chat_room_id, inbound, &mut sink).await;

    if let Err(e) = sink.sender.close().await {
        debug!(chat_room_id = %chat_room_id, error = %e, "Socket already closed");
    }
    info!(chat_room_id = %chat_room_id, "WebSocket disconnected");
}

/// Writes outbound frames as JSON text messages.
struct SocketFrames {
    sender: SplitSink<WebSocket, Message>,
}

#[async_trait]
impl FrameSink for SocketFrames {
    async fn send(&mut self, frame: &OutboundFrame) -> Result<(), ChatError> {
        let json =
            serde_json::to_string(frame).map_err(|e| ChatError::InvalidFrame(e.to_string()))?;
        self.sender
            .send(Message::Text(json.into()))
            .await
            .map_err(|e| ChatError::Transport(e.to_string()))
    }
}
