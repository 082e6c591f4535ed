//! Integration tests for the Orgscout HTTP surface.
//!
//! Router-level checks go through `oneshot`; the chat session tests bind a
//! real listener and talk to it with a WebSocket client. Upstream gateways
//! are replaced by scripted fakes.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use bytes::Bytes;
use futures::{stream, SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio_tungstenite::tungstenite::Message;
use tower::ServiceExt;

use orgscout_api::error::ErrorBody;
use orgscout_api::handlers::HealthResponse;
use orgscout_api::{create_router, AppState};
use orgscout_chat::{
    ChatError, ChatOrchestrator, LlmGateway, SearchGateway, SqliteTurnSink, UpstreamBody,
};
use orgscout_core::types::OrgListing;
use orgscout_storage::{Database, MemoryStore, TurnRepository};

// =============================================================================
// Helpers
// =============================================================================

const TEST_TOKEN: &str = "test-token-12345";

/// Answers every routing prompt with the same reply; extraction fails.
struct ScriptedLlm(&'static str);

#[async_trait]
impl LlmGateway for ScriptedLlm {
    async fn complete(&self, prompt: &str) -> Result<String, ChatError> {
        if prompt.starts_with("Convert the following") {
            return Err(ChatError::Classifier("extraction disabled".to_string()));
        }
        Ok(self.0.to_string())
    }
}

/// Replays a fixed event stream.
struct ScriptedSearch(Vec<&'static str>);

#[async_trait]
impl SearchGateway for ScriptedSearch {
    async fn open_stream(&self, _query: &str) -> Result<UpstreamBody, ChatError> {
        let chunks: Vec<Result<Bytes, ChatError>> = self
            .0
            .iter()
            .map(|e| Ok(Bytes::from_static(e.as_bytes())))
            .collect();
        Ok(UpstreamBody::EventStream(stream::iter(chunks).boxed()))
    }

    async fn search_organizations(&self, _query: &str) -> Result<OrgListing, ChatError> {
        Err(ChatError::Search("no listing configured".to_string()))
    }
}

const GREETING: &str = r#"{"route":"gemini","explanation":"Salom! Qanday yordam bera olaman?"}"#;

fn make_state_with(
    llm: ScriptedLlm,
    search: ScriptedSearch,
    token: Option<&str>,
) -> (AppState, TurnRepository) {
    let repo = TurnRepository::new(Arc::new(Database::in_memory().unwrap()));
    let orchestrator = ChatOrchestrator::new(
        Arc::new(llm),
        Arc::new(search),
        Arc::new(MemoryStore::default()),
        Arc::new(SqliteTurnSink::new(repo.clone())),
    );
    (
        AppState::new(orchestrator, token.map(str::to_string)),
        repo,
    )
}

fn make_state() -> AppState {
    make_state_with(ScriptedLlm(GREETING), ScriptedSearch(Vec::new()), Some(TEST_TOKEN)).0
}

fn make_app() -> axum::Router {
    create_router(make_state())
}

fn authed_get(uri: &str) -> Request<Body> {
    Request::get(uri)
        .header("authorization", format!("Bearer {}", TEST_TOKEN))
        .body(Body::empty())
        .unwrap()
}

async fn body_json<T: serde::de::DeserializeOwned>(resp: axum::response::Response) -> T {
    let bytes = axum::body::to_bytes(resp.into_body(), 1024 * 1024)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Serve `state` on an ephemeral port and return the bound address.
async fn spawn_server(state: AppState) -> std::net::SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, create_router(state)).await.unwrap();
    });
    addr
}

type Client = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

async fn next_json(ws: &mut Client) -> Value {
    let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
        .await
        .expect("timed out waiting for frame")
        .expect("socket closed")
        .unwrap();
    serde_json::from_str(msg.to_text().unwrap()).unwrap()
}

/// Read frames up to and including `{status: "end"}`.
async fn read_turn(ws: &mut Client) -> Vec<Value> {
    let mut frames = Vec::new();
    loop {
        let frame = next_json(ws).await;
        let done = frame == json!({"status": "end"});
        frames.push(frame);
        if done {
            return frames;
        }
    }
}

async fn wait_for_turns(repo: &TurnRepository, room: &str, n: u64) {
    for _ in 0..200 {
        if repo.count_for_conversation(room).unwrap() >= n {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("turn was not persisted");
}

// =============================================================================
// Public endpoints
// =============================================================================

#[tokio::test]
async fn test_health_happy_path() {
    let resp = make_app()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let health: HealthResponse = body_json(resp).await;
    assert_eq!(health.status, "ok");
    assert_eq!(health.version, env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_unknown_route_is_json_404() {
    let resp = make_app().oneshot(authed_get("/nope")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body: ErrorBody = body_json(resp).await;
    assert_eq!(body.error, "not_found");
}

// =============================================================================
// Authentication
// =============================================================================

#[tokio::test]
async fn test_ws_requires_token() {
    let resp = make_app()
        .oneshot(Request::get("/ws/room-1").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body: ErrorBody = body_json(resp).await;
    assert_eq!(body.error, "unauthorized");
}

#[tokio::test]
async fn test_ws_rejects_wrong_token() {
    let req = Request::get("/ws/room-1")
        .header("authorization", "Bearer wrong")
        .body(Body::empty())
        .unwrap();
    let resp = make_app().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_ws_rejects_wrong_query_token() {
    let resp = make_app()
        .oneshot(
            Request::get("/ws/room-1?token=wrong")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_ws_accepts_percent_encoded_query_token() {
    let (state, _) = make_state_with(
        ScriptedLlm(GREETING),
        ScriptedSearch(Vec::new()),
        Some("p@ss+word/1"),
    );
    let resp = create_router(state)
        .oneshot(
            Request::get("/ws/room-1?token=p%40ss%2Bword%2F1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_ne!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_ws_with_token_reaches_upgrade() {
    // A plain GET passes auth and is then refused by the upgrade extractor.
    let resp = make_app().oneshot(authed_get("/ws/room-1")).await.unwrap();
    assert_ne!(resp.status(), StatusCode::UNAUTHORIZED);
    assert!(resp.status().is_client_error());
}

#[tokio::test]
async fn test_ws_without_configured_token_is_public() {
    let (state, _) = make_state_with(ScriptedLlm(GREETING), ScriptedSearch(Vec::new()), None);
    let resp = create_router(state)
        .oneshot(Request::get("/ws/room-1").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_ne!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_ws_rejects_invalid_room_id() {
    let resp = make_app()
        .oneshot(authed_get("/ws/room.1"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: ErrorBody = body_json(resp).await;
    assert_eq!(body.error, "bad_request");
}

// =============================================================================
// Chat sessions over a real socket
// =============================================================================

#[tokio::test]
async fn test_greeting_turn_end_to_end() {
    let (state, repo) =
        make_state_with(ScriptedLlm(GREETING), ScriptedSearch(Vec::new()), Some(TEST_TOKEN));
    let addr = spawn_server(state).await;

    let url = format!("ws://{}/ws/room-1?token={}", addr, TEST_TOKEN);
    let (mut ws, _) = tokio_tungstenite::connect_async(url).await.unwrap();

    // Malformed frames are skipped without a reply.
    ws.send(Message::text("not json")).await.unwrap();
    ws.send(Message::text(json!({"message": "salom"}).to_string()))
        .await
        .unwrap();

    let frames = read_turn(&mut ws).await;
    assert_eq!(frames.len(), 2);
    assert_eq!(
        frames[0],
        json!({"content": {
            "text": "Salom! Qanday yordam bera olaman?",
            "citations": null,
            "location": null,
            "images_url": null,
            "organizations": null,
        }})
    );

    wait_for_turns(&repo, "room-1", 1).await;
    let stored = repo.find_by_conversation("room-1", 10).unwrap();
    assert_eq!(stored[0].user_request, "salom");
    assert!(stored[0].citations.is_empty());
    assert!(stored[0].locations.is_none());

    ws.close(None).await.unwrap();
}

#[tokio::test]
async fn test_streamed_turn_end_to_end() {
    let (state, repo) = make_state_with(
        ScriptedLlm(r#"{"route":"sonar","enriched_query":"TATU manzili","expects_multiple":false}"#),
        ScriptedSearch(vec![
            "data: {\"citations\":[\"https://tuit.uz\"],\"choices\":[{\"delta\":{\"content\":\"Amir Temur \"}}]}\n\n",
            "data: {\"citations\":[\"https://www.google.com/maps/@41.34,69.29,17z\"],\"choices\":[{\"delta\":{\"content\":\"108\"}}]}\n\n",
            "data: [DONE]\n\n",
        ]),
        Some(TEST_TOKEN),
    );
    let addr = spawn_server(state).await;

    let url = format!("ws://{}/ws/room-2", addr);
    let mut req = tokio_tungstenite::tungstenite::client::IntoClientRequest::into_client_request(url)
        .unwrap();
    req.headers_mut().insert(
        "authorization",
        format!("Bearer {}", TEST_TOKEN).parse().unwrap(),
    );
    let (mut ws, _) = tokio_tungstenite::connect_async(req).await.unwrap();

    ws.send(Message::text(json!({"message": "TATU qayerda?"}).to_string()))
        .await
        .unwrap();

    let frames = read_turn(&mut ws).await;
    assert_eq!(frames.len(), 4);
    assert_eq!(frames[0], json!({"text": "Amir Temur "}));
    assert_eq!(frames[1], json!({"text": "108"}));

    let data = &frames[2]["data"];
    assert_eq!(data["text"], "Amir Temur 108");
    assert_eq!(
        data["citations"],
        json!(["https://tuit.uz", "https://www.google.com/maps/@41.34,69.29,17z"])
    );
    assert_eq!(data["location"], json!([{"lat": 41.34, "lng": 69.29}]));
    assert!(data["organizations"].is_null());

    // The connection stays open for the next turn.
    ws.send(Message::text(json!({"message": ""}).to_string()))
        .await
        .unwrap();
    let frame = next_json(&mut ws).await;
    assert_eq!(frame["type"], "error");

    wait_for_turns(&repo, "room-2", 1).await;
    let stored = repo.find_by_conversation("room-2", 10).unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].enriched_query, "TATU manzili");
    assert_eq!(stored[0].answer, "Amir Temur 108");
}
