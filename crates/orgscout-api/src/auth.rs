//! Bearer-token authentication for protected routes.
//!
//! Browsers cannot attach headers to a WebSocket handshake, so the token is
//! also accepted as a `token` query parameter.

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::error::ApiError;
use crate::state::AppState;

/// Middleware that validates `Authorization: Bearer <token>` or `?token=`.
///
/// Passes every request through when no token is configured.
pub async fn require_auth(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let Some(expected) = state.api_token.as_deref() else {
        return next.run(req).await;
    };

    let presented = match req.headers().get("authorization") {
        Some(value) => match value.to_str() {
            Ok(s) => s.strip_prefix("Bearer ").map(str::to_string),
            Err(_) => {
                return ApiError::Unauthorized(
                    "Invalid Authorization header encoding".to_string(),
                )
                .into_response();
            }
        },
        None => req.uri().query().and_then(query_token),
    };

    match presented {
        Some(token) if token == expected => next.run(req).await,
        Some(_) => ApiError::Unauthorized("Invalid bearer token".to_string()).into_response(),
        None => ApiError::Unauthorized("Missing bearer token".to_string()).into_response(),
    }
}

fn query_token(query: &str) -> Option<String> {
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == "token")
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
}
