//! HTTP surface for Orgscout: the per-room WebSocket endpoint, bearer-token
//! auth, and the health check.

pub mod auth;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use routes::{create_router, start_server};
pub use state::AppState;
