//! Route configuration for the consultation endpoints.

use axum::routing::{get, post};
use axum::Router;
use tower_http::compression::CompressionLayer;

use super::handlers::{chat, health, ConsultAppState};
use super::ws_handler::ws_handler;

/// Creates the consultation router.
///
/// Routes:
/// - `GET /api/v1/ai/ws` - WebSocket upgrade for streamed turns
/// - `POST /api/v1/ai/chat` - Synchronous turn, `{text, chat_id}` to `{text}` (gzip on request)
/// - `GET /health` - Liveness check
pub fn consult_router() -> Router<ConsultAppState> {
    Router::new()
        .route("/api/v1/ai/ws", get(ws_handler))
        .route("/api/v1/ai/chat", post(chat).layer(CompressionLayer::new()))
        .route("/health", get(health))
}
