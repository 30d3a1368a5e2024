//! Request and response bodies of the synchronous chat endpoint.

use serde::{Deserialize, Serialize};

use crate::domain::consult::Params;

/// `POST /api/v1/ai/chat` body.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub chat_id: String,
    /// Optional form patch, as on the streaming surface.
    #[serde(default)]
    pub params: Option<Params>,
}

/// The graph's final assistant message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub text: String,
}

/// Query of the WebSocket upgrade.
#[derive(Debug, Default, Deserialize)]
pub struct WsConnectParams {
    pub token: Option<String>,
}
