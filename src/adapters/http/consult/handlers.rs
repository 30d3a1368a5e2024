//! HTTP handlers for the consultation endpoints.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRef, Json, State};

use crate::adapters::http::error::ApiError;
use crate::adapters::http::middleware::{AuthState, RequireAuth};
use crate::application::{CancelRegistry, ConsultService, StreamSettings, TurnRequest};
use crate::domain::streaming::FrameLimits;
use crate::ports::TokenVerifier;

use super::dto::{ChatRequest, ChatResponse};

// ════════════════════════════════════════════════════════════════════════════════
// Application State
// ════════════════════════════════════════════════════════════════════════════════

/// Connection-level knobs of the WebSocket surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SocketSettings {
    pub stream: StreamSettings,
    pub limits: FrameLimits,
    /// Receive silence after which an `idle` heartbeat is sent.
    pub idle_timeout: Duration,
}

impl Default for SocketSettings {
    fn default() -> Self {
        Self {
            stream: StreamSettings::default(),
            limits: FrameLimits::default(),
            idle_timeout: Duration::from_secs(45),
        }
    }
}

/// Shared state of the consultation router.
#[derive(Clone)]
pub struct ConsultAppState {
    pub service: Arc<ConsultService>,
    pub cancels: Arc<CancelRegistry>,
    pub verifier: Arc<dyn TokenVerifier>,
    pub settings: SocketSettings,
}

impl ConsultAppState {
    pub fn new(service: Arc<ConsultService>, verifier: Arc<dyn TokenVerifier>, settings: SocketSettings) -> Self {
        Self {
            service,
            cancels: Arc::new(CancelRegistry::new()),
            verifier,
            settings,
        }
    }
}

impl FromRef<ConsultAppState> for AuthState {
    fn from_ref(state: &ConsultAppState) -> Self {
        Arc::clone(&state.verifier)
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Handlers
// ════════════════════════════════════════════════════════════════════════════════

/// `POST /api/v1/ai/chat`: runs one turn to completion.
pub async fn chat(
    State(state): State<ConsultAppState>,
    RequireAuth(user): RequireAuth,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    let Json(body) = body.map_err(|e| ApiError::InvalidJson(e.body_text()))?;

    let max = state.settings.limits.input_max_chars;
    if body.text.chars().count() > max {
        return Err(ApiError::InputTooLong(max));
    }
    let has_params = body.params.as_ref().map_or(false, |p| !p.is_empty());
    if body.text.trim().is_empty() && !has_params {
        return Err(ApiError::MissingInput);
    }

    let request = TurnRequest::new(user, body.chat_id, body.text).with_params(body.params);
    let outcome = state.service.invoke(&request).await?;

    Ok(Json(ChatResponse {
        text: outcome.answer().to_string(),
    }))
}

/// `GET /health`
pub async fn health() -> &'static str {
    "ok"
}
