//! WebSocket handler for streamed consultation turns.
//!
//! # Connection Flow
//! 1. Client requests an upgrade with a token (header, query or subprotocol)
//! 2. Server upgrades; a failed verification gets `error{unauthorized}` and close 1008
//! 3. Each text frame is a chat message, a `ping` or a `cancel`
//! 4. Chat messages start a turn task that streams into the connection's outbound channel
//! 5. A writer task drains that channel to the socket
//! 6. Receive silence yields `idle` heartbeats; the socket stays open

use std::borrow::Cow;
use std::sync::Arc;

use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::Response;
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::timeout;

use crate::adapters::http::middleware::{authenticate, bearer_token, protocol_token};
use crate::application::{stream_turn, Outbound, TurnEmitter, TurnRequest};
use crate::domain::foundation::{ThreadId, UserId};
use crate::domain::streaming::{ClientControl, ClientFrame, ErrorCode, ServerEvent};
use crate::ports::AuthError;

use super::dto::WsConnectParams;
use super::handlers::ConsultAppState;

// ════════════════════════════════════════════════════════════════════════════════
// Upgrade
// ════════════════════════════════════════════════════════════════════════════════

/// Route: `GET /api/v1/ai/ws`
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    Query(params): Query<WsConnectParams>,
    State(state): State<ConsultAppState>,
) -> Response {
    let token = bearer_token(&headers)
        .map(str::to_string)
        .or_else(|| params.token.filter(|t| !t.trim().is_empty()))
        .or_else(|| protocol_token(&headers));
    let verified = authenticate(state.verifier.as_ref(), token.as_deref()).await;

    ws.protocols(["bearer"]).on_upgrade(move |socket| async move {
        match verified {
            Ok(user) => handle_socket(socket, user, state).await,
            Err(err) => reject(socket, err).await,
        }
    })
}

async fn reject(mut socket: WebSocket, err: AuthError) {
    tracing::info!(error = %err, "websocket rejected");
    let frame = ServerEvent::error(ErrorCode::Unauthorized, "Nicht autorisiert", None);
    if socket.send(Message::Text(frame.to_json())).await.is_ok() {
        let _ = socket
            .send(Message::Close(Some(CloseFrame {
                code: close_code::POLICY,
                reason: Cow::from("unauthorized"),
            })))
            .await;
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Connection
// ════════════════════════════════════════════════════════════════════════════════

async fn handle_socket(socket: WebSocket, user: UserId, state: ConsultAppState) {
    let (mut sender, mut receiver) = socket.split();
    let (out, mut out_rx) = mpsc::unbounded_channel::<ServerEvent>();

    // Lives until every turn of this connection dropped its emitter.
    let writer = tokio::spawn(async move {
        while let Some(event) = out_rx.recv().await {
            if sender.send(Message::Text(event.to_json())).await.is_err() {
                break;
            }
        }
    });

    let idle = state.settings.idle_timeout;
    let connection = Connection::new(state, user, out);
    tracing::debug!(user = %connection.user, "websocket connected");

    loop {
        match timeout(idle, receiver.next()).await {
            Err(_) => connection.heartbeat(),
            Ok(None) => break,
            Ok(Some(Err(e))) => {
                tracing::debug!(user = %connection.user, error = %e, "websocket receive error");
                break;
            }
            Ok(Some(Ok(Message::Text(text)))) => connection.on_text(&text).await,
            Ok(Some(Ok(Message::Binary(_)))) => {
                connection.send(ServerEvent::error(ErrorCode::InvalidJson, "Binärframes werden nicht unterstützt", None))
            }
            Ok(Some(Ok(Message::Close(_)))) => break,
            // Protocol-level ping/pong is answered by axum.
            Ok(Some(Ok(_))) => {}
        }
    }

    tracing::debug!(user = %connection.user, "websocket disconnected");
    drop(connection);
    // Running turns finish and persist; their frames go nowhere.
    drop(writer);
}

/// Frame dispatch of one authenticated connection.
pub struct Connection {
    state: ConsultAppState,
    user: UserId,
    out: Outbound,
}

impl Connection {
    pub fn new(state: ConsultAppState, user: UserId, out: Outbound) -> Self {
        Self { state, user, out }
    }

    fn send(&self, event: ServerEvent) {
        // A closed channel means the socket is gone.
        let _ = self.out.send(event);
    }

    fn heartbeat(&self) {
        self.send(ServerEvent::Idle {
            ts: Utc::now().timestamp(),
        });
    }

    /// Handles one inbound text frame. Turns run in spawned tasks.
    pub async fn on_text(&self, raw: &str) {
        let frame = match ClientFrame::parse(raw, self.state.settings.limits) {
            Ok(frame) => frame,
            Err(err) => {
                tracing::debug!(user = %self.user, error = %err, "frame rejected");
                self.send(ServerEvent::error(err.code(), err.to_string(), None));
                return;
            }
        };
        let thread_id = ThreadId::from_chat_id(&frame.chat_id);

        match frame.control {
            Some(ClientControl::Ping) => self.send(ServerEvent::pong(frame.ts)),
            Some(ClientControl::Cancel) => self.cancel(thread_id).await,
            None => self.start_turn(thread_id, frame).await,
        }
    }

    async fn cancel(&self, thread_id: ThreadId) {
        let cancelled = match self.state.cancels.get(&thread_id).await {
            Some(signal) => TurnEmitter::new(thread_id.clone(), signal, self.out.clone()).cancel().await,
            None => false,
        };
        if cancelled {
            tracing::info!(thread_id = %thread_id, "turn cancel requested");
        } else {
            // Nothing running; the client still waits for its `done`.
            self.send(ServerEvent::done(thread_id.as_str()));
        }
    }

    async fn start_turn(&self, thread_id: ThreadId, frame: ClientFrame) {
        let signal = match self.state.cancels.begin(&thread_id).await {
            Ok(signal) => signal,
            Err(busy) => {
                tracing::info!(thread_id = %thread_id, "message rejected, turn in progress");
                self.send(ServerEvent::error(
                    ErrorCode::TurnInProgress,
                    busy.to_string(),
                    Some(thread_id.as_str()),
                ));
                self.send(ServerEvent::done(thread_id.as_str()));
                return;
            }
        };

        let request = TurnRequest::new(self.user.clone(), frame.chat_id, frame.input).with_params(frame.params);
        let emitter = TurnEmitter::new(thread_id.clone(), Arc::clone(&signal), self.out.clone());
        let state = self.state.clone();

        tokio::spawn(async move {
            stream_turn(Arc::clone(&state.service), state.settings.stream, request, emitter).await;
            state.cancels.release(&thread_id, &signal).await;
        });
    }
}
