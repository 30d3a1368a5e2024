//! WebSocket frame types for consultation streaming.
//!
//! Defines the protocol between server and connected clients:
//! - Client → Server: a chat frame with optional `type` of `ping` or `cancel`
//! - Server → Client: `start`, `token`, `ui_action`, `final`, `done`,
//!   `error`, `idle`, `pong`, tagged by `event`; `pong` also carries
//!   `"type": "pong"` to mirror the client's `ping`

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::consult::{Params, UiEvent};

// ════════════════════════════════════════════════════════════════════════════════
// Client → Server
// ════════════════════════════════════════════════════════════════════════════════

/// Control kind of an inbound frame. Absent means a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientControl {
    Ping,
    Cancel,
}

/// One inbound frame.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClientFrame {
    #[serde(default)]
    pub chat_id: String,
    #[serde(default)]
    pub input: String,
    #[serde(default)]
    pub params: Option<Params>,
    #[serde(default, rename = "type")]
    pub control: Option<ClientControl>,
    /// Echoed back on `pong`.
    #[serde(default)]
    pub ts: Option<Value>,
}

/// Limits applied to inbound frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameLimits {
    pub input_max_chars: usize,
}

impl FrameLimits {
    /// Raw frames may be twice the input limit to leave room for params.
    pub fn frame_max_bytes(&self) -> usize {
        self.input_max_chars.saturating_mul(2)
    }
}

impl Default for FrameLimits {
    fn default() -> Self {
        Self { input_max_chars: 4000 }
    }
}

/// Rejection of a single inbound frame. The connection stays open.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("frame exceeds {max} bytes")]
    TooLarge { max: usize },

    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    #[error("input exceeds {max} characters")]
    InputTooLong { max: usize },

    #[error("input is empty")]
    MissingInput,
}

impl FrameError {
    pub fn code(&self) -> ErrorCode {
        match self {
            FrameError::TooLarge { .. } => ErrorCode::FrameTooLarge,
            FrameError::InvalidJson(_) => ErrorCode::InvalidJson,
            FrameError::InputTooLong { .. } => ErrorCode::InputTooLong,
            FrameError::MissingInput => ErrorCode::MissingInput,
        }
    }
}

impl ClientFrame {
    /// Parses and validates a raw text frame.
    pub fn parse(raw: &str, limits: FrameLimits) -> Result<Self, FrameError> {
        let max = limits.frame_max_bytes();
        if raw.len() > max {
            return Err(FrameError::TooLarge { max });
        }
        let frame: ClientFrame =
            serde_json::from_str(raw).map_err(|e| FrameError::InvalidJson(e.to_string()))?;
        if frame.control.is_none() {
            frame.validate(limits)?;
        }
        Ok(frame)
    }

    /// Checks a chat frame: bounded input, and either input or params.
    pub fn validate(&self, limits: FrameLimits) -> Result<(), FrameError> {
        if self.input.chars().count() > limits.input_max_chars {
            return Err(FrameError::InputTooLong {
                max: limits.input_max_chars,
            });
        }
        if self.input.trim().is_empty() && !self.has_params() {
            return Err(FrameError::MissingInput);
        }
        Ok(())
    }

    pub fn has_params(&self) -> bool {
        self.params.as_ref().map_or(false, |p| !p.is_empty())
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Server → Client
// ════════════════════════════════════════════════════════════════════════════════

/// Error codes for `error` frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Unauthorized,
    InvalidJson,
    MissingInput,
    InputTooLong,
    FrameTooLarge,
    RateLimited,
    TurnInProgress,
    GraphFailed,
    InternalError,
}

/// A UI side-effect addressed to a thread.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UiActionFrame {
    #[serde(flatten)]
    pub ui: UiEvent,
    pub thread_id: String,
}

/// Reply to a client `ping`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PongFrame {
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ts: Option<Value>,
}

/// All frames sent from server to client.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ServerEvent {
    /// The turn has begun.
    Start {
        thread_id: String,
        route: String,
    },
    /// One coalesced increment.
    Token { delta: String, thread_id: String },
    UiAction(UiActionFrame),
    /// Full answer text, only when enabled.
    Final { text: String, thread_id: String },
    /// Terminal marker, once per turn.
    Done { thread_id: String },
    Error {
        code: ErrorCode,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        thread_id: Option<String>,
    },
    /// Keep-alive after an idle receive timeout.
    Idle { ts: i64 },
    Pong(PongFrame),
}

impl ServerEvent {
    pub fn token(delta: impl Into<String>, thread_id: &str) -> Self {
        ServerEvent::Token {
            delta: delta.into(),
            thread_id: thread_id.to_string(),
        }
    }

    pub fn ui_action(ui: UiEvent, thread_id: &str) -> Self {
        ServerEvent::UiAction(UiActionFrame {
            ui,
            thread_id: thread_id.to_string(),
        })
    }

    /// Echoes the ping's `ts`, if any.
    pub fn pong(ts: Option<Value>) -> Self {
        ServerEvent::Pong(PongFrame { kind: "pong", ts })
    }

    pub fn done(thread_id: &str) -> Self {
        ServerEvent::Done {
            thread_id: thread_id.to_string(),
        }
    }

    pub fn error(code: ErrorCode, message: impl Into<String>, thread_id: Option<&str>) -> Self {
        ServerEvent::Error {
            code,
            message: message.into(),
            thread_id: thread_id.map(str::to_string),
        }
    }

    /// Wire name of the frame.
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::Start { .. } => "start",
            ServerEvent::Token { .. } => "token",
            ServerEvent::UiAction(_) => "ui_action",
            ServerEvent::Final { .. } => "final",
            ServerEvent::Done { .. } => "done",
            ServerEvent::Error { .. } => "error",
            ServerEvent::Idle { .. } => "idle",
            ServerEvent::Pong(_) => "pong",
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, ServerEvent::Done { .. })
    }

    pub fn to_json(&self) -> String {
        // Every variant serializes to an object of strings, numbers and maps.
        serde_json::to_string(self).unwrap_or_else(|_| {
            r#"{"event":"error","code":"internal_error","message":"serialization failed"}"#.to_string()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::consult::{Derived, OpenForm};
    use serde_json::json;

    fn limits() -> FrameLimits {
        FrameLimits { input_max_chars: 10 }
    }

    mod client_frames {
        use super::*;

        #[test]
        fn parses_chat_frame_with_params() {
            let f = ClientFrame::parse(r#"{"chat_id":"c1","input":"","params":{"druck_bar":2}}"#, limits()).unwrap();
            assert_eq!(f.chat_id, "c1");
            assert!(f.control.is_none());
            assert!(f.has_params());
        }

        #[test]
        fn parses_control_frames() {
            let ping = ClientFrame::parse(r#"{"type":"ping","ts":5}"#, limits()).unwrap();
            assert_eq!(ping.control, Some(ClientControl::Ping));
            assert_eq!(ping.ts, Some(json!(5)));

            let cancel = ClientFrame::parse(r#"{"type":"cancel","chat_id":"c1"}"#, limits()).unwrap();
            assert_eq!(cancel.control, Some(ClientControl::Cancel));
        }

        #[test]
        fn rejects_invalid_json() {
            let err = ClientFrame::parse("{nope", limits()).unwrap_err();
            assert_eq!(err.code(), ErrorCode::InvalidJson);
        }

        #[test]
        fn rejects_oversized_frame() {
            let raw = format!(r#"{{"input":"{}"}}"#, "x".repeat(30));
            assert_eq!(ClientFrame::parse(&raw, limits()).unwrap_err(), FrameError::TooLarge { max: 20 });
        }

        #[test]
        fn rejects_over_length_input_by_characters() {
            let frame = ClientFrame {
                input: "ä".repeat(11),
                ..ClientFrame::default()
            };
            assert_eq!(frame.validate(limits()).unwrap_err().code(), ErrorCode::InputTooLong);
        }

        #[test]
        fn empty_input_without_params_is_missing() {
            let err = ClientFrame::parse(r#"{"chat_id":"c1","input":"  "}"#, limits()).unwrap_err();
            assert_eq!(err, FrameError::MissingInput);
        }
    }

    mod server_events {
        use super::*;

        fn to_value(event: &ServerEvent) -> Value {
            serde_json::from_str(&event.to_json()).unwrap()
        }

        #[test]
        fn token_frame_shape() {
            assert_eq!(
                to_value(&ServerEvent::token("Hallo", "api:c1")),
                json!({"event": "token", "delta": "Hallo", "thread_id": "api:c1"})
            );
        }

        #[test]
        fn open_form_is_flattened_into_ui_action() {
            let form = OpenForm::for_domain("rwdr", vec!["breite_mm".into()], &Params::new());
            let v = to_value(&ServerEvent::ui_action(UiEvent::OpenForm(form), "api:c1"));
            assert_eq!(v["event"], "ui_action");
            assert_eq!(v["ui_action"], "open_form");
            assert_eq!(v["form_id"], "rwdr_params_v1");
            assert_eq!(v["missing"], json!(["breite_mm"]));
            assert_eq!(v["thread_id"], "api:c1");
        }

        #[test]
        fn calc_snapshot_carries_derived() {
            let v = to_value(&ServerEvent::ui_action(
                UiEvent::CalcSnapshot {
                    derived: Derived::default(),
                },
                "t",
            ));
            assert_eq!(v["ui_action"], "calc_snapshot");
            assert!(v["derived"].is_object());
        }

        #[test]
        fn error_and_done_frames() {
            let v = to_value(&ServerEvent::error(ErrorCode::TurnInProgress, "busy", Some("t")));
            assert_eq!(v["code"], "turn_in_progress");
            assert_eq!(to_value(&ServerEvent::done("t")), json!({"event": "done", "thread_id": "t"}));
            assert!(ServerEvent::done("t").is_done());
        }

        #[test]
        fn pong_echoes_timestamp() {
            assert_eq!(to_value(&ServerEvent::pong(None)), json!({"event": "pong", "type": "pong"}));
            assert_eq!(
                to_value(&ServerEvent::pong(Some(json!(7)))),
                json!({"event": "pong", "type": "pong", "ts": 7})
            );
        }
    }
}
