//! HTTP and WebSocket surface of the consultation service.
//!
//! - [`ws_handler`] - streamed turns over a duplex channel
//! - [`handlers`] - synchronous chat and health
//! - [`routes`] - router assembly

pub mod dto;
pub mod handlers;
pub mod routes;
pub mod ws_handler;

pub use dto::{ChatRequest, ChatResponse};
pub use handlers::{chat, health, ConsultAppState, SocketSettings};
pub use routes::consult_router;
pub use ws_handler::{ws_handler, Connection};
