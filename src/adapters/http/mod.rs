//! HTTP adapters - axum routes for the consultation service.

pub mod consult;
pub mod error;
pub mod middleware;

pub use consult::{consult_router, ConsultAppState, SocketSettings};
pub use error::{ApiError, ErrorResponse};
