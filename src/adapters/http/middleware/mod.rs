//! HTTP middleware for axum.
//!
//! - `auth` - Bearer token extraction and the `RequireAuth` extractor

pub mod auth;

pub use auth::{authenticate, bearer_token, protocol_token, AuthState, RequireAuth};
