//! Bearer token extraction and the authenticated-user extractor.
//!
//! The token verifier is a port, so the extractor does not care whether
//! tokens are checked against a JWKS endpoint or a development stub.
//!
//! ```text
//! Authorization: Bearer <jwt>          (HTTP and WebSocket)
//! ?token=<jwt>                         (WebSocket only)
//! Sec-WebSocket-Protocol: bearer, <jwt> (WebSocket only)
//! ```
//!
//! # Example
//!
//! ```ignore
//! async fn chat(RequireAuth(user): RequireAuth) -> impl IntoResponse {
//!     format!("Hallo, {}!", user)
//! }
//! ```

use std::sync::Arc;

use axum::async_trait;
use axum::extract::{FromRef, FromRequestParts};
use axum::http::request::Parts;
use axum::http::{header, HeaderMap};

use crate::adapters::http::error::ApiError;
use crate::domain::foundation::UserId;
use crate::ports::{AuthError, TokenVerifier};

/// Verifier shared through the router state.
pub type AuthState = Arc<dyn TokenVerifier>;

/// Token from `Authorization: Bearer <token>`.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Token smuggled through `Sec-WebSocket-Protocol`.
///
/// Browsers cannot set headers on a WebSocket handshake, so clients offer
/// `bearer, <jwt>` or a bare JWT as the subprotocol list.
pub fn protocol_token(headers: &HeaderMap) -> Option<String> {
    let raw = headers
        .get(header::SEC_WEBSOCKET_PROTOCOL)
        .and_then(|h| h.to_str().ok())?;
    let parts: Vec<&str> = raw.split(',').map(str::trim).filter(|p| !p.is_empty()).collect();
    match parts.as_slice() {
        [scheme, token, ..] if scheme.eq_ignore_ascii_case("bearer") => Some(token.to_string()),
        [single] if single.matches('.').count() == 2 => Some(single.to_string()),
        _ => None,
    }
}

/// Verifies `token` and resolves the principal.
pub async fn authenticate(verifier: &dyn TokenVerifier, token: Option<&str>) -> Result<UserId, AuthError> {
    let token = token.map(str::trim).filter(|t| !t.is_empty()).ok_or(AuthError::MissingToken)?;
    let claims = verifier.verify(token).await?;
    claims.user_id().ok_or(AuthError::InvalidToken)
}

/// Extractor that requires a verified bearer token.
#[derive(Debug, Clone)]
pub struct RequireAuth(pub UserId);

#[async_trait]
impl<S> FromRequestParts<S> for RequireAuth
where
    S: Send + Sync,
    AuthState: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let verifier = AuthState::from_ref(state);
        let user = authenticate(verifier.as_ref(), bearer_token(&parts.headers)).await?;
        Ok(RequireAuth(user))
    }
}
