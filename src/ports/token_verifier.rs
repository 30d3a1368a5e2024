//! Token verification port for authenticating WebSocket and HTTP callers.
//!
//! Implementations must validate:
//! - **Signature**: against the provider's published keys
//! - **Issuer (iss)** and **Audience (aud)** when configured
//! - **Expiry (exp)**
//!
//! # Example
//!
//! ```ignore
//! let claims = verifier.verify(token).await?;
//! let user = claims.user_id();
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::foundation::UserId;

/// Claims of a verified token that the service uses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub exp: Option<i64>,
}

impl Claims {
    /// Principal for rate limiting and logging: subject, else email.
    pub fn user_id(&self) -> Option<UserId> {
        UserId::new(self.sub.clone()).or_else(|| self.email.clone().and_then(UserId::new))
    }
}

/// Authentication errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// No token was presented.
    #[error("Missing token")]
    MissingToken,

    /// The token is malformed or has an invalid signature.
    #[error("Invalid or expired token")]
    InvalidToken,

    /// The token has expired.
    #[error("Token expired")]
    TokenExpired,

    /// No published key matches the token's `kid`.
    #[error("Unknown signing key: {0}")]
    UnknownKey(String),

    /// The key provider is unreachable.
    #[error("Auth service unavailable: {0}")]
    ServiceUnavailable(String),
}

impl AuthError {
    /// Returns true if this is a transient error that may succeed on retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, AuthError::ServiceUnavailable(_))
    }
}

/// Verifies bearer tokens.
///
/// # Contract
///
/// - Return `AuthError::InvalidToken` for malformed or bad-signature tokens
/// - Return `AuthError::TokenExpired` for expired tokens
/// - Return `AuthError::ServiceUnavailable` for transient errors
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    /// Verify a raw token (without "Bearer " prefix) and return its claims.
    async fn verify(&self, token: &str) -> Result<Claims, AuthError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_id_prefers_subject() {
        let claims = Claims {
            sub: "u-1".into(),
            email: Some("a@b.de".into()),
            exp: None,
        };
        assert_eq!(claims.user_id().unwrap().as_str(), "u-1");
    }

    #[test]
    fn user_id_falls_back_to_email() {
        let claims = Claims {
            sub: "".into(),
            email: Some("a@b.de".into()),
            exp: None,
        };
        assert_eq!(claims.user_id().unwrap().as_str(), "a@b.de");
    }

    #[test]
    fn only_unavailable_is_transient() {
        assert!(AuthError::ServiceUnavailable("x".into()).is_transient());
        assert!(!AuthError::InvalidToken.is_transient());
    }
}
