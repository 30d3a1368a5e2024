//! Mock token verifier for testing.
//!
//! ```ignore
//! let verifier = MockTokenVerifier::new().with_user("valid-token", "user-123");
//! let claims = verifier.verify("valid-token").await?;
//! ```

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::ports::{AuthError, Claims, TokenVerifier};

/// Maps known tokens to claims. Other tokens return `InvalidToken`.
#[derive(Debug, Default)]
pub struct MockTokenVerifier {
    tokens: RwLock<HashMap<String, Claims>>,
    force_error: RwLock<Option<AuthError>>,
}

impl MockTokenVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a valid token for a user id.
    pub fn with_user(self, token: impl Into<String>, user_id: impl Into<String>) -> Self {
        let user_id = user_id.into();
        let claims = Claims {
            email: Some(format!("{}@test.example.com", user_id)),
            sub: user_id,
            exp: None,
        };
        self.tokens.write().unwrap().insert(token.into(), claims);
        self
    }

    /// Forces all verifications to return the specified error.
    pub fn with_error(self, error: AuthError) -> Self {
        *self.force_error.write().unwrap() = Some(error);
        self
    }
}

#[async_trait]
impl TokenVerifier for MockTokenVerifier {
    async fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        if let Some(error) = self.force_error.read().unwrap().clone() {
            return Err(error);
        }
        self.tokens
            .read()
            .unwrap()
            .get(token)
            .cloned()
            .ok_or(AuthError::InvalidToken)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn known_token_verifies() {
        let verifier = MockTokenVerifier::new().with_user("t", "u-1");
        assert_eq!(verifier.verify("t").await.unwrap().sub, "u-1");
    }

    #[tokio::test]
    async fn unknown_token_is_invalid() {
        let verifier = MockTokenVerifier::new();
        assert_eq!(verifier.verify("x").await.unwrap_err(), AuthError::InvalidToken);
    }

    #[tokio::test]
    async fn forced_error_wins() {
        let verifier = MockTokenVerifier::new()
            .with_user("t", "u-1")
            .with_error(AuthError::ServiceUnavailable("down".into()));
        assert!(verifier.verify("t").await.unwrap_err().is_transient());
    }
}
