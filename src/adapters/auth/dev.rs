//! Permissive verifier for local development.
//!
//! Accepts any non-empty token. When the token is a JWT its claims are read
//! without checking the signature, so a locally minted token still yields a
//! stable user id. Never wired in production.

use async_trait::async_trait;
use jsonwebtoken::{decode, DecodingKey, Validation};

use crate::ports::{AuthError, Claims, TokenVerifier};

/// User id for opaque development tokens.
const DEV_SUBJECT: &str = "dev-user";

#[derive(Debug, Clone, Default)]
pub struct DevTokenVerifier;

impl DevTokenVerifier {
    pub fn new() -> Self {
        Self
    }

    fn unverified_claims(token: &str) -> Option<Claims> {
        let mut validation = Validation::default();
        validation.insecure_disable_signature_validation();
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();
        decode::<Claims>(token, &DecodingKey::from_secret(&[]), &validation)
            .ok()
            .map(|data| data.claims)
            .filter(|claims| claims.user_id().is_some())
    }
}

#[async_trait]
impl TokenVerifier for DevTokenVerifier {
    async fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AuthError::MissingToken);
        }
        Ok(Self::unverified_claims(token).unwrap_or_else(|| Claims {
            sub: DEV_SUBJECT.to_string(),
            email: None,
            exp: None,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    #[tokio::test]
    async fn opaque_token_maps_to_dev_user() {
        let claims = DevTokenVerifier::new().verify("anything").await.unwrap();
        assert_eq!(claims.sub, DEV_SUBJECT);
    }

    #[tokio::test]
    async fn blank_token_is_missing() {
        assert_eq!(
            DevTokenVerifier::new().verify("  ").await.unwrap_err(),
            AuthError::MissingToken
        );
    }

    #[tokio::test]
    async fn jwt_subject_is_read_without_signature_check() {
        let claims = Claims {
            sub: "alice".into(),
            email: None,
            exp: Some(1),
        };
        let token = encode(&Header::default(), &claims, &EncodingKey::from_secret(b"whatever")).unwrap();
        assert_eq!(DevTokenVerifier::new().verify(&token).await.unwrap().sub, "alice");
    }
}
