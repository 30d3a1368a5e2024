//! JWKS-backed token verifier.
//!
//! Validates JWTs by:
//!
//! 1. Looking up the signing key by the header's `kid` in a cached JWKS
//! 2. Validating the signature against that key
//! 3. Validating issuer and audience when configured, and expiry always
//!
//! The key set is cached for `cache_duration`. When a token names a `kid`
//! the cache does not know, the cache is invalidated and refetched once
//! before the token is rejected, so key rotation is picked up without
//! waiting for the TTL.
//!
//! # Example
//!
//! ```ignore
//! let config = JwksConfig::new("https://auth.example.com/oauth/v2/keys")
//!     .with_issuer("https://auth.example.com")
//!     .with_audience("seal-consult");
//!
//! let verifier = JwksTokenVerifier::new(config, Arc::new(HttpJwksFetcher::new(config.url.clone())));
//! let claims = verifier.verify("eyJ...").await?;
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use jsonwebtoken::jwk::{Jwk, JwkSet, KeyAlgorithm};
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use tokio::sync::RwLock;

use crate::ports::{AuthError, Claims, TokenVerifier};

/// Configuration for the JWKS verifier.
#[derive(Debug, Clone)]
pub struct JwksConfig {
    /// Where the key set is published.
    pub url: String,
    /// Expected `iss`, if any.
    pub issuer: Option<String>,
    /// Expected `aud`, if any.
    pub audience: Option<String>,
    /// How long a fetched key set is trusted.
    pub cache_duration: Duration,
}

impl JwksConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            issuer: None,
            audience: None,
            cache_duration: Duration::from_secs(3600),
        }
    }

    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }

    pub fn with_cache_duration(mut self, duration: Duration) -> Self {
        self.cache_duration = duration;
        self
    }
}

/// Source of the published key set.
#[async_trait]
pub trait JwksFetcher: Send + Sync {
    async fn fetch(&self) -> Result<JwkSet, AuthError>;
}

/// Fetches the key set over HTTP.
#[derive(Debug, Clone)]
pub struct HttpJwksFetcher {
    url: String,
    client: reqwest::Client,
}

impl HttpJwksFetcher {
    pub fn new(url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { url: url.into(), client }
    }
}

#[async_trait]
impl JwksFetcher for HttpJwksFetcher {
    async fn fetch(&self) -> Result<JwkSet, AuthError> {
        tracing::debug!(url = %self.url, "fetching JWKS");

        let response = self.client.get(&self.url).send().await.map_err(|e| {
            tracing::error!(error = %e, "failed to fetch JWKS");
            AuthError::ServiceUnavailable(format!("Failed to fetch JWKS: {}", e))
        })?;

        if !response.status().is_success() {
            let status = response.status();
            tracing::error!(%status, "JWKS endpoint returned an error");
            return Err(AuthError::ServiceUnavailable(format!("JWKS endpoint returned {}", status)));
        }

        let jwks: JwkSet = response.json().await.map_err(|e| {
            tracing::error!(error = %e, "failed to parse JWKS");
            AuthError::ServiceUnavailable(format!("Failed to parse JWKS: {}", e))
        })?;

        tracing::debug!(keys = jwks.keys.len(), "fetched JWKS");
        Ok(jwks)
    }
}

/// Cached JWKS with expiry tracking.
struct JwksCache {
    jwks: JwkSet,
    fetched_at: Instant,
    cache_duration: Duration,
}

impl JwksCache {
    fn new(jwks: JwkSet, cache_duration: Duration) -> Self {
        Self {
            jwks,
            fetched_at: Instant::now(),
            cache_duration,
        }
    }

    fn is_expired(&self) -> bool {
        self.fetched_at.elapsed() > self.cache_duration
    }
}

/// Production implementation of `TokenVerifier`.
pub struct JwksTokenVerifier {
    config: JwksConfig,
    fetcher: Arc<dyn JwksFetcher>,
    cache: Arc<RwLock<Option<JwksCache>>>,
}

impl JwksTokenVerifier {
    /// Keys are fetched lazily on first verification.
    pub fn new(config: JwksConfig, fetcher: Arc<dyn JwksFetcher>) -> Self {
        Self {
            config,
            fetcher,
            cache: Arc::new(RwLock::new(None)),
        }
    }

    /// Verifier fetching from `config.url` over HTTP.
    pub fn http(config: JwksConfig) -> Self {
        let fetcher = Arc::new(HttpJwksFetcher::new(config.url.clone()));
        Self::new(config, fetcher)
    }

    /// Drops the cached key set.
    pub async fn invalidate(&self) {
        *self.cache.write().await = None;
    }

    async fn jwks(&self) -> Result<JwkSet, AuthError> {
        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.as_ref().filter(|c| !c.is_expired()) {
                return Ok(cached.jwks.clone());
            }
        }

        let jwks = self.fetcher.fetch().await?;
        *self.cache.write().await = Some(JwksCache::new(jwks.clone(), self.config.cache_duration));
        Ok(jwks)
    }

    /// The key for `kid`, refetching the set once on a miss.
    async fn key_for(&self, kid: &str) -> Result<Jwk, AuthError> {
        if let Some(jwk) = self.jwks().await?.find(kid) {
            return Ok(jwk.clone());
        }

        tracing::info!(kid, "unknown signing key, refreshing JWKS");
        self.invalidate().await;
        self.jwks()
            .await?
            .find(kid)
            .cloned()
            .ok_or_else(|| {
                tracing::warn!(kid, "no matching key after refresh");
                AuthError::UnknownKey(kid.to_string())
            })
    }

    fn decoding_key(jwk: &Jwk) -> Result<(DecodingKey, Algorithm), AuthError> {
        let algorithm = match jwk.common.key_algorithm {
            Some(KeyAlgorithm::RS256) | None => Algorithm::RS256,
            Some(KeyAlgorithm::RS384) => Algorithm::RS384,
            Some(KeyAlgorithm::RS512) => Algorithm::RS512,
            Some(KeyAlgorithm::ES256) => Algorithm::ES256,
            Some(KeyAlgorithm::ES384) => Algorithm::ES384,
            Some(other) => {
                tracing::warn!(algorithm = ?other, "unsupported JWK algorithm");
                return Err(AuthError::InvalidToken);
            }
        };

        let key = DecodingKey::from_jwk(jwk).map_err(|e| {
            tracing::warn!(error = %e, "failed to create decoding key");
            AuthError::InvalidToken
        })?;
        Ok((key, algorithm))
    }

    fn validation(&self, algorithm: Algorithm) -> Validation {
        let mut validation = Validation::new(algorithm);
        match &self.config.issuer {
            Some(issuer) => validation.set_issuer(&[issuer]),
            None => validation.iss = None,
        }
        match &self.config.audience {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }
        validation.validate_exp = true;
        validation.set_required_spec_claims(&["exp", "sub"]);
        validation
    }
}

#[async_trait]
impl TokenVerifier for JwksTokenVerifier {
    async fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AuthError::MissingToken);
        }

        let header = decode_header(token).map_err(|e| {
            tracing::debug!(error = %e, "failed to decode JWT header");
            AuthError::InvalidToken
        })?;
        let kid = header.kid.as_deref().ok_or_else(|| {
            tracing::warn!("JWT missing 'kid' header");
            AuthError::InvalidToken
        })?;

        let jwk = self.key_for(kid).await?;
        let (key, algorithm) = Self::decoding_key(&jwk)?;

        let data = decode::<Claims>(token, &key, &self.validation(algorithm)).map_err(|e| {
            use jsonwebtoken::errors::ErrorKind;
            match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => {
                    tracing::warn!(error = %e, "token validation failed");
                    AuthError::InvalidToken
                }
            }
        })?;

        if data.claims.user_id().is_none() {
            return Err(AuthError::InvalidToken);
        }
        Ok(data.claims)
    }
}

impl std::fmt::Debug for JwksTokenVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwksTokenVerifier")
            .field("url", &self.config.url)
            .field("issuer", &self.config.issuer)
            .field("audience", &self.config.audience)
            .finish_non_exhaustive()
    }
}
