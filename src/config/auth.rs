//! Authentication configuration

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;
use super::server::Environment;

/// Token verification configuration
///
/// With `jwks_url` set, tokens are verified against the published key set.
/// Without it, development builds accept any non-blank token.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// JWKS endpoint of the identity provider
    pub jwks_url: Option<String>,

    /// Expected `iss` claim
    pub issuer: Option<String>,

    /// Expected `aud` claim
    pub audience: Option<String>,

    /// JWKS cache TTL in seconds
    #[serde(default = "default_jwks_cache_secs")]
    pub jwks_cache_secs: u64,
}

impl AuthConfig {
    /// Get JWKS cache TTL as Duration
    pub fn jwks_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.jwks_cache_secs)
    }

    /// The JWKS URL, if configured and non-blank
    pub fn jwks_url(&self) -> Option<&str> {
        self.jwks_url.as_deref().map(str::trim).filter(|u| !u.is_empty())
    }

    /// Validate authentication configuration
    ///
    /// Production requires a JWKS endpoint served over HTTPS.
    pub fn validate(&self, environment: &Environment) -> Result<(), ValidationError> {
        if *environment != Environment::Production {
            return Ok(());
        }
        match self.jwks_url() {
            None => Err(ValidationError::MissingRequired("AUTH__JWKS_URL")),
            Some(url) if !url.starts_with("https://") => Err(ValidationError::MustBeHttps("auth.jwks_url")),
            Some(_) => Ok(()),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwks_url: None,
            issuer: None,
            audience: None,
            jwks_cache_secs: default_jwks_cache_secs(),
        }
    }
}

fn default_jwks_cache_secs() -> u64 {
    3600
}
