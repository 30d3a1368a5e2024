//! Application configuration module
//!
//! This module provides type-safe configuration loading from environment variables
//! using the `config` and `dotenvy` crates. Configuration is loaded with the
//! `SEAL_CONSULT` prefix and nested values use double underscores as separators.
//! Every section has defaults, so an empty environment yields a runnable
//! development configuration (except for the AI key).
//!
//! # Example
//!
//! ```no_run
//! use seal_consult::config::AppConfig;
//!
//! let config = AppConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//!
//! println!("Server running on {:?}", config.server.socket_addr());
//! ```

mod ai;
mod auth;
mod consult;
mod error;
mod rate_limit;
mod redis;
mod retrieval;
mod server;
mod streaming;

pub use ai::AiConfig;
pub use auth::AuthConfig;
pub use consult::ConsultConfig;
pub use error::{ConfigError, ValidationError};
pub use rate_limit::RateLimitConfig;
pub use redis::RedisConfig;
pub use retrieval::RetrievalConfig;
pub use server::{Environment, LogFormat, ServerConfig};
pub use streaming::StreamingConfig;

use serde::Deserialize;

/// Root application configuration
///
/// Load using [`AppConfig::load()`] which reads from environment variables.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// Server configuration (host, port, environment, logging)
    #[serde(default)]
    pub server: ServerConfig,

    /// Generation provider configuration
    #[serde(default)]
    pub ai: AiConfig,

    /// Coalescing, timeouts and frame limits
    #[serde(default)]
    pub streaming: StreamingConfig,

    /// Domains, routing and retrieval parameters
    #[serde(default)]
    pub consult: ConsultConfig,

    /// Per-chat turn limits
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Redis for checkpoints, memory and rate limits (optional)
    #[serde(default)]
    pub redis: RedisConfig,

    /// Token verification
    #[serde(default)]
    pub auth: AuthConfig,

    /// Retrieval service (optional)
    #[serde(default)]
    pub retrieval: RetrievalConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// This function:
    /// 1. Loads `.env` file if present (for development)
    /// 2. Reads environment variables with `SEAL_CONSULT` prefix
    /// 3. Uses `__` (double underscore) to separate nested values
    /// 4. Deserializes into typed configuration structs
    ///
    /// # Environment Variable Format
    ///
    /// - `SEAL_CONSULT__SERVER__PORT=8080` -> `server.port = 8080`
    /// - `SEAL_CONSULT__STREAMING__MIN_CHARS=24` -> `streaming.min_chars = 24`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if values cannot be parsed into expected types.
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if present (development)
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .prefix("SEAL_CONSULT")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Validate all configuration values
    ///
    /// # Errors
    ///
    /// Returns the first `ValidationError` of any section.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.server.validate()?;
        self.ai.validate()?;
        self.streaming.validate()?;
        self.consult.validate()?;
        self.rate_limit.validate()?;
        self.redis.validate()?;
        self.auth.validate(&self.server.environment)?;
        self.retrieval.validate()?;
        Ok(())
    }

    /// Check if running in production environment
    pub fn is_production(&self) -> bool {
        self.server.is_production()
    }
}
