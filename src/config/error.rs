//! Configuration error types

use thiserror::Error;

/// Errors that can occur during configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration loading failed: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),
}

/// Errors that can occur during configuration validation
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("Required configuration missing: {0}")]
    MissingRequired(&'static str),

    #[error("Invalid port number")]
    InvalidPort,

    #[error("Invalid bind host: {0}")]
    InvalidHost(String),

    #[error("Invalid timeout: {0}")]
    InvalidTimeout(&'static str),

    #[error("Invalid URL: {0}")]
    InvalidUrl(&'static str),

    #[error("Invalid Redis URL format")]
    InvalidRedisUrl,

    #[error("URL must use HTTPS in production: {0}")]
    MustBeHttps(&'static str),

    #[error("Value out of range: {0}")]
    OutOfRange(&'static str),

    #[error("Invalid domain list: {0}")]
    InvalidDomains(String),
}
