//! Rate limiting port for protecting the consultation surfaces.
//!
//! This port defines the interface for rate limiting turns using a sliding
//! 60-second window per (user, chat). Implementations can use in-memory
//! storage for testing or Redis for production.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::foundation::UserId;

/// Port for rate limiting operations.
///
/// Implementations should be thread-safe and support concurrent access.
/// A check counts the request before any work begins.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Check if request is allowed, recording it if so.
    ///
    /// Returns `Allowed` with remaining quota or `Denied` with retry info.
    async fn check(&self, key: &RateLimitKey) -> Result<RateLimitResult, RateLimitError>;

    /// Get current rate limit status without recording a request.
    async fn status(&self, key: &RateLimitKey) -> Result<RateLimitStatus, RateLimitError>;

    /// Reset rate limit for a key (admin operation).
    async fn reset(&self, key: &RateLimitKey) -> Result<(), RateLimitError>;
}

/// Key identifying what to rate limit: one user in one chat.
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub struct RateLimitKey {
    pub user: String,
    pub chat: String,
}

impl RateLimitKey {
    pub fn new(user: &UserId, chat_id: &str) -> Self {
        let chat = chat_id.trim();
        Self {
            user: user.to_string(),
            chat: if chat.is_empty() { "default".to_string() } else { chat.to_string() },
        }
    }

    /// Returns the Redis key string for this rate limit key.
    pub fn to_redis_key(&self) -> String {
        format!("ws:ratelimit:{}:{}", self.user, self.chat)
    }
}

/// Result of a rate limit check.
#[derive(Debug, Clone)]
pub enum RateLimitResult {
    /// Request is allowed; includes current status.
    Allowed(RateLimitStatus),
    /// Request is denied; includes denial details.
    Denied(RateLimitDenied),
}

impl RateLimitResult {
    /// Returns true if the request was allowed.
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateLimitResult::Allowed(_))
    }

    /// Returns true if the request was denied.
    pub fn is_denied(&self) -> bool {
        matches!(self, RateLimitResult::Denied(_))
    }
}

/// Current rate limit status.
#[derive(Debug, Clone)]
pub struct RateLimitStatus {
    /// Maximum requests allowed in the window.
    pub limit: u32,
    /// Remaining requests in the current window.
    pub remaining: u32,
    /// When the oldest counted request leaves the window.
    pub reset_at: DateTime<Utc>,
    /// Window duration in seconds.
    pub window_secs: u32,
}

/// Details of a rate limit denial.
#[derive(Debug, Clone)]
pub struct RateLimitDenied {
    /// Maximum requests allowed in the window.
    pub limit: u32,
    /// Seconds until the client should retry.
    pub retry_after_secs: u32,
    /// Human-readable message explaining the denial.
    pub message: String,
}

impl RateLimitDenied {
    pub fn new(limit: u32, retry_after_secs: u32) -> Self {
        Self {
            limit,
            retry_after_secs,
            message: format!(
                "Rate limit of {} requests per minute exceeded, retry in {}s",
                limit, retry_after_secs
            ),
        }
    }
}

/// Errors that can occur during rate limiting operations.
#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    /// Rate limiter backend is unavailable.
    #[error("rate limiter unavailable: {0}")]
    Unavailable(String),

    /// Invalid rate limit key provided.
    #[error("invalid key: {0}")]
    InvalidKey(String),
}
