//! Redis-backed rate limiter implementation for production deployments.
//!
//! Sliding window over a sorted set per key: members are request ids scored
//! by their unix-millisecond timestamp. Suitable for multi-server
//! deployments.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use uuid::Uuid;

use crate::ports::{
    RateLimitDenied, RateLimitError, RateLimitKey, RateLimitResult, RateLimitStatus, RateLimiter,
};

use super::config::SlidingWindow;

/// Redis-backed sliding-window rate limiter.
///
/// A check runs one atomic pipeline:
/// 1. ZREMRANGEBYSCORE drops entries older than the window
/// 2. ZCARD counts what is left
/// 3. ZRANGE fetches the oldest entry for the retry hint
///
/// and then ZADDs the new request only when the count is below the limit.
/// Two concurrent checks can both see `limit - 1`, so the window may
/// briefly admit one extra request.
#[derive(Clone)]
pub struct RedisRateLimiter {
    conn: MultiplexedConnection,
    window: SlidingWindow,
}

fn unavailable(e: redis::RedisError) -> RateLimitError {
    RateLimitError::Unavailable(e.to_string())
}

impl RedisRateLimiter {
    pub fn new(conn: MultiplexedConnection, window: SlidingWindow) -> Self {
        Self { conn, window }
    }

    /// Evicts expired entries and returns (count, oldest score).
    async fn window_state(&self, redis_key: &str, now_ms: i64) -> Result<(u32, Option<i64>), RateLimitError> {
        let mut conn = self.conn.clone();
        let cutoff = now_ms - self.window.window_millis();
        let (count, oldest): (u32, Vec<(String, f64)>) = redis::pipe()
            .atomic()
            .zrembyscore(redis_key, "-inf", cutoff)
            .ignore()
            .zcard(redis_key)
            .zrange_withscores(redis_key, 0, 0)
            .query_async(&mut conn)
            .await
            .map_err(unavailable)?;
        Ok((count, oldest.first().map(|(_, score)| *score as i64)))
    }

    fn status_from(&self, count: u32, oldest: Option<i64>, now_ms: i64) -> RateLimitStatus {
        let reset_ms = oldest.unwrap_or(now_ms) + self.window.window_millis();
        RateLimitStatus {
            limit: self.window.limit,
            remaining: self.window.limit.saturating_sub(count),
            reset_at: Utc.timestamp_millis_opt(reset_ms).single().unwrap_or_else(Utc::now),
            window_secs: self.window.window_secs,
        }
    }
}

#[async_trait]
impl RateLimiter for RedisRateLimiter {
    async fn check(&self, key: &RateLimitKey) -> Result<RateLimitResult, RateLimitError> {
        let redis_key = key.to_redis_key();
        let now_ms = Utc::now().timestamp_millis();
        let (count, oldest) = self.window_state(&redis_key, now_ms).await?;

        if count >= self.window.limit {
            let retry_after = self.window.retry_after(oldest.unwrap_or(now_ms), now_ms);
            return Ok(RateLimitResult::Denied(RateLimitDenied::new(self.window.limit, retry_after)));
        }

        let member = format!("{}:{}", now_ms, Uuid::new_v4());
        let mut conn = self.conn.clone();
        redis::pipe()
            .atomic()
            .zadd(&redis_key, member, now_ms)
            .ignore()
            .expire(&redis_key, i64::from(self.window.window_secs))
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(unavailable)?;

        Ok(RateLimitResult::Allowed(self.status_from(
            count + 1,
            oldest.or(Some(now_ms)),
            now_ms,
        )))
    }

    async fn status(&self, key: &RateLimitKey) -> Result<RateLimitStatus, RateLimitError> {
        let now_ms = Utc::now().timestamp_millis();
        let (count, oldest) = self.window_state(&key.to_redis_key(), now_ms).await?;
        Ok(self.status_from(count, oldest, now_ms))
    }

    async fn reset(&self, key: &RateLimitKey) -> Result<(), RateLimitError> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(key.to_redis_key()).await.map_err(unavailable)
    }
}

impl std::fmt::Debug for RedisRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisRateLimiter")
            .field("window", &self.window)
            .finish_non_exhaustive()
    }
}
