//! In-memory rate limiter implementation for testing and development.
//!
//! Keeps the request timestamps of each key and counts those inside the
//! sliding window. Not suitable for multi-server deployments.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::ports::{
    RateLimitDenied, RateLimitError, RateLimitKey, RateLimitResult, RateLimitStatus, RateLimiter,
};

use super::config::SlidingWindow;

/// In-memory sliding-window rate limiter.
#[derive(Debug, Clone)]
pub struct InMemoryRateLimiter {
    window: SlidingWindow,
    /// Request timestamps (unix millis) per key, oldest first.
    requests: Arc<RwLock<HashMap<String, VecDeque<i64>>>>,
}

impl InMemoryRateLimiter {
    pub fn new(window: SlidingWindow) -> Self {
        Self {
            window,
            requests: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Create a rate limiter with the default window.
    pub fn with_defaults() -> Self {
        Self::new(SlidingWindow::default())
    }

    /// Counts a request at `now_ms`.
    async fn check_at(&self, key: &RateLimitKey, now_ms: i64) -> RateLimitResult {
        let mut requests = self.requests.write().await;
        let stamps = requests.entry(key.to_redis_key()).or_default();
        self.evict(stamps, now_ms);

        if stamps.len() >= self.window.limit as usize {
            let oldest = stamps.front().copied().unwrap_or(now_ms);
            return RateLimitResult::Denied(RateLimitDenied::new(
                self.window.limit,
                self.window.retry_after(oldest, now_ms),
            ));
        }

        stamps.push_back(now_ms);
        RateLimitResult::Allowed(self.status_of(stamps, now_ms))
    }

    fn evict(&self, stamps: &mut VecDeque<i64>, now_ms: i64) {
        let cutoff = now_ms - self.window.window_millis();
        while stamps.front().map_or(false, |&t| t <= cutoff) {
            stamps.pop_front();
        }
    }

    fn status_of(&self, stamps: &VecDeque<i64>, now_ms: i64) -> RateLimitStatus {
        let oldest = stamps.front().copied().unwrap_or(now_ms);
        RateLimitStatus {
            limit: self.window.limit,
            remaining: self.window.limit.saturating_sub(stamps.len() as u32),
            reset_at: millis_to_datetime(oldest + self.window.window_millis()),
            window_secs: self.window.window_secs,
        }
    }
}

fn millis_to_datetime(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_else(Utc::now)
}

#[async_trait]
impl RateLimiter for InMemoryRateLimiter {
    async fn check(&self, key: &RateLimitKey) -> Result<RateLimitResult, RateLimitError> {
        Ok(self.check_at(key, Utc::now().timestamp_millis()).await)
    }

    async fn status(&self, key: &RateLimitKey) -> Result<RateLimitStatus, RateLimitError> {
        let now_ms = Utc::now().timestamp_millis();
        let requests = self.requests.read().await;
        let mut stamps = requests.get(&key.to_redis_key()).cloned().unwrap_or_default();
        self.evict(&mut stamps, now_ms);
        Ok(self.status_of(&stamps, now_ms))
    }

    async fn reset(&self, key: &RateLimitKey) -> Result<(), RateLimitError> {
        self.requests.write().await.remove(&key.to_redis_key());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::UserId;

    fn key(chat: &str) -> RateLimitKey {
        RateLimitKey::new(&UserId::new("user-123").unwrap(), chat)
    }

    fn limiter(limit: u32) -> InMemoryRateLimiter {
        InMemoryRateLimiter::new(SlidingWindow::per_minute(limit))
    }

    #[tokio::test]
    async fn allows_requests_within_limit() {
        let limiter = limiter(3);
        for _ in 0..3 {
            assert!(limiter.check(&key("c1")).await.unwrap().is_allowed());
        }
    }

    #[tokio::test]
    async fn denies_requests_at_limit() {
        let limiter = limiter(2);
        limiter.check_at(&key("c1"), 0).await;
        limiter.check_at(&key("c1"), 1_000).await;

        match limiter.check_at(&key("c1"), 2_000).await {
            RateLimitResult::Denied(denied) => {
                assert_eq!(denied.limit, 2);
                assert_eq!(denied.retry_after_secs, 58);
            }
            other => panic!("expected denial, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn window_slides_past_old_requests() {
        let limiter = limiter(2);
        limiter.check_at(&key("c1"), 0).await;
        limiter.check_at(&key("c1"), 30_000).await;
        assert!(limiter.check_at(&key("c1"), 59_000).await.is_denied());
        // The first request leaves the window after 60s; the second is still counted.
        assert!(limiter.check_at(&key("c1"), 60_001).await.is_allowed());
        assert!(limiter.check_at(&key("c1"), 60_002).await.is_denied());
    }

    #[tokio::test]
    async fn denied_requests_are_not_counted() {
        let limiter = limiter(1);
        limiter.check_at(&key("c1"), 0).await;
        for t in 1..10 {
            assert!(limiter.check_at(&key("c1"), t * 1_000).await.is_denied());
        }
        assert!(limiter.check_at(&key("c1"), 60_001).await.is_allowed());
    }

    #[tokio::test]
    async fn chats_have_independent_limits() {
        let limiter = limiter(1);
        assert!(limiter.check(&key("c1")).await.unwrap().is_allowed());
        assert!(limiter.check(&key("c2")).await.unwrap().is_allowed());
        assert!(limiter.check(&key("c1")).await.unwrap().is_denied());
    }

    #[tokio::test]
    async fn status_reports_remaining_without_counting() {
        let limiter = limiter(5);
        limiter.check(&key("c1")).await.unwrap();
        let status = limiter.status(&key("c1")).await.unwrap();
        assert_eq!(status.remaining, 4);
        assert_eq!(limiter.status(&key("c1")).await.unwrap().remaining, 4);
    }

    #[tokio::test]
    async fn reset_clears_counter() {
        let limiter = limiter(1);
        limiter.check(&key("c1")).await.unwrap();
        limiter.reset(&key("c1")).await.unwrap();
        assert!(limiter.check(&key("c1")).await.unwrap().is_allowed());
    }
}
