//! Sliding-window parameters shared by the rate limiter adapters.

use serde::{Deserialize, Serialize};

/// Limit and window length of a sliding-window limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlidingWindow {
    /// Maximum requests counted inside one window.
    pub limit: u32,
    /// Window length in seconds.
    pub window_secs: u32,
}

impl SlidingWindow {
    pub fn per_minute(limit: u32) -> Self {
        Self { limit, window_secs: 60 }
    }

    pub(crate) fn window_millis(&self) -> i64 {
        i64::from(self.window_secs) * 1000
    }

    /// Seconds until a request made at `oldest_ms` leaves the window, at least one.
    pub(crate) fn retry_after(&self, oldest_ms: i64, now_ms: i64) -> u32 {
        let remaining_ms = (oldest_ms + self.window_millis() - now_ms).max(0);
        let secs = (remaining_ms + 999) / 1000;
        u32::try_from(secs).unwrap_or(self.window_secs).max(1)
    }
}

impl Default for SlidingWindow {
    fn default() -> Self {
        Self::per_minute(30)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_thirty_per_minute() {
        let window = SlidingWindow::default();
        assert_eq!(window.limit, 30);
        assert_eq!(window.window_secs, 60);
    }

    #[test]
    fn retry_after_rounds_up_and_never_reaches_zero() {
        let window = SlidingWindow::per_minute(1);
        assert_eq!(window.retry_after(0, 59_500), 1);
        assert_eq!(window.retry_after(0, 1_000), 59);
        assert_eq!(window.retry_after(0, 90_000), 1);
    }
}
