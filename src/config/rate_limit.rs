//! Rate limit configuration

use serde::Deserialize;

use super::error::ValidationError;
use crate::adapters::rate_limiter::SlidingWindow;

/// Turns allowed per (user, chat) in a sliding minute
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_per_minute")]
    pub per_minute: u32,
}

impl RateLimitConfig {
    pub fn window(&self) -> SlidingWindow {
        SlidingWindow::per_minute(self.per_minute)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.per_minute == 0 {
            return Err(ValidationError::OutOfRange("rate_limit.per_minute"));
        }
        Ok(())
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            per_minute: default_per_minute(),
        }
    }
}

fn default_per_minute() -> u32 {
    30
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_window() {
        assert_eq!(RateLimitConfig::default().window(), SlidingWindow::default());
    }

    #[test]
    fn test_zero_limit_rejected() {
        assert!(RateLimitConfig { per_minute: 0 }.validate().is_err());
    }
}
