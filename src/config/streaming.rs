//! Streaming delivery configuration

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;
use crate::application::StreamSettings;
use crate::domain::streaming::{CoalescePolicy, FrameLimits};

/// Coalescing, timeouts and frame limits of the WebSocket surface
#[derive(Debug, Clone, Deserialize)]
pub struct StreamingConfig {
    /// Flush once this many characters are buffered
    #[serde(default = "default_min_chars")]
    pub min_chars: usize,

    /// Flush once the buffer is this old
    #[serde(default = "default_max_latency_ms")]
    pub max_latency_ms: u64,

    /// Wait for the first fragment before answering with one blocking call
    #[serde(default = "default_first_token_timeout_ms")]
    pub first_token_timeout_ms: u64,

    /// Receive silence before an `idle` heartbeat
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,

    /// Upper bound on one streamed turn
    #[serde(default = "default_event_timeout_secs")]
    pub event_timeout_secs: u64,

    /// Maximum characters of `input`
    #[serde(default = "default_input_max_chars")]
    pub input_max_chars: usize,

    /// Send the full answer as `final` before `done`
    #[serde(default)]
    pub emit_final: bool,

    /// Capacity of the graph event channel
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl StreamingConfig {
    pub fn coalesce_policy(&self) -> CoalescePolicy {
        CoalescePolicy {
            min_chars: self.min_chars,
            max_latency: Duration::from_millis(self.max_latency_ms),
        }
    }

    pub fn frame_limits(&self) -> FrameLimits {
        FrameLimits {
            input_max_chars: self.input_max_chars,
        }
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn stream_settings(&self) -> StreamSettings {
        StreamSettings {
            coalesce: self.coalesce_policy(),
            first_token_timeout: Duration::from_millis(self.first_token_timeout_ms),
            event_timeout: Duration::from_secs(self.event_timeout_secs),
            channel_capacity: self.channel_capacity,
            emit_final: self.emit_final,
        }
    }

    /// Validate streaming configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.min_chars == 0 {
            return Err(ValidationError::OutOfRange("streaming.min_chars"));
        }
        if self.input_max_chars == 0 {
            return Err(ValidationError::OutOfRange("streaming.input_max_chars"));
        }
        if self.channel_capacity == 0 {
            return Err(ValidationError::OutOfRange("streaming.channel_capacity"));
        }
        if self.event_timeout_secs == 0 {
            return Err(ValidationError::InvalidTimeout("streaming.event_timeout_secs"));
        }
        if self.idle_timeout_secs == 0 {
            return Err(ValidationError::InvalidTimeout("streaming.idle_timeout_secs"));
        }
        if self.first_token_timeout_ms >= self.event_timeout_secs.saturating_mul(1000) {
            return Err(ValidationError::InvalidTimeout("streaming.first_token_timeout_ms"));
        }
        Ok(())
    }
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            min_chars: default_min_chars(),
            max_latency_ms: default_max_latency_ms(),
            first_token_timeout_ms: default_first_token_timeout_ms(),
            idle_timeout_secs: default_idle_timeout_secs(),
            event_timeout_secs: default_event_timeout_secs(),
            input_max_chars: default_input_max_chars(),
            emit_final: false,
            channel_capacity: default_channel_capacity(),
        }
    }
}

fn default_min_chars() -> usize {
    24
}

fn default_max_latency_ms() -> u64 {
    40
}

fn default_first_token_timeout_ms() -> u64 {
    2000
}

fn default_idle_timeout_secs() -> u64 {
    45
}

fn default_event_timeout_secs() -> u64 {
    25
}

fn default_input_max_chars() -> usize {
    4000
}

fn default_channel_capacity() -> usize {
    64
}
