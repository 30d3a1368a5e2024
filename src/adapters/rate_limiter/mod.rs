//! Rate limiter adapters.
//!
//! Implementations of the RateLimiter port for different backends.
//!
//! ## Available Adapters
//!
//! - `InMemoryRateLimiter` - In-memory for testing and single-server
//! - `RedisRateLimiter` - Redis sorted sets for multi-server
//!
//! ## Usage
//!
//! ```ignore
//! use seal_consult::adapters::rate_limiter::{InMemoryRateLimiter, SlidingWindow};
//!
//! // For testing
//! let limiter = InMemoryRateLimiter::with_defaults();
//!
//! // For production
//! let limiter = RedisRateLimiter::new(conn, SlidingWindow::per_minute(30));
//! ```

mod config;
mod in_memory;
mod redis;

pub use config::SlidingWindow;
pub use in_memory::InMemoryRateLimiter;
pub use redis::RedisRateLimiter;
