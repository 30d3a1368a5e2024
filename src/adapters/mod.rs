//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the consultation core to external systems:
//! - `ai` - OpenAI-compatible generation, failover and a scriptable mock
//! - `auth` - JWKS, development and mock token verifiers
//! - `http` - axum routes for the WebSocket and synchronous surfaces
//! - `rate_limiter` - Sliding-window limiters (in-memory, Redis)
//! - `retrieval` - Hybrid retrieval over HTTP and a static retriever
//! - `storage` - Checkpoint and short-term memory stores (in-memory, Redis)

pub mod ai;
pub mod auth;
pub mod http;
pub mod rate_limiter;
pub mod retrieval;
pub mod storage;

pub use ai::{FailoverAIProvider, MockAIProvider, OpenAIConfig, OpenAIProvider};
pub use auth::{DevTokenVerifier, JwksConfig, JwksTokenVerifier, MockTokenVerifier};
pub use rate_limiter::{InMemoryRateLimiter, RedisRateLimiter, SlidingWindow};
pub use retrieval::{HttpRetriever, HttpRetrieverConfig, StaticRetriever};
pub use storage::{InMemoryCheckpointStore, InMemoryMemoryStore, RedisCheckpointStore, RedisMemoryStore};
