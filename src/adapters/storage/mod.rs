//! Storage Adapters
//!
//! Implementations of the CheckpointStore and MemoryStore ports.
//!
//! ## Available Adapters
//!
//! - **InMemoryCheckpointStore / InMemoryMemoryStore** - Process memory (testing/development)
//! - **RedisCheckpointStore / RedisMemoryStore** - Redis keys shared across instances
//!
//! ## Usage
//!
//! ```ignore
//! use adapters::storage::{InMemoryCheckpointStore, RedisMemoryStore};
//!
//! // Production: Redis-backed short-term memory
//! let memory = RedisMemoryStore::new(conn.clone());
//!
//! // Testing: in-memory checkpoints
//! let checkpoints = InMemoryCheckpointStore::new();
//! ```

mod in_memory;
mod redis;

pub use in_memory::{InMemoryCheckpointStore, InMemoryMemoryStore};
pub use redis::{RedisCheckpointStore, RedisMemoryStore, STM_MAX_ENTRIES, STM_READ_LIMIT, STM_TTL_SECS};
