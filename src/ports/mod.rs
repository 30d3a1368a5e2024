//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the consultation core and the outside world. Adapters implement these
//! ports.
//!
//! - `AIProvider` - Generation oracle (complete / stream)
//! - `Retriever` - Ranked evidence retrieval
//! - `CheckpointStore` - Per-thread consultation state
//! - `MemoryStore` - Short-term transcript memory
//! - `RateLimiter` - Sliding-window turn limits
//! - `TokenVerifier` - Bearer token verification

mod ai_provider;
mod checkpoint_store;
mod memory_store;
mod rate_limiter;
mod retriever;
mod token_verifier;

pub use ai_provider::{
    AIError, AIProvider, CompletionRequest, CompletionResponse, FinishReason, Message, MessageRole,
    ProviderInfo, RequestMetadata, StreamChunk, TokenUsage,
};
pub use checkpoint_store::{CheckpointStore, StoreError};
pub use memory_store::MemoryStore;
pub use rate_limiter::{
    RateLimitDenied, RateLimitError, RateLimitKey, RateLimitResult, RateLimitStatus, RateLimiter,
};
pub use retriever::{RetrievalError, RetrievalRequest, Retriever};
pub use token_verifier::{AuthError, Claims, TokenVerifier};
