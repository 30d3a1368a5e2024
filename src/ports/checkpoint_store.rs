//! Checkpoint Store Port - Interface for persisting consultation state.
//!
//! The whole [`ConsultState`] of a thread is loaded at turn start and saved
//! back at turn end. There are no field-level transactions; the single
//! in-flight turn per thread makes last-writer-wins acceptable. State is
//! retired only by the backend's TTL.

use async_trait::async_trait;

use crate::domain::consult::ConsultState;
use crate::domain::foundation::ThreadId;

/// Errors that can occur during store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Failed to serialize state: {0}")]
    SerializationFailed(String),

    #[error("Failed to deserialize state: {0}")]
    DeserializationFailed(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Port for persisting and loading consultation state.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Load the state of a thread.
    ///
    /// # Returns
    /// `None` when the thread has no checkpoint yet.
    async fn load(&self, thread_id: &ThreadId) -> Result<Option<ConsultState>, StoreError>;

    /// Save the state of a thread, replacing any previous checkpoint.
    async fn save(&self, thread_id: &ThreadId, state: &ConsultState) -> Result<(), StoreError>;
}
