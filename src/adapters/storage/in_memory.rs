//! In-Memory Storage Adapters
//!
//! Stores checkpoints and short-term memory in memory.
//! Useful for testing and single-instance development.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::consult::{ConsultState, Message, Role};
use crate::domain::foundation::ThreadId;
use crate::ports::{CheckpointStore, MemoryStore, StoreError};

use super::redis::STM_MAX_ENTRIES;

/// In-memory checkpoint store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCheckpointStore {
    states: Arc<RwLock<HashMap<ThreadId, ConsultState>>>,
}

impl InMemoryCheckpointStore {
    /// Create a new in-memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the number of stored checkpoints
    pub async fn len(&self) -> usize {
        self.states.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.states.read().await.is_empty()
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn load(&self, thread_id: &ThreadId) -> Result<Option<ConsultState>, StoreError> {
        Ok(self.states.read().await.get(thread_id).cloned())
    }

    async fn save(&self, thread_id: &ThreadId, state: &ConsultState) -> Result<(), StoreError> {
        self.states.write().await.insert(thread_id.clone(), state.clone());
        Ok(())
    }
}

/// In-memory short-term memory, capped like the Redis list.
#[derive(Debug, Clone, Default)]
pub struct InMemoryMemoryStore {
    messages: Arc<RwLock<HashMap<ThreadId, Vec<Message>>>>,
}

impl InMemoryMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MemoryStore for InMemoryMemoryStore {
    async fn read(&self, thread_id: &ThreadId, limit: usize) -> Result<Vec<Message>, StoreError> {
        let messages = self.messages.read().await;
        let history = messages.get(thread_id).map(Vec::as_slice).unwrap_or_default();
        let skip = history.len().saturating_sub(limit);
        Ok(history[skip..].to_vec())
    }

    async fn append(&self, thread_id: &ThreadId, role: Role, content: &str) -> Result<(), StoreError> {
        let mut messages = self.messages.write().await;
        let history = messages.entry(thread_id.clone()).or_default();
        history.push(Message::new(role, content));
        if history.len() > STM_MAX_ENTRIES {
            let excess = history.len() - STM_MAX_ENTRIES;
            history.drain(..excess);
        }
        Ok(())
    }
}
