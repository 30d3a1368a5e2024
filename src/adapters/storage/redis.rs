//! Redis-backed checkpoint and short-term memory stores.
//!
//! - checkpoints: `chat:ckpt:{thread_id}` holding the state as JSON
//! - short-term memory: `chat:stm:{thread_id}:messages`, a list of
//!   `{role, content}` JSON entries trimmed to the last 200 and expiring
//!   after seven days

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;

use crate::domain::consult::{ConsultState, Message, Role};
use crate::domain::foundation::ThreadId;
use crate::ports::{CheckpointStore, MemoryStore, StoreError};

/// Entries kept per thread.
pub const STM_MAX_ENTRIES: usize = 200;
/// Entries read back per turn.
pub const STM_READ_LIMIT: usize = 80;
/// Expiry of a thread's memory after its last append.
pub const STM_TTL_SECS: i64 = 604_800;

fn unavailable(e: redis::RedisError) -> StoreError {
    StoreError::Unavailable(e.to_string())
}

fn checkpoint_key(thread_id: &ThreadId) -> String {
    format!("chat:ckpt:{}", thread_id)
}

fn stm_key(thread_id: &ThreadId) -> String {
    format!("chat:stm:{}:messages", thread_id)
}

/// Checkpoint store on Redis strings.
#[derive(Clone)]
pub struct RedisCheckpointStore {
    conn: MultiplexedConnection,
}

impl RedisCheckpointStore {
    pub fn new(conn: MultiplexedConnection) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl CheckpointStore for RedisCheckpointStore {
    async fn load(&self, thread_id: &ThreadId) -> Result<Option<ConsultState>, StoreError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(checkpoint_key(thread_id)).await.map_err(unavailable)?;
        raw.map(|raw| {
            serde_json::from_str(&raw).map_err(|e| StoreError::DeserializationFailed(e.to_string()))
        })
        .transpose()
    }

    async fn save(&self, thread_id: &ThreadId, state: &ConsultState) -> Result<(), StoreError> {
        let raw = serde_json::to_string(state).map_err(|e| StoreError::SerializationFailed(e.to_string()))?;
        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(checkpoint_key(thread_id), raw, STM_TTL_SECS as u64)
            .await
            .map_err(unavailable)
    }
}

impl std::fmt::Debug for RedisCheckpointStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCheckpointStore").finish_non_exhaustive()
    }
}

/// Short-term memory on a Redis list.
#[derive(Clone)]
pub struct RedisMemoryStore {
    conn: MultiplexedConnection,
}

impl RedisMemoryStore {
    pub fn new(conn: MultiplexedConnection) -> Self {
        Self { conn }
    }
}

fn decode_entries(raw: Vec<String>) -> Vec<Message> {
    raw.iter()
        .filter_map(|entry| match serde_json::from_str::<Message>(entry) {
            Ok(message) => Some(message),
            Err(e) => {
                tracing::warn!(error = %e, "skipping malformed memory entry");
                None
            }
        })
        .collect()
}

#[async_trait]
impl MemoryStore for RedisMemoryStore {
    async fn read(&self, thread_id: &ThreadId, limit: usize) -> Result<Vec<Message>, StoreError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let mut conn = self.conn.clone();
        let start = -(limit.min(isize::MAX as usize) as isize);
        let raw: Vec<String> = conn.lrange(stm_key(thread_id), start, -1).await.map_err(unavailable)?;
        Ok(decode_entries(raw))
    }

    async fn append(&self, thread_id: &ThreadId, role: Role, content: &str) -> Result<(), StoreError> {
        let entry = serde_json::to_string(&Message::new(role, content))
            .map_err(|e| StoreError::SerializationFailed(e.to_string()))?;
        let key = stm_key(thread_id);
        let mut conn = self.conn.clone();
        redis::pipe()
            .atomic()
            .rpush(&key, entry)
            .ignore()
            .ltrim(&key, -(STM_MAX_ENTRIES as isize), -1)
            .ignore()
            .expire(&key, STM_TTL_SECS)
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(unavailable)
    }
}

impl std::fmt::Debug for RedisMemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisMemoryStore").finish_non_exhaustive()
    }
}
