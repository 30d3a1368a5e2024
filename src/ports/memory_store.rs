//! Short-term memory port: the recent transcript of a thread.

use async_trait::async_trait;

use super::checkpoint_store::StoreError;
use crate::domain::consult::{Message, Role};
use crate::domain::foundation::ThreadId;

/// Append-only transcript with bounded reads.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// The last `limit` messages of a thread, oldest first.
    async fn read(&self, thread_id: &ThreadId, limit: usize) -> Result<Vec<Message>, StoreError>;

    /// Appends one message to the thread's transcript.
    async fn append(&self, thread_id: &ThreadId, role: Role, content: &str) -> Result<(), StoreError>;
}
