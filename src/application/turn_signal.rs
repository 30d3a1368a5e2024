//! Per-thread turn tracking for the streaming surface.
//!
//! Every in-flight turn owns a [`TurnSignal`]. The signal carries the
//! cancellation flag checked by oracle loops and guards the turn's single
//! terminal `done` frame: emission and cancellation take the same lock, so
//! once a cancel has sent `done` no further frame of that turn can follow.
//!
//! ```text
//! CancelRegistry
//! ├── api:chat-1 -> TurnSignal (running)
//! └── api:chat-2 -> TurnSignal (finished)
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex, RwLock};

use crate::domain::foundation::ThreadId;
use crate::domain::streaming::ServerEvent;

/// Outbound frame channel of one connection.
pub type Outbound = mpsc::UnboundedSender<ServerEvent>;

/// Cancellation flag plus terminal-event guard of one turn.
#[derive(Debug, Default)]
pub struct TurnSignal {
    cancelled: AtomicBool,
    finished: Mutex<bool>,
}

impl TurnSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// True once `done` was sent, by the turn or by a cancel.
    pub async fn is_finished(&self) -> bool {
        *self.finished.lock().await
    }
}

/// Emits the frames of one turn to a connection.
#[derive(Debug, Clone)]
pub struct TurnEmitter {
    thread_id: ThreadId,
    signal: Arc<TurnSignal>,
    out: Outbound,
}

impl TurnEmitter {
    pub fn new(thread_id: ThreadId, signal: Arc<TurnSignal>, out: Outbound) -> Self {
        Self { thread_id, signal, out }
    }

    pub fn thread_id(&self) -> &ThreadId {
        &self.thread_id
    }

    pub fn signal(&self) -> &Arc<TurnSignal> {
        &self.signal
    }

    pub fn is_cancelled(&self) -> bool {
        self.signal.is_cancelled()
    }

    /// Sends a non-terminal frame. Dropped once the turn ended or was cancelled.
    pub async fn emit(&self, event: ServerEvent) -> bool {
        let finished = self.signal.finished.lock().await;
        if *finished || self.signal.is_cancelled() {
            return false;
        }
        self.out.send(event).is_ok()
    }

    /// Sends `done` unless the turn already ended. Returns true if this call sent it.
    pub async fn finish(&self) -> bool {
        let mut finished = self.signal.finished.lock().await;
        if *finished {
            return false;
        }
        *finished = true;
        let _ = self.out.send(ServerEvent::done(self.thread_id.as_str()));
        true
    }

    /// Cancels the turn and sends its `done`. False when it had already ended.
    pub async fn cancel(&self) -> bool {
        let mut finished = self.signal.finished.lock().await;
        if *finished {
            return false;
        }
        self.signal.cancelled.store(true, Ordering::SeqCst);
        *finished = true;
        let _ = self.out.send(ServerEvent::done(self.thread_id.as_str()));
        true
    }
}

/// Rejection of a turn for a thread that already has one running.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("a turn is already in progress for {0}")]
pub struct TurnInProgress(pub ThreadId);

/// Turn signals by thread, shared by all connections.
#[derive(Debug, Default)]
pub struct CancelRegistry {
    turns: RwLock<HashMap<ThreadId, Arc<TurnSignal>>>,
}

impl CancelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a fresh signal for a new turn, clearing any old cancel flag.
    ///
    /// Fails while the previous turn of the thread has not ended.
    pub async fn begin(&self, thread_id: &ThreadId) -> Result<Arc<TurnSignal>, TurnInProgress> {
        let mut turns = self.turns.write().await;
        if let Some(existing) = turns.get(thread_id) {
            if !existing.is_finished().await {
                return Err(TurnInProgress(thread_id.clone()));
            }
        }
        let signal = Arc::new(TurnSignal::new());
        turns.insert(thread_id.clone(), Arc::clone(&signal));
        Ok(signal)
    }

    /// The signal of the thread's current or last turn.
    pub async fn get(&self, thread_id: &ThreadId) -> Option<Arc<TurnSignal>> {
        self.turns.read().await.get(thread_id).cloned()
    }

    /// Removes `signal` if it is still the thread's current one.
    pub async fn release(&self, thread_id: &ThreadId, signal: &Arc<TurnSignal>) {
        let mut turns = self.turns.write().await;
        if turns.get(thread_id).map_or(false, |current| Arc::ptr_eq(current, signal)) {
            turns.remove(thread_id);
        }
    }

    /// Number of tracked threads (for monitoring).
    pub async fn active_count(&self) -> usize {
        self.turns.read().await.len()
    }
}
