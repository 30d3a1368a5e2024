//! Turn execution: checkpoint in, graph run, checkpoint and memory out.
//!
//! [`ConsultService`] is shared by both surfaces. The streaming surface
//! prepares the state itself so it can announce the route before the graph
//! starts; the synchronous surface calls [`ConsultService::invoke`].

use std::sync::Arc;

use thiserror::Error;

use crate::application::consult::{ConsultDeps, Graph, GraphError, GraphRun, GraphSink, NodeContext};
use crate::domain::consult::{smalltalk, ConsultState, Message, Params, Role, Route};
use crate::domain::foundation::{ThreadId, TurnId, UserId};
use crate::ports::{
    AIProvider, CheckpointStore, CompletionRequest, MemoryStore, RateLimitDenied, RateLimitKey,
    RateLimitResult, RateLimiter, RequestMetadata,
};

/// Messages of short-term memory loaded into a fresh thread.
pub const STM_SEED_MESSAGES: usize = 80;

/// One inbound message, normalized.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnRequest {
    pub user: UserId,
    pub chat_id: String,
    pub input: String,
    pub params: Option<Params>,
}

impl TurnRequest {
    pub fn new(user: UserId, chat_id: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            user,
            chat_id: chat_id.into(),
            input: input.into(),
            params: None,
        }
    }

    pub fn with_params(mut self, params: Option<Params>) -> Self {
        self.params = params.filter(|p| !p.is_empty());
        self
    }

    pub fn thread_id(&self) -> ThreadId {
        ThreadId::from_chat_id(&self.chat_id)
    }
}

/// A state after `begin_turn`, ready for the graph.
#[derive(Debug, Clone)]
pub struct PreparedTurn {
    pub turn_id: TurnId,
    pub thread_id: ThreadId,
    pub state: ConsultState,
}

impl PreparedTurn {
    /// Route the entry node will take.
    pub fn route(&self) -> Route {
        smalltalk::route(&self.state.joined_user_text(), self.state.form_submitted)
    }
}

/// Result of a completed turn.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub thread_id: ThreadId,
    pub state: ConsultState,
    pub run: GraphRun,
}

impl TurnOutcome {
    /// Final answer of the turn.
    pub fn answer(&self) -> &str {
        &self.state.answer
    }
}

/// Errors that end a turn without an answer.
#[derive(Debug, Clone, Error)]
pub enum TurnError {
    #[error("{}", .0.message)]
    RateLimited(RateLimitDenied),

    #[error(transparent)]
    Graph(#[from] GraphError),
}

/// Runs consultation turns against the stores.
pub struct ConsultService {
    deps: ConsultDeps,
    graph: Arc<Graph>,
    checkpoints: Arc<dyn CheckpointStore>,
    memory: Arc<dyn MemoryStore>,
    limiter: Arc<dyn RateLimiter>,
}

impl ConsultService {
    pub fn new(
        deps: ConsultDeps,
        graph: Arc<Graph>,
        checkpoints: Arc<dyn CheckpointStore>,
        memory: Arc<dyn MemoryStore>,
        limiter: Arc<dyn RateLimiter>,
    ) -> Self {
        Self {
            deps,
            graph,
            checkpoints,
            memory,
            limiter,
        }
    }

    pub fn ai(&self) -> &Arc<dyn AIProvider> {
        &self.deps.ai
    }

    /// Counts the turn against the (user, chat) window.
    ///
    /// Limiter failures let the turn through.
    pub async fn check_rate_limit(&self, request: &TurnRequest) -> Result<(), TurnError> {
        let key = RateLimitKey::new(&request.user, &request.chat_id);
        match self.limiter.check(&key).await {
            Ok(RateLimitResult::Allowed(_)) => Ok(()),
            Ok(RateLimitResult::Denied(denied)) => {
                tracing::info!(
                    user_id = %request.user,
                    chat_id = %key.chat,
                    retry_after_secs = denied.retry_after_secs,
                    "turn rate limited"
                );
                Err(TurnError::RateLimited(denied))
            }
            Err(err) => {
                tracing::warn!(error = %err, "rate limiter unavailable, allowing turn");
                Ok(())
            }
        }
    }

    /// Loads the thread and opens a new turn on it.
    pub async fn prepare(&self, request: &TurnRequest) -> PreparedTurn {
        let thread_id = request.thread_id();
        let mut state = self.load_state(&thread_id).await;
        state.begin_turn(&request.input, request.params.clone());
        PreparedTurn {
            turn_id: TurnId::new(),
            thread_id,
            state,
        }
    }

    async fn load_state(&self, thread_id: &ThreadId) -> ConsultState {
        match self.checkpoints.load(thread_id).await {
            Ok(Some(state)) => return state,
            Ok(None) => {}
            Err(err) => {
                tracing::warn!(thread_id = %thread_id, error = %err, "checkpoint unavailable, starting fresh");
            }
        }

        let mut state = ConsultState::new();
        match self.memory.read(thread_id, STM_SEED_MESSAGES).await {
            Ok(history) => state.messages = history,
            Err(err) => tracing::warn!(thread_id = %thread_id, error = %err, "short-term memory unavailable"),
        }
        state
    }

    /// Runs the graph over a prepared turn and persists the result.
    ///
    /// A cancelled run is not persisted.
    pub async fn run(&self, prepared: PreparedTurn, sink: GraphSink) -> Result<TurnOutcome, TurnError> {
        let input = prepared.state.input.clone();
        let outcome = self.execute(prepared, sink).await?;
        if !outcome.run.cancelled {
            self.persist(&outcome.thread_id, Some(&outcome.state), &input, &outcome.state.answer)
                .await;
        }
        Ok(outcome)
    }

    /// Runs the graph without persisting anything.
    ///
    /// Used by the streaming surface, which records the turn with
    /// [`ConsultService::record_delivered`] once it knows what the client got.
    pub async fn execute(&self, prepared: PreparedTurn, sink: GraphSink) -> Result<TurnOutcome, TurnError> {
        let PreparedTurn {
            turn_id,
            thread_id,
            mut state,
        } = prepared;

        let run = {
            let ctx = NodeContext::new(&self.deps, &thread_id, &sink);
            self.graph.run(&mut state, &ctx).await?
        };

        tracing::info!(
            thread_id = %thread_id,
            turn_id = %turn_id,
            domain = state.domain_id().unwrap_or("-"),
            phase = %state.phase,
            nodes = run.visited.len(),
            cancelled = run.cancelled,
            "turn finished"
        );
        Ok(TurnOutcome { thread_id, state, run })
    }

    /// Persists a streamed turn with the text the client received.
    ///
    /// `state` is absent when no graph run finished, in which case only
    /// short-term memory is written.
    pub async fn record_delivered(
        &self,
        thread_id: &ThreadId,
        state: Option<ConsultState>,
        input: &str,
        delivered: &str,
    ) {
        let state = state.map(|mut state| {
            if !delivered.trim().is_empty() {
                state.replace_answer(delivered);
            }
            state
        });
        self.persist(thread_id, state.as_ref(), input, delivered).await;
    }

    /// Store failures are logged and swallowed.
    async fn persist(&self, thread_id: &ThreadId, state: Option<&ConsultState>, input: &str, answer: &str) {
        if let Some(state) = state {
            if let Err(err) = self.checkpoints.save(thread_id, state).await {
                tracing::warn!(thread_id = %thread_id, error = %err, "failed to save checkpoint");
            }
        }
        if !input.is_empty() {
            if let Err(err) = self.memory.append(thread_id, Role::User, input).await {
                tracing::warn!(thread_id = %thread_id, error = %err, "failed to append to short-term memory");
            }
        }
        if !answer.trim().is_empty() {
            if let Err(err) = self.memory.append(thread_id, Role::Assistant, answer).await {
                tracing::warn!(thread_id = %thread_id, error = %err, "failed to append to short-term memory");
            }
        }
    }

    /// Rate limit, prepare and run to completion without streaming.
    pub async fn invoke(&self, request: &TurnRequest) -> Result<TurnOutcome, TurnError> {
        self.check_rate_limit(request).await?;
        let prepared = self.prepare(request).await;
        self.run(prepared, GraphSink::detached()).await
    }

    /// One plain completion over the conversation, bypassing the graph.
    pub async fn direct_answer(&self, thread_id: &ThreadId, history: &[Message]) -> Option<String> {
        let request = CompletionRequest::new(RequestMetadata::for_thread(thread_id, "fallback_answer"))
            .with_system_prompt(
                "Du bist ein hilfsbereiter Anwendungsingenieur für Dichtungstechnik. \
                 Antworte knapp und fachlich korrekt auf Deutsch.",
            )
            .with_messages(history.iter().cloned());
        match self.deps.ai.complete(request).await {
            Ok(response) if !response.content.trim().is_empty() => Some(response.content),
            Ok(_) => None,
            Err(err) => {
                tracing::warn!(thread_id = %thread_id, error = %err, "direct completion failed");
                None
            }
        }
    }
}

impl std::fmt::Debug for ConsultService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsultService")
            .field("domains", &self.deps.registry.ids())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;

    use crate::adapters::ai::MockAIProvider;
    use crate::adapters::rate_limiter::{InMemoryRateLimiter, SlidingWindow};
    use crate::adapters::retrieval::StaticRetriever;
    use crate::adapters::storage::{InMemoryCheckpointStore, InMemoryMemoryStore};
    use crate::application::consult::{consult_graph, NodeId, RagSettings};
    use crate::domain::consult::{DomainRegistry, RouterPolicy, UiEvent};
    use crate::ports::{RateLimitError, RateLimitStatus, StoreError};

    struct BrokenLimiter;

    #[async_trait]
    impl RateLimiter for BrokenLimiter {
        async fn check(&self, _key: &RateLimitKey) -> Result<RateLimitResult, RateLimitError> {
            Err(RateLimitError::Unavailable("redis down".into()))
        }
        async fn status(&self, _key: &RateLimitKey) -> Result<RateLimitStatus, RateLimitError> {
            Err(RateLimitError::Unavailable("redis down".into()))
        }
        async fn reset(&self, _key: &RateLimitKey) -> Result<(), RateLimitError> {
            Ok(())
        }
    }

    struct BrokenCheckpoints;

    #[async_trait]
    impl CheckpointStore for BrokenCheckpoints {
        async fn load(&self, _thread_id: &ThreadId) -> Result<Option<ConsultState>, StoreError> {
            Err(StoreError::Unavailable("redis down".into()))
        }
        async fn save(&self, _thread_id: &ThreadId, _state: &ConsultState) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("redis down".into()))
        }
    }

    struct Fixture {
        service: ConsultService,
        checkpoints: Arc<InMemoryCheckpointStore>,
        memory: Arc<InMemoryMemoryStore>,
    }

    fn fixture_with(
        limiter: Arc<dyn RateLimiter>,
        checkpoints_override: Option<Arc<dyn CheckpointStore>>,
    ) -> Fixture {
        let ai = Arc::new(MockAIProvider::new().with_default_response("Gern, worum geht es?"));
        let deps = ConsultDeps {
            ai: ai.clone(),
            router_ai: ai,
            retriever: Arc::new(StaticRetriever::empty()),
            registry: Arc::new(DomainRegistry::builtin()),
            policy: RouterPolicy::default(),
            rag: RagSettings::default(),
        };
        let checkpoints = Arc::new(InMemoryCheckpointStore::new());
        let memory = Arc::new(InMemoryMemoryStore::new());
        let store: Arc<dyn CheckpointStore> = checkpoints_override.unwrap_or_else(|| checkpoints.clone() as Arc<dyn CheckpointStore>);
        Fixture {
            service: ConsultService::new(deps, Arc::new(consult_graph()), store, memory.clone(), limiter),
            checkpoints,
            memory,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(Arc::new(InMemoryRateLimiter::with_defaults()), None)
    }

    fn request(input: &str) -> TurnRequest {
        TurnRequest::new(UserId::new("u-1").unwrap(), "c1", input)
    }

    #[tokio::test]
    async fn invoke_persists_state_and_memory() {
        let f = fixture();

        let outcome = f.service.invoke(&request("Hallo")).await.unwrap();

        assert!(!outcome.answer().is_empty());
        let saved = f.checkpoints.load(&ThreadId::from_chat_id("c1")).await.unwrap().unwrap();
        assert_eq!(saved.answer, outcome.answer());
        let history = f.memory.read(&ThreadId::from_chat_id("c1"), 10).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, Role::User);
        assert_eq!(history[1].content, outcome.answer());
    }

    #[tokio::test]
    async fn fresh_thread_is_seeded_from_memory() {
        let f = fixture();
        let thread = ThreadId::from_chat_id("c1");
        f.memory.append(&thread, Role::User, "Welle 25 mm").await.unwrap();

        let prepared = f.service.prepare(&request("und die Drehzahl 1500")).await;

        assert_eq!(prepared.state.messages.len(), 2);
        assert_eq!(prepared.state.messages[0].content, "Welle 25 mm");
    }

    #[tokio::test]
    async fn form_submission_takes_the_default_route() {
        let f = fixture();
        let req = request("").with_params(json!({"wellen_mm": 25}).as_object().cloned());

        let prepared = f.service.prepare(&req).await;

        assert_eq!(prepared.route(), Route::Default);
        assert!(prepared.state.form_submitted);
    }

    #[tokio::test]
    async fn revised_pressure_clears_the_follow_up_on_the_next_turn() {
        let f = fixture();
        let first_params = json!({
            "falltyp": "ersatz", "wellen_mm": 25, "gehause_mm": 47, "breite_mm": 7,
            "medium": "Öl", "temp_max_c": 80, "druck_bar": 5, "drehzahl_u_min": 1500
        });

        let first = f
            .service
            .invoke(&request("RWDR Auslegung").with_params(first_params.as_object().cloned()))
            .await
            .unwrap();

        assert!(first.state.derived.flag("requires_pressure_stage"));
        assert!(matches!(first.state.ui_event, Some(UiEvent::OpenForm(_))));
        assert!(!first.run.visited(NodeId::Rag));

        let second = f
            .service
            .invoke(&request("").with_params(json!({"druck_bar": 1}).as_object().cloned()))
            .await
            .unwrap();

        assert!(!second.state.derived.flag("requires_pressure_stage"));
        assert!(second.state.derived.relativgeschwindigkeit_ms.is_some());
        assert!(!matches!(second.state.ui_event, Some(UiEvent::OpenForm(_))));
        assert!(second.run.visited(NodeId::Rag));
        assert_eq!(second.state.params["druck_bar"], json!(1));
    }

    #[tokio::test]
    async fn rate_limit_rejects_before_any_work() {
        let f = fixture_with(Arc::new(InMemoryRateLimiter::new(SlidingWindow::per_minute(1))), None);
        f.service.invoke(&request("Hallo")).await.unwrap();

        let err = f.service.invoke(&request("Hallo")).await.unwrap_err();

        assert!(matches!(err, TurnError::RateLimited(_)));
        let history = f.memory.read(&ThreadId::from_chat_id("c1"), 10).await.unwrap();
        assert_eq!(history.len(), 2);
    }

    #[tokio::test]
    async fn limiter_failure_fails_open() {
        let f = fixture_with(Arc::new(BrokenLimiter), None);
        assert!(f.service.invoke(&request("Hallo")).await.is_ok());
    }

    #[tokio::test]
    async fn store_failures_do_not_block_the_answer() {
        let f = fixture_with(
            Arc::new(InMemoryRateLimiter::with_defaults()),
            Some(Arc::new(BrokenCheckpoints)),
        );
        let outcome = f.service.invoke(&request("Hallo")).await.unwrap();
        assert!(!outcome.answer().is_empty());
    }

    #[tokio::test]
    async fn direct_fallback_is_remembered_without_a_checkpoint() {
        let f = fixture();
        let thread = ThreadId::from_chat_id("c1");

        f.service
            .record_delivered(&thread, None, "Was ist FKM?", "Fluorkautschuk.")
            .await;

        let history = f.memory.read(&thread, 10).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].role, Role::Assistant);
        assert_eq!(history[1].content, "Fluorkautschuk.");
        assert!(f.checkpoints.load(&thread).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn direct_answer_uses_the_conversation() {
        let f = fixture();
        let answer = f
            .service
            .direct_answer(&ThreadId::from_chat_id("c1"), &[Message::user("Was ist FKM?")])
            .await;
        assert_eq!(answer.as_deref(), Some("Gern, worum geht es?"));
    }
}
