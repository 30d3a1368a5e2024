//! Streaming delivery of one turn.
//!
//! The graph runs in a spawned task and reports into a bounded channel.
//! This side coalesces text fragments into `token` frames, forwards UI
//! events in order, and guarantees that the client gets either streamed
//! content or one fallback answer before the turn's single `done`.
//!
//! ```text
//! graph task ──GraphEvent──▶ mpsc(64) ──▶ coalescer ──ServerEvent──▶ connection
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant};

use crate::application::consult::{GraphEvent, GraphSink};
use crate::application::turn_signal::TurnEmitter;
use crate::domain::consult::{ConsultState, Message};
use crate::domain::streaming::{CoalescePolicy, Coalescer, ErrorCode, ServerEvent};

use super::run_turn::{ConsultService, TurnError, TurnOutcome, TurnRequest};

/// Delivery knobs of the streaming surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamSettings {
    pub coalesce: CoalescePolicy,
    /// Wait for the first fragment before answering with one blocking completion.
    pub first_token_timeout: Duration,
    /// Upper bound on a whole turn.
    pub event_timeout: Duration,
    pub channel_capacity: usize,
    /// Send the full text as `final` before `done`.
    pub emit_final: bool,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            coalesce: CoalescePolicy::default(),
            first_token_timeout: Duration::from_millis(2000),
            event_timeout: Duration::from_secs(25),
            channel_capacity: 64,
            emit_final: false,
        }
    }
}

/// Text delivered so far, plus whether a fallback already answered.
struct Delivery<'a> {
    emitter: &'a TurnEmitter,
    coalescer: Coalescer,
    text: String,
    /// Any fragment or UI event reached the client.
    first_output: bool,
    /// The first-token fallback answered; later graph text is dropped.
    answered_early: bool,
}

impl<'a> Delivery<'a> {
    fn new(emitter: &'a TurnEmitter, policy: CoalescePolicy) -> Self {
        Self {
            emitter,
            coalescer: Coalescer::new(policy, std::time::Instant::now()),
            text: String::new(),
            first_output: false,
            answered_early: false,
        }
    }

    fn thread(&self) -> &str {
        self.emitter.thread_id().as_str()
    }

    async fn token(&mut self, chunk: String) {
        if chunk.is_empty() {
            return;
        }
        if self.emitter.emit(ServerEvent::token(chunk.as_str(), self.thread())).await {
            self.text.push_str(&chunk);
        }
    }

    async fn push(&mut self, fragment: &str) {
        self.first_output = true;
        if self.answered_early {
            return;
        }
        if let Some(chunk) = self.coalescer.push(fragment, std::time::Instant::now()) {
            self.token(chunk).await;
        }
    }

    async fn poll(&mut self) {
        if let Some(chunk) = self.coalescer.poll(std::time::Instant::now()) {
            self.token(chunk).await;
        }
    }

    async fn flush(&mut self) {
        if self.emitter.is_cancelled() {
            self.coalescer.discard();
            return;
        }
        if let Some(chunk) = self.coalescer.flush(std::time::Instant::now()) {
            self.token(chunk).await;
        }
    }

    async fn ui(&mut self, event: crate::domain::consult::UiEvent) {
        self.first_output = true;
        self.flush().await;
        let frame = ServerEvent::ui_action(event, self.thread());
        self.emitter.emit(frame).await;
    }

    /// Emits a whole answer as one `token`.
    async fn answer(&mut self, text: String) {
        self.flush().await;
        self.first_output = true;
        self.token(text).await;
    }

    fn delivered(&self) -> bool {
        !self.text.trim().is_empty()
    }
}

/// How the event loop ended.
enum LoopEnd {
    GraphDone,
    Cancelled,
    TimedOut,
}

/// Streams one turn to `emitter` and sends its `done`.
///
/// The caller has registered the emitter's signal for the thread.
pub async fn stream_turn(
    service: Arc<ConsultService>,
    settings: StreamSettings,
    request: TurnRequest,
    emitter: TurnEmitter,
) {
    let thread = emitter.thread_id().as_str().to_string();

    if let Err(TurnError::RateLimited(denied)) = service.check_rate_limit(&request).await {
        emitter
            .emit(ServerEvent::error(ErrorCode::RateLimited, denied.message, Some(&thread)))
            .await;
        emitter.finish().await;
        return;
    }

    let prepared = service.prepare(&request).await;
    let history: Vec<Message> = prepared.state.messages.clone();
    emitter
        .emit(ServerEvent::Start {
            thread_id: thread.clone(),
            route: prepared.route().as_str().to_string(),
        })
        .await;

    let (sink, mut rx) = GraphSink::channel(settings.channel_capacity, Some(Arc::clone(emitter.signal())));
    let graph_task: JoinHandle<Result<TurnOutcome, TurnError>> = {
        let service = Arc::clone(&service);
        tokio::spawn(async move { service.execute(prepared, sink).await })
    };

    let mut delivery = Delivery::new(&emitter, settings.coalesce);
    let end = consume(&service, &settings, &history, &mut rx, &mut delivery).await;
    // State of the graph run whose result the turn settles on.
    let mut settled = None;

    match end {
        LoopEnd::Cancelled => {
            // The cancel handler already sent `done`; the task notices the flag.
            delivery.coalescer.discard();
            tracing::info!(thread_id = %thread, "turn cancelled by client");
            return;
        }
        LoopEnd::TimedOut => {
            graph_task.abort();
            tracing::warn!(thread_id = %thread, "turn exceeded event timeout");
            delivery.flush().await;
            if !delivery.delivered() {
                settled = fallback_chain(&service, &settings, &request, &history, &mut delivery).await;
            }
        }
        LoopEnd::GraphDone => {
            delivery.flush().await;
            match graph_task.await {
                Ok(Ok(outcome)) => {
                    if outcome.run.cancelled || emitter.is_cancelled() {
                        return;
                    }
                    if !delivery.delivered() && !outcome.answer().trim().is_empty() {
                        delivery.answer(outcome.answer().to_string()).await;
                    }
                    settled = Some(outcome.state);
                    if !delivery.delivered() {
                        if let Some(rerun) =
                            fallback_chain(&service, &settings, &request, &history, &mut delivery).await
                        {
                            settled = Some(rerun);
                        }
                    }
                }
                Ok(Err(err)) => {
                    tracing::error!(thread_id = %thread, error = %err, "graph failed");
                    if !delivery.delivered() {
                        settled = fallback_chain(&service, &settings, &request, &history, &mut delivery).await;
                    }
                }
                Err(join_err) => {
                    tracing::error!(thread_id = %thread, error = %join_err, "graph task panicked");
                    if !delivery.delivered() {
                        settled = fallback_chain(&service, &settings, &request, &history, &mut delivery).await;
                    }
                }
            }
        }
    }

    if !emitter.is_cancelled() {
        service
            .record_delivered(emitter.thread_id(), settled, &request.input, &delivery.text)
            .await;
    }

    if settings.emit_final && delivery.delivered() {
        emitter
            .emit(ServerEvent::Final {
                text: delivery.text.clone(),
                thread_id: thread.clone(),
            })
            .await;
    }
    emitter.finish().await;
}

/// Drains graph events until the graph finishes, the turn is cancelled or
/// the turn runs out of time.
async fn consume(
    service: &ConsultService,
    settings: &StreamSettings,
    history: &[Message],
    rx: &mut mpsc::Receiver<GraphEvent>,
    delivery: &mut Delivery<'_>,
) -> LoopEnd {
    let started = Instant::now();
    let deadline = started + settings.event_timeout;
    let first_token_deadline = started + settings.first_token_timeout;
    let mut first_token_fired = false;

    loop {
        if delivery.emitter.is_cancelled() {
            return LoopEnd::Cancelled;
        }
        let now = Instant::now();
        if now >= deadline {
            return LoopEnd::TimedOut;
        }

        let mut wake = deadline;
        if !delivery.first_output && !first_token_fired {
            wake = wake.min(first_token_deadline);
        }
        if !delivery.coalescer.is_empty() {
            wake = wake.min(now + delivery.coalescer.remaining(std::time::Instant::now()));
        }

        match timeout(wake.saturating_duration_since(now), rx.recv()).await {
            Ok(Some(GraphEvent::Text { text, .. })) => delivery.push(&text).await,
            Ok(Some(GraphEvent::Ui(event))) => delivery.ui(event).await,
            Ok(Some(GraphEvent::NodeFinished { .. })) => delivery.poll().await,
            Ok(None) if delivery.emitter.is_cancelled() => return LoopEnd::Cancelled,
            Ok(None) => return LoopEnd::GraphDone,
            Err(_) => {
                if !delivery.first_output && !first_token_fired && Instant::now() >= first_token_deadline {
                    first_token_fired = true;
                    let thread_id = delivery.emitter.thread_id().clone();
                    tracing::info!(thread_id = %thread_id, "no fragment before first-token timeout");
                    if let Some(text) = service.direct_answer(&thread_id, history).await {
                        if !delivery.first_output && !delivery.emitter.is_cancelled() {
                            delivery.answer(text).await;
                            delivery.answered_early = true;
                        }
                    }
                } else {
                    delivery.poll().await;
                }
            }
        }
    }
}

/// Synchronous re-run, then a direct completion, then `graph_failed`.
///
/// Returns the re-run's state when the re-run answered.
async fn fallback_chain(
    service: &ConsultService,
    settings: &StreamSettings,
    request: &TurnRequest,
    history: &[Message],
    delivery: &mut Delivery<'_>,
) -> Option<ConsultState> {
    let thread_id = delivery.emitter.thread_id().clone();
    if delivery.emitter.is_cancelled() {
        return None;
    }

    let prepared = service.prepare(request).await;
    match timeout(settings.event_timeout, service.execute(prepared, GraphSink::detached())).await {
        Ok(Ok(outcome)) if !outcome.answer().trim().is_empty() => {
            tracing::info!(thread_id = %thread_id, "answered by synchronous re-run");
            delivery.answer(outcome.answer().to_string()).await;
            return Some(outcome.state);
        }
        Ok(Ok(_)) => tracing::warn!(thread_id = %thread_id, "synchronous re-run produced no answer"),
        Ok(Err(err)) => tracing::warn!(thread_id = %thread_id, error = %err, "synchronous re-run failed"),
        Err(_) => tracing::warn!(thread_id = %thread_id, "synchronous re-run timed out"),
    }

    if let Ok(Some(text)) = timeout(settings.event_timeout, service.direct_answer(&thread_id, history)).await {
        delivery.answer(text).await;
        return None;
    }

    delivery
        .emitter
        .emit(ServerEvent::error(
            ErrorCode::GraphFailed,
            "Die Anfrage konnte nicht beantwortet werden. Bitte versuche es erneut.",
            Some(thread_id.as_str()),
        ))
        .await;
    None
}
