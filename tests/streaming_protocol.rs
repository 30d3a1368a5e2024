//! Integration tests for the streaming turn protocol.
//!
//! These tests run `stream_turn` the way the WebSocket surface does, with a
//! `CancelRegistry` per connection, and check the frame sequence contract:
//! 1. Every turn opens with `start` and closes with exactly one `done`
//! 2. Coalesced tokens concatenate to the generated text
//! 3. One turn per thread at a time; a cancel ends the turn immediately

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::mpsc::{self, UnboundedReceiver};

use seal_consult::adapters::ai::MockAIProvider;
use seal_consult::adapters::rate_limiter::InMemoryRateLimiter;
use seal_consult::adapters::retrieval::StaticRetriever;
use seal_consult::adapters::storage::{InMemoryCheckpointStore, InMemoryMemoryStore};
use seal_consult::application::{
    consult_graph, stream_turn, CancelRegistry, ConsultDeps, ConsultService, RagSettings, StreamSettings,
    TurnEmitter, TurnRequest,
};
use seal_consult::domain::consult::{DomainRegistry, Params, RetrievedDoc, RouterPolicy};
use seal_consult::domain::foundation::{ThreadId, UserId};
use seal_consult::domain::streaming::{CoalescePolicy, ServerEvent};

// =============================================================================
// Test Infrastructure
// =============================================================================

const RECOMMENDATION: &str =
    r#"{"empfehlungen":[{"typ":"BAUM","werkstoff":"FKM","begruendung":"Öl bei 80 °C, 2 bar"}]}"#;

fn service(ai: MockAIProvider) -> Arc<ConsultService> {
    let ai = Arc::new(ai);
    let deps = ConsultDeps {
        ai: ai.clone(),
        router_ai: ai,
        retriever: Arc::new(StaticRetriever::new(vec![RetrievedDoc {
            text: "FKM ist für Mineralöl geeignet.".into(),
            source: Some("werkstoffe.pdf".into()),
            fused_score: Some(0.8),
            ..Default::default()
        }])),
        registry: Arc::new(DomainRegistry::builtin()),
        policy: RouterPolicy::default(),
        rag: RagSettings::default(),
    };
    Arc::new(ConsultService::new(
        deps,
        Arc::new(consult_graph()),
        Arc::new(InMemoryCheckpointStore::new()),
        Arc::new(InMemoryMemoryStore::new()),
        Arc::new(InMemoryRateLimiter::with_defaults()),
    ))
}

fn recommending_ai() -> MockAIProvider {
    MockAIProvider::new()
        .with_purpose_response("classify", r#"{"domain":"rwdr","confidence":0.9}"#)
        .with_purpose_response("recommend", RECOMMENDATION)
}

fn full_params() -> Option<Params> {
    json!({
        "falltyp": "ersatz", "wellen_mm": 25, "gehause_mm": 47, "breite_mm": 7,
        "medium": "Öl", "temp_max_c": 80, "druck_bar": 2, "drehzahl_u_min": 1500
    })
    .as_object()
    .cloned()
}

fn request(chat: &str, input: &str) -> TurnRequest {
    TurnRequest::new(UserId::new("user-1").unwrap(), chat, input)
}

async fn drain(mut rx: UnboundedReceiver<ServerEvent>) -> Vec<ServerEvent> {
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    events
}

fn token_text(events: &[ServerEvent]) -> String {
    events
        .iter()
        .filter_map(|e| match e {
            ServerEvent::Token { delta, .. } => Some(delta.as_str()),
            _ => None,
        })
        .collect()
}

fn count(events: &[ServerEvent], name: &str) -> usize {
    events.iter().filter(|e| e.name() == name).count()
}

/// Registers the turn like the socket handler does and runs it to the end.
async fn run_registered(
    registry: &CancelRegistry,
    service: Arc<ConsultService>,
    settings: StreamSettings,
    req: TurnRequest,
) -> Vec<ServerEvent> {
    let thread = req.thread_id();
    let signal = registry.begin(&thread).await.unwrap();
    let (tx, rx) = mpsc::unbounded_channel();
    let emitter = TurnEmitter::new(thread.clone(), Arc::clone(&signal), tx);
    stream_turn(service, settings, req, emitter).await;
    registry.release(&thread, &signal).await;
    drain(rx).await
}

// =============================================================================
// Frame sequence
// =============================================================================

#[tokio::test]
async fn recommendation_turn_is_framed_by_start_and_one_done() {
    let registry = CancelRegistry::new();

    let events = run_registered(
        &registry,
        service(recommending_ai()),
        StreamSettings::default(),
        request("c1", "RWDR Auslegung").with_params(full_params()),
    )
    .await;

    assert_eq!(events.first().map(ServerEvent::name), Some("start"));
    assert!(events.last().unwrap().is_done());
    assert_eq!(count(&events, "done"), 1);
    assert_eq!(token_text(&events), RECOMMENDATION);
    for event in &events {
        let frame: serde_json::Value = serde_json::from_str(&event.to_json()).unwrap();
        if let Some(thread) = frame.get("thread_id") {
            assert_eq!(thread, &json!("api:c1"));
        }
    }
    assert_eq!(registry.active_count().await, 0);
}

#[tokio::test]
async fn coalescing_merges_fragments_without_losing_text() {
    let settings = StreamSettings {
        coalesce: CoalescePolicy {
            min_chars: 10_000,
            max_latency: Duration::from_secs(30),
        },
        ..Default::default()
    };

    let events = run_registered(
        &CancelRegistry::new(),
        service(recommending_ai()),
        settings,
        request("c1", "RWDR Auslegung").with_params(full_params()),
    )
    .await;

    let fragments = RECOMMENDATION.split_inclusive(' ').count();
    let tokens = count(&events, "token");
    assert_eq!(token_text(&events), RECOMMENDATION);
    assert!(tokens >= 1);
    assert!(tokens < fragments, "{} tokens for {} fragments", tokens, fragments);
}

#[tokio::test]
async fn parallel_threads_each_get_their_own_done() {
    let registry = Arc::new(CancelRegistry::new());
    let svc = service(MockAIProvider::new().with_chunk_delay(Duration::from_millis(5)));

    let turns = ["eins", "zwei", "drei"].map(|chat| {
        let registry = Arc::clone(&registry);
        let svc = Arc::clone(&svc);
        tokio::spawn(async move {
            run_registered(&registry, svc, StreamSettings::default(), request(chat, "Hallo")).await
        })
    });

    for turn in turns {
        let events = turn.await.unwrap();
        assert_eq!(events[0].name(), "start");
        assert_eq!(count(&events, "done"), 1);
        assert!(events.last().unwrap().is_done());
    }
    assert_eq!(registry.active_count().await, 0);
}

// =============================================================================
// Concurrency and cancellation
// =============================================================================

#[tokio::test]
async fn a_thread_admits_one_turn_at_a_time() {
    let registry = CancelRegistry::new();
    let thread = ThreadId::from_chat_id("c1");

    let signal = registry.begin(&thread).await.unwrap();
    assert!(registry.begin(&thread).await.is_err());
    assert!(registry.begin(&ThreadId::from_chat_id("c2")).await.is_ok());

    registry.release(&thread, &signal).await;
    assert!(registry.begin(&thread).await.is_ok());
}

#[tokio::test]
async fn cancel_through_the_registry_ends_the_turn_with_one_done() {
    let registry = Arc::new(CancelRegistry::new());
    let ai = recommending_ai().with_chunk_delay(Duration::from_millis(40));
    let svc = service(ai);
    let req = request("c1", "RWDR Auslegung").with_params(full_params());
    let thread = req.thread_id();

    let signal = registry.begin(&thread).await.unwrap();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let emitter = TurnEmitter::new(thread.clone(), Arc::clone(&signal), tx.clone());
    let turn = tokio::spawn(stream_turn(svc, StreamSettings::default(), req, emitter));

    let mut seen = Vec::new();
    while let Some(event) = rx.recv().await {
        let started = event.name() == "start";
        seen.push(event);
        if started {
            break;
        }
    }

    let running = registry.get(&thread).await.unwrap();
    let canceller = TurnEmitter::new(thread.clone(), running, tx);
    assert!(canceller.cancel().await);
    drop(canceller);

    tokio::time::timeout(Duration::from_secs(5), turn).await.unwrap().unwrap();
    registry.release(&thread, &signal).await;
    seen.extend(drain(rx).await);

    assert_eq!(count(&seen, "done"), 1);
    assert!(seen.last().unwrap().is_done());
    assert_eq!(count(&seen, "error"), 0);
    assert!(token_text(&seen).len() < RECOMMENDATION.len());
}
