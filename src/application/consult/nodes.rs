//! Node implementations of the consultation graph.
//!
//! Each node reads the state, may call an oracle, and returns patches.
//! Oracle failures are absorbed here with the documented fallbacks; the
//! only error a node raises is a state it cannot work with.

use std::sync::Arc;

use futures::StreamExt;
use thiserror::Error;

use crate::domain::consult::{
    calc, evidence, explain, extract, gate, query, router, smalltalk, synthesizer, Classification,
    ConsultState, Derived, DomainRegistry, DomainSpec, ExplainInput, Explanation, Message,
    RouterPolicy, StatePatch, UiEvent,
};
use crate::domain::foundation::ThreadId;
use crate::ports::{AIError, AIProvider, CompletionRequest, RequestMetadata, RetrievalRequest, Retriever};

use super::graph::{GraphSink, NodeId};

/// Sources listed under an explanation.
const EXPLAIN_SOURCES: usize = 3;

/// Retrieval knobs of the `rag` node.
#[derive(Debug, Clone, PartialEq)]
pub struct RagSettings {
    pub k: usize,
    pub rerank: bool,
    pub tenant: Option<String>,
}

impl Default for RagSettings {
    fn default() -> Self {
        Self {
            k: 6,
            rerank: true,
            tenant: None,
        }
    }
}

/// Collaborators shared by every node.
#[derive(Clone)]
pub struct ConsultDeps {
    pub ai: Arc<dyn AIProvider>,
    /// Second classifier consulted on low-confidence routing.
    pub router_ai: Arc<dyn AIProvider>,
    pub retriever: Arc<dyn Retriever>,
    pub registry: Arc<DomainRegistry>,
    pub policy: RouterPolicy,
    pub rag: RagSettings,
}

/// Per-run view handed to nodes.
pub struct NodeContext<'a> {
    pub deps: &'a ConsultDeps,
    pub thread_id: &'a ThreadId,
    pub sink: &'a GraphSink,
}

impl<'a> NodeContext<'a> {
    pub fn new(deps: &'a ConsultDeps, thread_id: &'a ThreadId, sink: &'a GraphSink) -> Self {
        Self { deps, thread_id, sink }
    }

    /// Spec of the state's domain, or the default domain before routing.
    fn spec(&self, state: &ConsultState) -> Result<Arc<DomainSpec>, NodeError> {
        match state.domain_id() {
            Some(id) => self
                .deps
                .registry
                .get(id)
                .ok_or_else(|| NodeError::UnknownDomain(id.to_string())),
            None => Ok(self.deps.registry.first()),
        }
    }

    fn request(&self, purpose: &'static str) -> CompletionRequest {
        CompletionRequest::new(RequestMetadata::for_thread(self.thread_id, purpose))
    }
}

/// Errors raised by a node.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum NodeError {
    #[error("domain '{0}' is not registered")]
    UnknownDomain(String),
}

/// Runs one node against the current state.
pub async fn run_node(
    node: NodeId,
    state: &ConsultState,
    ctx: &NodeContext<'_>,
) -> Result<Vec<StatePatch>, NodeError> {
    match node {
        NodeId::LiteRouter => Ok(lite_router(state)),
        NodeId::Smalltalk => Ok(smalltalk_reply(state)),
        NodeId::Intake => Ok(intake(state)),
        NodeId::Extract => Ok(extract_params(state, ctx).await),
        NodeId::DomainRouter => Ok(domain_router(state, ctx).await),
        NodeId::NeedGate => need_gate(state, ctx),
        NodeId::Compute => Ok(vec![StatePatch::MergeParams(query::compute_aliases(&state.params))]),
        NodeId::DeterministicCalc => Ok(deterministic_calc(state)),
        NodeId::CalcAgent => calc_agent(state, ctx),
        NodeId::AskMissing => ask_missing(state, ctx),
        NodeId::Validate => Ok(vec![StatePatch::MergeParams(query::normalize(&state.params))]),
        NodeId::PrepareQuery => Ok(prepare_query(state)),
        NodeId::Rag => Ok(rag(state, ctx).await),
        NodeId::Recommend => recommend(state, ctx).await,
        NodeId::Explain => explain_node(state, ctx).await,
        NodeId::ValidateAnswer => Ok(validate_answer(state)),
        NodeId::Respond => Ok(respond(state)),
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Entry
// ════════════════════════════════════════════════════════════════════════════════

fn lite_router(state: &ConsultState) -> Vec<StatePatch> {
    let route = smalltalk::route(&state.joined_user_text(), state.form_submitted);
    vec![StatePatch::Route(route)]
}

fn smalltalk_reply(state: &ConsultState) -> Vec<StatePatch> {
    let reply = smalltalk::reply(state.last_user_text());
    vec![StatePatch::AppendMessage(Message::assistant(reply))]
}

fn intake(state: &ConsultState) -> Vec<StatePatch> {
    let input = state.input.trim();
    let mut patches = Vec::new();
    if !input.is_empty() && state.last_user_text() != input {
        patches.push(StatePatch::AppendMessage(Message::user(input)));
    }
    patches.push(StatePatch::Query(input.to_string()));
    patches
}

// ════════════════════════════════════════════════════════════════════════════════
// Understanding
// ════════════════════════════════════════════════════════════════════════════════

/// Seed-first merge: known params, then heuristic values for blank keys,
/// then model values for keys still blank.
async fn extract_params(state: &ConsultState, ctx: &NodeContext<'_>) -> Vec<StatePatch> {
    let text = state.last_user_text();
    let heuristic = extract::fill_blanks(&state.params, &extract::heuristic(text));

    let mut seed = state.params.clone();
    seed.extend(heuristic.clone());

    let mut added = heuristic;
    if !text.is_empty() {
        let request = ctx
            .request("extract")
            .with_system_prompt(extract::extraction_prompt(&seed))
            .with_message(Message::user(text))
            .with_temperature(0.0)
            .with_json_mode(true);
        let parsed = match ctx.deps.ai.complete(request).await {
            Ok(response) => extract::parse_model_params(&response.content),
            Err(err) => Err(extract::ExtractError::Provider(err.to_string())),
        };
        match parsed {
            Ok(model) => added.extend(extract::fill_blanks(&seed, &model)),
            Err(err) => {
                tracing::debug!(thread_id = %ctx.thread_id, error = %err, "model extraction skipped")
            }
        }
    }

    if added.is_empty() {
        return Vec::new();
    }
    vec![StatePatch::MergeParams(added)]
}

async fn classify(
    ai: &dyn AIProvider,
    ctx: &NodeContext<'_>,
    purpose: &'static str,
    prompt: String,
) -> Classification {
    let request = ctx
        .request(purpose)
        .with_message(Message::user(prompt))
        .with_temperature(0.0)
        .with_json_mode(true);
    match ai.complete(request).await {
        Ok(response) => router::parse_classification(&response.content).unwrap_or_else(|err| {
            tracing::debug!(thread_id = %ctx.thread_id, purpose, error = %err, "unparsable classification");
            Classification::unknown()
        }),
        Err(err) => {
            tracing::warn!(thread_id = %ctx.thread_id, purpose, error = %err, "classifier unavailable");
            Classification::unknown()
        }
    }
}

async fn domain_router(state: &ConsultState, ctx: &NodeContext<'_>) -> Vec<StatePatch> {
    let registry = ctx.deps.registry.as_ref();
    let text = state.last_user_text();
    let prompt = router::classification_prompt(registry, text, &state.params);

    let primary = classify(ctx.deps.ai.as_ref(), ctx, "classify", prompt.clone()).await;
    let fallback = if ctx.deps.policy.needs_fallback(registry, &primary) {
        Some(classify(ctx.deps.router_ai.as_ref(), ctx, "classify_fallback", prompt).await)
    } else {
        None
    };

    let decision = ctx
        .deps
        .policy
        .resolve(registry, primary, fallback, text, &state.params);
    tracing::debug!(
        thread_id = %ctx.thread_id,
        domain = %decision.domain,
        confidence = decision.confidence,
        source = ?decision.source,
        "domain routed"
    );
    vec![StatePatch::Domain {
        id: decision.domain,
        confidence: decision.confidence,
    }]
}

fn need_gate(state: &ConsultState, ctx: &NodeContext<'_>) -> Result<Vec<StatePatch>, NodeError> {
    let spec = ctx.spec(state)?;
    Ok(match gate::check_required(&spec, &state.params) {
        Some(halt) => halt.into_patches(),
        None => vec![StatePatch::MissingFields(Vec::new())],
    })
}

// ════════════════════════════════════════════════════════════════════════════════
// Calculation
// ════════════════════════════════════════════════════════════════════════════════

/// Snapshot of `derived` after `patch` is merged, for the client.
fn snapshot_after(state: &ConsultState, patch: &Derived) -> UiEvent {
    let mut derived = state.derived.clone();
    derived.merge(patch.clone());
    UiEvent::CalcSnapshot { derived }
}

fn deterministic_calc(state: &ConsultState) -> Vec<StatePatch> {
    let derived = calc::physics(&state.params);
    let snapshot = snapshot_after(state, &derived);
    vec![StatePatch::Derived(derived), StatePatch::UiEvent(snapshot)]
}

fn calc_agent(state: &ConsultState, ctx: &NodeContext<'_>) -> Result<Vec<StatePatch>, NodeError> {
    let spec = ctx.spec(state)?;
    let mut derived = spec.compute(&state.params);
    let speed = derived
        .value("umfangsgeschwindigkeit_m_s")
        .or_else(|| derived.value("surface_speed_m_s"))
        .filter(|v| *v > 0.0);
    if let Some(v) = speed {
        derived.relativgeschwindigkeit_ms = Some(v);
    }
    let snapshot = snapshot_after(state, &derived);
    Ok(vec![StatePatch::Derived(derived), StatePatch::UiEvent(snapshot)])
}

fn ask_missing(state: &ConsultState, ctx: &NodeContext<'_>) -> Result<Vec<StatePatch>, NodeError> {
    let spec = ctx.spec(state)?;
    if let Some(halt) = gate::check_required(&spec, &state.params) {
        return Ok(halt.into_patches());
    }
    if let Some(halt) = gate::check_followups(&spec, &state.params, &state.derived) {
        return Ok(halt.into_patches());
    }
    Ok(vec![StatePatch::MissingFields(Vec::new())])
}

// ════════════════════════════════════════════════════════════════════════════════
// Retrieval
// ════════════════════════════════════════════════════════════════════════════════

fn prepare_query(state: &ConsultState) -> Vec<StatePatch> {
    let summary = query::summary(state.domain_id().unwrap_or_default(), &state.params, &state.derived);
    vec![StatePatch::Query(query::build_query(state.last_user_text(), &summary))]
}

async fn rag(state: &ConsultState, ctx: &NodeContext<'_>) -> Vec<StatePatch> {
    let settings = &ctx.deps.rag;
    let mut request = RetrievalRequest::new(state.query.clone(), settings.k)
        .with_tenant(settings.tenant.clone())
        .with_rerank(settings.rerank);
    if let Some(domain) = state.domain_id() {
        request = request.with_filter("domain", domain);
    }

    let docs = match ctx.deps.retriever.hybrid_retrieve(request).await {
        Ok(docs) => docs,
        Err(err) => {
            tracing::warn!(thread_id = %ctx.thread_id, error = %err, "retrieval failed, continuing without evidence");
            Vec::new()
        }
    };
    tracing::debug!(thread_id = %ctx.thread_id, n_docs = docs.len(), "retrieved evidence");
    let context = evidence::context_from_docs(&docs);
    vec![StatePatch::Evidence { docs, context }]
}

// ════════════════════════════════════════════════════════════════════════════════
// Answering
// ════════════════════════════════════════════════════════════════════════════════

/// Text a provider stream produced before it ended or failed.
struct Streamed {
    text: String,
    error: Option<AIError>,
}

/// Forwards a provider stream to the sink in pieces of at most `piece_chars`.
async fn stream_to_sink(
    ctx: &NodeContext<'_>,
    node: NodeId,
    request: CompletionRequest,
    piece_chars: usize,
) -> Streamed {
    let mut out = Streamed {
        text: String::new(),
        error: None,
    };
    let mut stream = match ctx.deps.ai.stream_complete(request).await {
        Ok(stream) => stream,
        Err(err) => {
            out.error = Some(err);
            return out;
        }
    };

    while let Some(item) = stream.next().await {
        if ctx.sink.is_cancelled() {
            break;
        }
        match item {
            Ok(chunk) => {
                for piece in synthesizer::chunks(&chunk.delta, piece_chars) {
                    ctx.sink.text(node, piece).await;
                }
                out.text.push_str(&chunk.delta);
                if chunk.is_final() {
                    break;
                }
            }
            Err(err) => {
                out.error = Some(err);
                break;
            }
        }
    }
    out
}

async fn recommend(state: &ConsultState, ctx: &NodeContext<'_>) -> Result<Vec<StatePatch>, NodeError> {
    if !state.missing_fields.is_empty() {
        let spec = ctx.spec(state)?;
        if let Some(halt) = gate::check_required(&spec, &state.params) {
            return Ok(halt.into_patches());
        }
    }

    let domain = state.domain_id().unwrap_or_default();
    let request = ctx
        .request("recommend")
        .with_system_prompt(synthesizer::system_prompt(domain))
        .with_message(Message::user(synthesizer::recommendation_prompt(state)))
        .with_json_mode(true);

    let streamed = stream_to_sink(ctx, NodeId::Recommend, request.clone(), synthesizer::STREAM_CHUNK_CHARS).await;
    let raw = if let Some(err) = streamed.error.as_ref().filter(|_| !ctx.sink.is_cancelled()) {
        tracing::warn!(thread_id = %ctx.thread_id, error = %err, "recommendation stream failed");
        complete_fallback(ctx, request, streamed.text.is_empty()).await
    } else if streamed.text.trim().is_empty() && !ctx.sink.is_cancelled() {
        complete_fallback(ctx, request, true).await
    } else {
        Some(streamed.text)
    };

    let recs = match raw {
        Some(raw) => {
            let (recs, level, failures) = synthesizer::parse_recommendations(&raw);
            tracing::debug!(
                thread_id = %ctx.thread_id,
                level = ?level,
                skipped = ?failures,
                n_recommendations = recs.len(),
                "recommendations parsed"
            );
            recs
        }
        None => Vec::new(),
    };

    let payload = synthesizer::to_payload(&recs);
    Ok(vec![
        StatePatch::Recommendations(recs),
        StatePatch::AppendMessage(Message::assistant(payload)),
    ])
}

/// One blocking completion after a failed stream. Its text is forwarded
/// only when nothing was streamed before.
async fn complete_fallback(ctx: &NodeContext<'_>, request: CompletionRequest, forward: bool) -> Option<String> {
    match ctx.deps.ai.complete(request).await {
        Ok(response) if !response.content.trim().is_empty() => {
            if forward {
                for piece in synthesizer::chunks(&response.content, synthesizer::STREAM_CHUNK_CHARS) {
                    ctx.sink.text(NodeId::Recommend, piece).await;
                }
            }
            Some(response.content)
        }
        Ok(_) => None,
        Err(err) => {
            tracing::warn!(thread_id = %ctx.thread_id, error = %err, "recommendation completion failed");
            None
        }
    }
}

async fn explain_node(state: &ConsultState, ctx: &NodeContext<'_>) -> Result<Vec<StatePatch>, NodeError> {
    let explanation = if state.recommendations.is_empty() {
        state
            .last_assistant_text()
            .and_then(Explanation::from_assistant_text)
            .unwrap_or_default()
    } else {
        Explanation::from_recommendations(&state.recommendations)
    };

    let spec = state.domain_id().and_then(|id| ctx.deps.registry.get(id));
    let sources = evidence::top_sources(&state.retrieved_docs, EXPLAIN_SOURCES);
    let markdown = explain::render(&ExplainInput {
        explanation: &explanation,
        derived: &state.derived,
        params: &state.params,
        spec: spec.as_deref(),
        sources: &sources,
    });

    for piece in synthesizer::chunks(&markdown, explain::EXPLAIN_CHUNK_CHARS) {
        if ctx.sink.is_cancelled() {
            break;
        }
        ctx.sink.text(NodeId::Explain, piece).await;
    }
    Ok(vec![StatePatch::AppendMessage(Message::assistant(markdown))])
}

fn validate_answer(state: &ConsultState) -> Vec<StatePatch> {
    let (validation, needs_more) = evidence::validate_answer(&state.retrieved_docs, state.needs_more_params);
    vec![StatePatch::Validation(validation), StatePatch::NeedsMoreParams(needs_more)]
}

fn respond(state: &ConsultState) -> Vec<StatePatch> {
    let answer = state.last_assistant_text().unwrap_or_default().to_string();
    vec![StatePatch::Answer(answer)]
}
