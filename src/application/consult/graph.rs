//! Graph engine: node identifiers, edges and the run loop.
//!
//! A [`Graph`] is a static table of edges keyed by [`NodeId`]. Running it
//! walks from the entry node, folding each node's patches into the state and
//! evaluating the outgoing edge right after the node returns. Fragments and
//! UI events produced along the way go to a [`GraphSink`].

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::application::turn_signal::TurnSignal;
use crate::domain::consult::{ConsultState, StatePatch, UiEvent};

use super::nodes::{self, NodeContext};

/// Maximum node visits per turn.
pub const STEP_BUDGET: usize = 64;

// ════════════════════════════════════════════════════════════════════════════════
// Nodes and edges
// ════════════════════════════════════════════════════════════════════════════════

/// Every node of the consultation graph, named by its phase tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeId {
    LiteRouter,
    Smalltalk,
    Intake,
    Extract,
    DomainRouter,
    NeedGate,
    Compute,
    DeterministicCalc,
    CalcAgent,
    AskMissing,
    Validate,
    PrepareQuery,
    Rag,
    Recommend,
    Explain,
    ValidateAnswer,
    Respond,
}

impl NodeId {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeId::LiteRouter => "lite_router",
            NodeId::Smalltalk => "smalltalk",
            NodeId::Intake => "intake",
            NodeId::Extract => "extract",
            NodeId::DomainRouter => "domain_router",
            NodeId::NeedGate => "need_gate",
            NodeId::Compute => "compute",
            NodeId::DeterministicCalc => "deterministic_calc",
            NodeId::CalcAgent => "calc_agent",
            NodeId::AskMissing => "ask_missing",
            NodeId::Validate => "validate",
            NodeId::PrepareQuery => "prepare_query",
            NodeId::Rag => "rag",
            NodeId::Recommend => "recommend",
            NodeId::Explain => "explain",
            NodeId::ValidateAnswer => "validate_answer",
            NodeId::Respond => "respond",
        }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Guard evaluated over the state right after its source node returns.
pub type BranchFn = fn(&ConsultState) -> NodeId;

/// Outgoing edge of a node.
#[derive(Clone, Copy)]
pub enum Edge {
    To(NodeId),
    Branch(BranchFn),
    End,
}

impl fmt::Debug for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Edge::To(node) => write!(f, "To({})", node),
            Edge::Branch(_) => f.write_str("Branch"),
            Edge::End => f.write_str("End"),
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Events
// ════════════════════════════════════════════════════════════════════════════════

/// What a running graph reports to the delivery layer.
#[derive(Debug, Clone, PartialEq)]
pub enum GraphEvent {
    /// A text fragment of the answer being produced.
    Text { node: NodeId, text: String },
    /// The merged pending UI event after a node requested one.
    Ui(UiEvent),
    NodeFinished { node: NodeId },
}

/// Outlet for graph events plus the turn's cancellation flag.
///
/// A detached sink drops every event; the non-streaming surface and the
/// synchronous fallback run with one.
#[derive(Debug, Clone, Default)]
pub struct GraphSink {
    tx: Option<mpsc::Sender<GraphEvent>>,
    signal: Option<Arc<TurnSignal>>,
}

impl GraphSink {
    /// Bounded channel sink. The receiver side is the delivery consumer.
    pub fn channel(
        capacity: usize,
        signal: Option<Arc<TurnSignal>>,
    ) -> (Self, mpsc::Receiver<GraphEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx: Some(tx), signal }, rx)
    }

    pub fn detached() -> Self {
        Self::default()
    }

    pub fn is_cancelled(&self) -> bool {
        self.signal.as_ref().map_or(false, |s| s.is_cancelled())
    }

    async fn send(&self, event: GraphEvent) {
        if let Some(tx) = &self.tx {
            // A dropped receiver means nobody listens any more; the turn still completes.
            let _ = tx.send(event).await;
        }
    }

    pub async fn text(&self, node: NodeId, text: &str) {
        if text.is_empty() || self.is_cancelled() {
            return;
        }
        self.send(GraphEvent::Text {
            node,
            text: text.to_string(),
        })
        .await;
    }

    pub async fn ui(&self, event: UiEvent) {
        if self.is_cancelled() {
            return;
        }
        self.send(GraphEvent::Ui(event)).await;
    }

    pub async fn node_finished(&self, node: NodeId) {
        self.send(GraphEvent::NodeFinished { node }).await;
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Graph
// ════════════════════════════════════════════════════════════════════════════════

/// Errors that end a graph run.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GraphError {
    #[error("node {node} failed: {message}")]
    NodeFailed { node: NodeId, message: String },

    #[error("step budget of {0} node visits exceeded")]
    StepBudgetExceeded(usize),

    #[error("node {0} has no outgoing edge")]
    MissingEdge(NodeId),
}

/// Outcome of a completed run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraphRun {
    pub visited: Vec<NodeId>,
    pub cancelled: bool,
}

impl GraphRun {
    pub fn visited(&self, node: NodeId) -> bool {
        self.visited.contains(&node)
    }
}

/// Compiled consultation graph.
#[derive(Debug, Clone)]
pub struct Graph {
    entry: NodeId,
    edges: HashMap<NodeId, Edge>,
    step_budget: usize,
}

impl Graph {
    pub fn new(entry: NodeId) -> Self {
        Self {
            entry,
            edges: HashMap::new(),
            step_budget: STEP_BUDGET,
        }
    }

    pub fn edge(mut self, from: NodeId, to: NodeId) -> Self {
        self.edges.insert(from, Edge::To(to));
        self
    }

    pub fn branch(mut self, from: NodeId, guard: BranchFn) -> Self {
        self.edges.insert(from, Edge::Branch(guard));
        self
    }

    pub fn finish(mut self, at: NodeId) -> Self {
        self.edges.insert(at, Edge::End);
        self
    }

    pub fn with_step_budget(mut self, budget: usize) -> Self {
        self.step_budget = budget;
        self
    }

    pub fn entry(&self) -> NodeId {
        self.entry
    }

    /// Next node after `from`, or `None` at the end of the graph.
    pub fn next(&self, from: NodeId, state: &ConsultState) -> Result<Option<NodeId>, GraphError> {
        match self.edges.get(&from) {
            Some(Edge::To(to)) => Ok(Some(*to)),
            Some(Edge::Branch(guard)) => Ok(Some(guard(state))),
            Some(Edge::End) => Ok(None),
            None => Err(GraphError::MissingEdge(from)),
        }
    }

    /// Runs one turn from the entry node.
    ///
    /// Stops early, without error, once the turn is cancelled.
    pub async fn run(&self, state: &mut ConsultState, ctx: &NodeContext<'_>) -> Result<GraphRun, GraphError> {
        let mut run = GraphRun::default();
        let mut current = Some(self.entry);

        while let Some(node) = current {
            if ctx.sink.is_cancelled() {
                tracing::info!(thread_id = %ctx.thread_id, node = %node, "turn cancelled");
                run.cancelled = true;
                return Ok(run);
            }
            if run.visited.len() >= self.step_budget {
                return Err(GraphError::StepBudgetExceeded(self.step_budget));
            }

            let patches = match nodes::run_node(node, state, ctx).await {
                Ok(patches) => patches,
                Err(err) => {
                    tracing::error!(
                        thread_id = %ctx.thread_id,
                        node = %node,
                        error = %err,
                        state = %state.snapshot(),
                        "graph node failed"
                    );
                    return Err(GraphError::NodeFailed {
                        node,
                        message: err.to_string(),
                    });
                }
            };

            let has_ui = patches.iter().any(|p| matches!(p, StatePatch::UiEvent(_)));
            state.apply_all(patches);
            state.phase = node.as_str().to_string();
            run.visited.push(node);

            if has_ui {
                if let Some(event) = state.ui_event.clone() {
                    ctx.sink.ui(event).await;
                }
            }
            ctx.sink.node_finished(node).await;
            tracing::debug!(thread_id = %ctx.thread_id, node = %node, "node finished");

            current = self.next(node, state)?;
        }

        Ok(run)
    }
}
