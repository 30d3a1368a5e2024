//! The consultation graph: node wiring and edge guards.

use crate::domain::consult::{query, ConsultState, Route, UiEvent};

use super::graph::{Graph, NodeId};

/// Builds the consultation graph. Built once and shared.
pub fn consult_graph() -> Graph {
    use NodeId::*;

    Graph::new(LiteRouter)
        .branch(LiteRouter, after_lite_router)
        .edge(Smalltalk, Respond)
        .edge(Intake, Extract)
        .edge(Extract, DomainRouter)
        .edge(DomainRouter, NeedGate)
        .branch(NeedGate, after_need_gate)
        .edge(Compute, DeterministicCalc)
        .edge(DeterministicCalc, CalcAgent)
        .edge(CalcAgent, AskMissing)
        .branch(AskMissing, after_ask_missing)
        .edge(Validate, PrepareQuery)
        .edge(PrepareQuery, Rag)
        .branch(Rag, after_rag)
        .edge(Recommend, ValidateAnswer)
        .edge(ValidateAnswer, Respond)
        .edge(Explain, ValidateAnswer)
        .finish(Respond)
}

fn after_lite_router(state: &ConsultState) -> NodeId {
    match state.route {
        Some(Route::Smalltalk) => NodeId::Smalltalk,
        _ => NodeId::Intake,
    }
}

fn after_need_gate(state: &ConsultState) -> NodeId {
    if state.missing_fields.is_empty() {
        NodeId::Compute
    } else {
        NodeId::Respond
    }
}

/// Halts on a required deficit or a pending follow-up confirmation.
fn after_ask_missing(state: &ConsultState) -> NodeId {
    let pending_form = matches!(state.ui_event, Some(UiEvent::OpenForm(_)));
    if !state.missing_fields.is_empty() || pending_form {
        NodeId::Respond
    } else {
        NodeId::Validate
    }
}

fn after_rag(state: &ConsultState) -> NodeId {
    if query::should_recommend(state) {
        NodeId::Recommend
    } else {
        NodeId::Explain
    }
}
