//! Consultation graph: engine, nodes and the compiled topology.
//!
//! ```text
//! lite_router ─┬─ smalltalk → respond
//!              └─ intake → extract → domain_router → need_gate ─┬─ respond (halt)
//!                                                               └─ compute
//! compute → deterministic_calc → calc_agent → ask_missing ─┬─ respond (halt)
//!                                                          └─ validate → prepare_query → rag
//! rag ─┬─ recommend ─┬─ validate_answer → respond
//!      └─ explain ───┘
//! ```

pub mod graph;
pub mod graph_builder;
pub mod nodes;

pub use graph::{Graph, GraphError, GraphEvent, GraphRun, GraphSink, NodeId, STEP_BUDGET};
pub use graph_builder::consult_graph;
pub use nodes::{run_node, ConsultDeps, NodeContext, NodeError, RagSettings};

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use serde_json::json;

    use crate::adapters::ai::{MockAIProvider, MockError};
    use crate::adapters::retrieval::StaticRetriever;
    use crate::domain::consult::{
        ConsultState, DomainRegistry, Params, RetrievedDoc, RouterPolicy, StatePatch, UiEvent,
    };
    use crate::domain::foundation::ThreadId;

    const RWDR_CLASSIFICATION: &str = r#"{"domain":"rwdr","confidence":0.95}"#;
    const RECOMMENDATION: &str = r#"{"empfehlungen":[{"typ":"BAUM","werkstoff":"FKM","begruendung":"Öl bei 80 °C"}]}"#;

    fn full_params() -> Params {
        json!({
            "falltyp": "ersatz",
            "wellen_mm": 25,
            "gehause_mm": 47,
            "breite_mm": 7,
            "medium": "Öl",
            "temp_max_c": 80,
            "druck_bar": 2,
            "drehzahl_u_min": 1500
        })
        .as_object()
        .cloned()
        .unwrap()
    }

    fn doc() -> RetrievedDoc {
        RetrievedDoc {
            text: "FKM ist für Mineralöl bis 200 °C geeignet.".into(),
            source: Some("werkstoffe.pdf".into()),
            fused_score: Some(0.8),
            ..Default::default()
        }
    }

    fn deps(ai: MockAIProvider, retriever: StaticRetriever) -> ConsultDeps {
        let ai = Arc::new(ai);
        ConsultDeps {
            ai: ai.clone(),
            router_ai: ai,
            retriever: Arc::new(retriever),
            registry: Arc::new(DomainRegistry::builtin()),
            policy: RouterPolicy::default(),
            rag: RagSettings::default(),
        }
    }

    fn scripted_ai() -> MockAIProvider {
        MockAIProvider::new()
            .with_purpose_response("extract", "{}")
            .with_purpose_response("classify", RWDR_CLASSIFICATION)
            .with_purpose_response("recommend", RECOMMENDATION)
    }

    async fn run_turn(
        deps: &ConsultDeps,
        state: &mut ConsultState,
        input: &str,
        params: Option<Params>,
    ) -> Result<GraphRun, GraphError> {
        let thread = ThreadId::from_chat_id("t1");
        let sink = GraphSink::detached();
        let ctx = NodeContext::new(deps, &thread, &sink);
        state.begin_turn(input, params);
        consult_graph().run(state, &ctx).await
    }

    mod gating {
        use super::*;

        #[tokio::test]
        async fn complete_params_pass_the_gate() {
            let deps = deps(scripted_ai(), StaticRetriever::new(vec![doc()]));
            let mut state = ConsultState::new();

            let run = run_turn(&deps, &mut state, "RWDR Auslegung", Some(full_params()))
                .await
                .unwrap();

            assert!(state.missing_fields.is_empty());
            assert!(run.visited(NodeId::Compute));
            assert!(run.visited(NodeId::Rag));
        }

        #[tokio::test]
        async fn missing_width_halts_with_open_form() {
            let deps = deps(scripted_ai(), StaticRetriever::new(vec![doc()]));
            let mut params = full_params();
            params.remove("breite_mm");
            let mut state = ConsultState::new();

            let run = run_turn(&deps, &mut state, "RWDR Auslegung", Some(params)).await.unwrap();

            assert_eq!(state.missing_fields, vec!["breite_mm".to_string()]);
            assert_eq!(state.phase, "respond");
            assert!(!run.visited(NodeId::Rag));
            match &state.ui_event {
                Some(event @ UiEvent::OpenForm(form)) => {
                    assert_eq!(event.action(), "open_form");
                    assert_eq!(form.missing, vec!["breite_mm".to_string()]);
                }
                other => panic!("expected open_form, got {:?}", other),
            }
            assert!(state.answer.contains("Breite"));
        }

        #[tokio::test]
        async fn high_pressure_asks_for_confirmation() {
            let deps = deps(scripted_ai(), StaticRetriever::new(vec![doc()]));
            let mut params = full_params();
            params.insert("druck_bar".into(), json!(5));
            let mut state = ConsultState::new();

            let run = run_turn(&deps, &mut state, "RWDR Auslegung", Some(params)).await.unwrap();

            assert!(run.visited(NodeId::AskMissing));
            assert!(!run.visited(NodeId::Rag));
            assert!(state.answer.contains("Druckstufen"));
        }
    }

    mod branching {
        use super::*;

        #[tokio::test]
        async fn evidence_routes_to_recommend() {
            let deps = deps(scripted_ai(), StaticRetriever::new(vec![doc()]));
            let mut state = ConsultState::new();

            let run = run_turn(&deps, &mut state, "RWDR Auslegung", Some(full_params()))
                .await
                .unwrap();

            assert!(run.visited(NodeId::Recommend));
            assert!(!run.visited(NodeId::Explain));
            assert_eq!(state.recommendations.len(), 1);
            assert!(state.validation.is_some());
            assert!(state.answer.contains("FKM"));
        }

        #[tokio::test]
        async fn no_evidence_routes_to_explain() {
            let deps = deps(scripted_ai(), StaticRetriever::empty());
            let mut state = ConsultState::new();

            let run = run_turn(&deps, &mut state, "RWDR Auslegung", Some(full_params()))
                .await
                .unwrap();

            assert!(run.visited(NodeId::Explain));
            assert!(!run.visited(NodeId::Recommend));
            assert!(run.visited(NodeId::ValidateAnswer));
            assert_eq!(state.validation.as_ref().map(|v| v.n_docs), Some(0));
            assert!(state.needs_more_params);
            assert_eq!(state.phase, "respond");
            assert!(!state.answer.is_empty());
        }

        #[tokio::test]
        async fn retrieval_failure_degrades_to_explain() {
            let deps = deps(scripted_ai(), StaticRetriever::failing());
            let mut state = ConsultState::new();

            let run = run_turn(&deps, &mut state, "RWDR Auslegung", Some(full_params()))
                .await
                .unwrap();

            assert!(run.visited(NodeId::Explain));
            assert!(state.retrieved_docs.is_empty());
        }

        #[tokio::test]
        async fn greeting_takes_the_smalltalk_branch() {
            let deps = deps(scripted_ai(), StaticRetriever::empty());
            let mut state = ConsultState::new();

            let run = run_turn(&deps, &mut state, "Hallo", None).await.unwrap();

            assert_eq!(
                run.visited,
                vec![NodeId::LiteRouter, NodeId::Smalltalk, NodeId::Respond]
            );
            assert!(!state.answer.is_empty());
        }
    }

    mod failures {
        use super::*;

        #[tokio::test]
        async fn failing_generation_still_answers() {
            let deps = deps(MockAIProvider::failing(), StaticRetriever::new(vec![doc()]));
            let mut state = ConsultState::new();

            let run = run_turn(&deps, &mut state, "RWDR Auslegung", Some(full_params()))
                .await
                .unwrap();

            assert!(run.visited(NodeId::Respond));
            assert!(state.recommendations.is_empty());
            assert_eq!(state.domain_id(), Some("rwdr"));
        }

        #[tokio::test]
        async fn stream_failure_falls_back_to_completion() {
            let ai = MockAIProvider::new()
                .with_purpose_response("extract", "{}")
                .with_purpose_response("classify", RWDR_CLASSIFICATION)
                .with_purpose_error(
                    "recommend",
                    MockError::Unavailable {
                        message: "stream down".into(),
                    },
                )
                .with_purpose_response("recommend", RECOMMENDATION);
            let calls = ai.clone();
            let deps = deps(ai, StaticRetriever::new(vec![doc()]));
            let mut state = ConsultState::new();

            run_turn(&deps, &mut state, "RWDR Auslegung", Some(full_params()))
                .await
                .unwrap();

            assert_eq!(calls.calls_for("recommend"), 2);
            assert_eq!(state.recommendations.len(), 1);
        }

        #[tokio::test]
        async fn step_budget_bounds_the_run() {
            let deps = deps(scripted_ai(), StaticRetriever::empty());
            let thread = ThreadId::from_chat_id("t1");
            let sink = GraphSink::detached();
            let ctx = NodeContext::new(&deps, &thread, &sink);
            let mut state = ConsultState::new();
            state.begin_turn("RWDR Auslegung", Some(full_params()));

            let err = consult_graph()
                .with_step_budget(3)
                .run(&mut state, &ctx)
                .await
                .unwrap_err();

            assert_eq!(err, GraphError::StepBudgetExceeded(3));
        }

        #[tokio::test]
        async fn unregistered_domain_fails_the_node() {
            let deps = deps(scripted_ai(), StaticRetriever::empty());
            let thread = ThreadId::from_chat_id("t1");
            let sink = GraphSink::detached();
            let ctx = NodeContext::new(&deps, &thread, &sink);
            let mut state = ConsultState::new();
            state.apply(StatePatch::Domain {
                id: "pumps".into(),
                confidence: 0.99,
            });

            let err = run_node(NodeId::NeedGate, &state, &ctx).await.unwrap_err();

            assert_eq!(err, NodeError::UnknownDomain("pumps".into()));
        }
    }

    mod accumulation {
        use super::*;

        #[tokio::test]
        async fn params_survive_a_turn_without_new_values() {
            let deps = deps(scripted_ai(), StaticRetriever::empty());
            let mut state = ConsultState::new();
            run_turn(&deps, &mut state, "RWDR Auslegung", Some(full_params()))
                .await
                .unwrap();

            run_turn(&deps, &mut state, "Und was ist mit der Lebensdauer der Dichtung?", None)
                .await
                .unwrap();

            assert_eq!(state.params["wellen_mm"], json!(25));
            assert_eq!(state.params["breite_mm"], json!(7));
        }
    }

    mod events {
        use super::*;

        #[tokio::test]
        async fn sink_receives_text_and_ui_events_in_order() {
            let deps = deps(scripted_ai(), StaticRetriever::new(vec![doc()]));
            let thread = ThreadId::from_chat_id("t1");
            let (sink, mut rx) = GraphSink::channel(256, None);
            let mut state = ConsultState::new();
            state.begin_turn("RWDR Auslegung", Some(full_params()));

            {
                let ctx = NodeContext::new(&deps, &thread, &sink);
                consult_graph().run(&mut state, &ctx).await.unwrap();
            }
            drop(sink);

            let mut text = String::new();
            let mut snapshots = 0;
            let mut finished = Vec::new();
            while let Some(event) = rx.recv().await {
                match event {
                    GraphEvent::Text { node, text: piece } => {
                        assert_eq!(node, NodeId::Recommend);
                        text.push_str(&piece);
                    }
                    GraphEvent::Ui(UiEvent::CalcSnapshot { .. }) => snapshots += 1,
                    GraphEvent::Ui(other) => panic!("unexpected ui event {:?}", other),
                    GraphEvent::NodeFinished { node } => finished.push(node),
                }
            }

            assert_eq!(text, RECOMMENDATION);
            assert_eq!(snapshots, 2);
            assert_eq!(finished.last(), Some(&NodeId::Respond));
        }
    }
}
