//! Application layer - the consultation graph and the turn handlers.
//!
//! This layer orchestrates domain operations and coordinates between ports.

pub mod consult;
pub mod handlers;
pub mod turn_signal;

pub use consult::{consult_graph, ConsultDeps, Graph, GraphError, GraphSink, RagSettings};
pub use handlers::{
    stream_turn, ConsultService, StreamSettings, TurnError, TurnOutcome, TurnRequest,
};
pub use turn_signal::{CancelRegistry, Outbound, TurnEmitter, TurnInProgress, TurnSignal};
