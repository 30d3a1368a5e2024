//! Application handlers.
//!
//! Turn execution shared by both surfaces, and the streaming delivery on top.

pub mod run_turn;
pub mod stream_turn;

pub use run_turn::{
    ConsultService, PreparedTurn, TurnError, TurnOutcome, TurnRequest, STM_SEED_MESSAGES,
};
pub use stream_turn::{stream_turn, StreamSettings};
