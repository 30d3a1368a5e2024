//! Domain layer containing consultation logic and domain types.
//!
//! # Module Organization
//!
//! - `foundation` - Shared domain primitives (thread, turn and user ids)
//! - `consult` - Consultation state, domain registry, calculators and policies
//! - `streaming` - Fragment coalescing and the WebSocket wire protocol

pub mod consult;
pub mod foundation;
pub mod streaming;
