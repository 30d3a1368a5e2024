//! Streaming delivery domain: fragment coalescing and the wire protocol.

pub mod coalescer;
pub mod events;

pub use coalescer::{CoalescePolicy, Coalescer, FLUSH_ENDINGS};
pub use events::{
    ClientControl, ClientFrame, ErrorCode, FrameError, FrameLimits, PongFrame, ServerEvent, UiActionFrame,
};
