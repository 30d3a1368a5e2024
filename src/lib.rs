//! Seal Consult - Streaming technical consultation for industrial seal selection
//!
//! A per-thread state graph gathers application parameters, gates on missing
//! fields, computes derived engineering values, retrieves evidence and
//! synthesizes a recommendation, streaming text and UI events over WebSocket.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
