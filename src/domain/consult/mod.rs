//! Consultation domain module.
//!
//! Pure building blocks of a seal-selection consultation: the per-thread
//! state and its patch merge, the domain registry with per-domain
//! calculators, parameter extraction, routing and gating policy, and the
//! parsing/rendering of recommendations. Nothing here performs I/O; model
//! and retrieval calls are made by the application layer, which feeds the
//! answers back into these functions.

pub mod calc;
pub mod domains;
pub mod evidence;
pub mod explain;
pub mod extract;
pub mod gate;
pub mod json;
pub mod params;
pub mod query;
pub mod registry;
pub mod router;
pub mod smalltalk;
pub mod state;
pub mod synthesizer;

pub use evidence::{AnswerValidation, RetrievedDoc};
pub use explain::{ExplainInput, Explanation};
pub use extract::ExtractError;
pub use gate::GateHalt;
pub use json::JsonError;
pub use params::Params;
pub use registry::{DomainRegistry, DomainSpec, FieldKind, FieldSpec, RegistryError};
pub use router::{Classification, RouteDecision, RouteSource, RouterPolicy};
pub use state::{ConsultState, Derived, Message, OpenForm, Role, Route, StatePatch, UiEvent};
pub use synthesizer::{ParseFailure, ParseLevel, Recommendation};
