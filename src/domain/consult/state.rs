//! Per-thread consultation state and the patch type nodes return.
//!
//! Nodes never mutate [`ConsultState`] directly. They return a list of
//! [`StatePatch`] values and the graph engine folds them in with
//! [`ConsultState::apply`], which is the single place merge rules live:
//!
//! - `params` keys are added or overwritten, never removed, and blank
//!   values never overwrite anything
//! - `domain` only moves to a different domain on higher confidence
//! - evidence is written once per turn
//! - a pending UI event is merged, not stacked

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::evidence::{AnswerValidation, RetrievedDoc};
use super::params::{self, Params};
use super::synthesizer::Recommendation;

// ════════════════════════════════════════════════════════════════════════════════
// Messages
// ════════════════════════════════════════════════════════════════════════════════

/// Role of a conversation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single role-tagged message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Derived values
// ════════════════════════════════════════════════════════════════════════════════

/// Output of the deterministic calculation engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Derived {
    #[serde(default)]
    pub calculated: BTreeMap<String, f64>,
    #[serde(default)]
    pub flags: BTreeMap<String, bool>,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub requirements: Vec<String>,
    #[serde(default)]
    pub material_whitelist: Vec<String>,
    #[serde(default)]
    pub material_blacklist: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relativgeschwindigkeit_ms: Option<f64>,
    #[serde(default)]
    pub pv_warning: bool,
}

impl Derived {
    pub fn flag(&self, name: &str) -> bool {
        self.flags.get(name).copied().unwrap_or(false)
    }

    pub fn set_flag(&mut self, name: &str) {
        self.flags.insert(name.to_string(), true);
    }

    pub fn value(&self, name: &str) -> Option<f64> {
        self.calculated.get(name).copied()
    }

    /// Deep merge: maps are overlaid, lists are extended without duplicates.
    pub fn merge(&mut self, other: Derived) {
        self.calculated.extend(other.calculated);
        self.flags.extend(other.flags);
        extend_unique(&mut self.warnings, other.warnings);
        extend_unique(&mut self.requirements, other.requirements);
        extend_unique(&mut self.material_whitelist, other.material_whitelist);
        extend_unique(&mut self.material_blacklist, other.material_blacklist);
        if other.relativgeschwindigkeit_ms.is_some() {
            self.relativgeschwindigkeit_ms = other.relativgeschwindigkeit_ms;
        }
        self.pv_warning |= other.pv_warning;
    }
}

fn extend_unique(target: &mut Vec<String>, items: Vec<String>) {
    for item in items {
        if !target.contains(&item) {
            target.push(item);
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// UI events
// ════════════════════════════════════════════════════════════════════════════════

/// Payload of an `open_form` side-effect.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OpenForm {
    pub form_id: String,
    pub schema_ref: String,
    pub missing: Vec<String>,
    pub prefill: Params,
}

impl OpenForm {
    /// Form for `domain` asking for `missing`, prefilled with known values.
    pub fn for_domain(domain: &str, missing: Vec<String>, known: &Params) -> Self {
        Self {
            form_id: format!("{}_params_v1", domain),
            schema_ref: format!("domains/{}/params@1.0.0", domain),
            missing,
            prefill: params::non_blank(known),
        }
    }

    fn merge(mut self, newer: OpenForm) -> OpenForm {
        if !newer.form_id.is_empty() {
            self.form_id = newer.form_id;
        }
        if !newer.schema_ref.is_empty() {
            self.schema_ref = newer.schema_ref;
        }
        if !newer.missing.is_empty() {
            self.missing = newer.missing;
        }
        for (k, v) in newer.prefill {
            if !params::is_blank(&v) {
                self.prefill.insert(k, v);
            }
        }
        self
    }
}

/// Client side-effect requested by the graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "ui_action", rename_all = "snake_case")]
pub enum UiEvent {
    OpenForm(OpenForm),
    CalcSnapshot { derived: Derived },
}

impl UiEvent {
    pub fn action(&self) -> &'static str {
        match self {
            UiEvent::OpenForm(_) => "open_form",
            UiEvent::CalcSnapshot { .. } => "calc_snapshot",
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// State
// ════════════════════════════════════════════════════════════════════════════════

/// Macro-branch chosen at graph entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    Smalltalk,
    Default,
}

impl Route {
    pub fn as_str(&self) -> &'static str {
        match self {
            Route::Smalltalk => "smalltalk",
            Route::Default => "default",
        }
    }
}

/// Conversation state for one thread.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConsultState {
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub params: Params,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub domain_confidence: f64,
    #[serde(default)]
    pub derived: Derived,
    #[serde(default)]
    pub missing_fields: Vec<String>,
    #[serde(default)]
    pub ui_event: Option<UiEvent>,
    #[serde(default)]
    pub retrieved_docs: Vec<RetrievedDoc>,
    #[serde(default)]
    pub context: String,
    #[serde(default)]
    pub phase: String,

    #[serde(default)]
    pub route: Option<Route>,
    #[serde(default)]
    pub input: String,
    /// The client sent a params patch with this turn.
    #[serde(default)]
    pub form_submitted: bool,
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub recommendations: Vec<Recommendation>,
    #[serde(default)]
    pub validation: Option<AnswerValidation>,
    #[serde(default)]
    pub needs_more_params: bool,
    #[serde(default)]
    pub answer: String,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,

    #[serde(skip)]
    evidence_locked: bool,
}

/// A single state change returned by a node.
#[derive(Debug, Clone, PartialEq)]
pub enum StatePatch {
    Route(Route),
    AppendMessage(Message),
    /// Overlay of non-blank values; never removes keys.
    MergeParams(Params),
    Domain { id: String, confidence: f64 },
    MissingFields(Vec<String>),
    /// Deep-merged into `derived`.
    Derived(Derived),
    UiEvent(UiEvent),
    Evidence { docs: Vec<RetrievedDoc>, context: String },
    Query(String),
    Recommendations(Vec<Recommendation>),
    Validation(AnswerValidation),
    NeedsMoreParams(bool),
    Answer(String),
}

impl StatePatch {
    pub fn kind(&self) -> &'static str {
        match self {
            StatePatch::Route(_) => "route",
            StatePatch::AppendMessage(_) => "append_message",
            StatePatch::MergeParams(_) => "merge_params",
            StatePatch::Domain { .. } => "domain",
            StatePatch::MissingFields(_) => "missing_fields",
            StatePatch::Derived(_) => "derived",
            StatePatch::UiEvent(_) => "ui_event",
            StatePatch::Evidence { .. } => "evidence",
            StatePatch::Query(_) => "query",
            StatePatch::Recommendations(_) => "recommendations",
            StatePatch::Validation(_) => "validation",
            StatePatch::NeedsMoreParams(_) => "needs_more_params",
            StatePatch::Answer(_) => "answer",
        }
    }
}

impl ConsultState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resets per-turn fields and records the inbound message.
    ///
    /// A client params patch is an explicit form submission and wins over
    /// anything already known. `derived` is recomputed from the current
    /// params each turn, so it starts empty.
    pub fn begin_turn(&mut self, input: &str, params_patch: Option<Params>) {
        self.route = None;
        self.derived = Derived::default();
        self.retrieved_docs.clear();
        self.context.clear();
        self.evidence_locked = false;
        self.query.clear();
        self.recommendations.clear();
        self.validation = None;
        self.needs_more_params = false;
        self.answer.clear();
        self.phase.clear();
        self.ui_event = None;

        let input = input.trim();
        self.input = input.to_string();
        if !input.is_empty() {
            self.messages.push(Message::user(input));
        }
        self.form_submitted = false;
        if let Some(patch) = params_patch {
            for (k, v) in patch {
                if !params::is_blank(&v) {
                    self.form_submitted = true;
                    self.params.insert(k, v);
                }
            }
        }
    }

    /// Folds one patch into the state.
    pub fn apply(&mut self, patch: StatePatch) {
        match patch {
            StatePatch::Route(route) => self.route = Some(route),
            StatePatch::AppendMessage(message) => self.messages.push(message),
            StatePatch::MergeParams(incoming) => {
                for (k, v) in incoming {
                    if !params::is_blank(&v) {
                        self.params.insert(k, v);
                    }
                }
            }
            StatePatch::Domain { id, confidence } => self.apply_domain(id, confidence),
            StatePatch::MissingFields(missing) => self.missing_fields = missing,
            StatePatch::Derived(derived) => self.derived.merge(derived),
            StatePatch::UiEvent(event) => self.apply_ui_event(event),
            StatePatch::Evidence { docs, context } => {
                if !self.evidence_locked {
                    self.retrieved_docs = docs;
                    self.context = context;
                    self.evidence_locked = true;
                }
            }
            StatePatch::Query(query) => self.query = query,
            StatePatch::Recommendations(recs) => self.recommendations = recs,
            StatePatch::Validation(validation) => self.validation = Some(validation),
            StatePatch::NeedsMoreParams(flag) => self.needs_more_params = flag,
            StatePatch::Answer(answer) => self.answer = answer,
        }
    }

    pub fn apply_all(&mut self, patches: impl IntoIterator<Item = StatePatch>) {
        for patch in patches {
            self.apply(patch);
        }
    }

    fn apply_domain(&mut self, id: String, confidence: f64) {
        match &self.domain {
            Some(current) if *current == id => {
                self.domain_confidence = self.domain_confidence.max(confidence);
            }
            Some(_) if confidence <= self.domain_confidence => {}
            _ => {
                self.domain = Some(id);
                self.domain_confidence = confidence;
            }
        }
    }

    fn apply_ui_event(&mut self, event: UiEvent) {
        let merged = match (self.ui_event.take(), event) {
            (Some(UiEvent::OpenForm(pending)), UiEvent::OpenForm(newer)) => {
                UiEvent::OpenForm(pending.merge(newer))
            }
            (_, newer) => newer,
        };
        let merged = match merged {
            UiEvent::OpenForm(mut form) => {
                let params = &self.params;
                form.missing.retain(|key| params::is_unset(params, key));
                UiEvent::OpenForm(form)
            }
            other => other,
        };
        self.ui_event = Some(merged);
    }

    /// True once evidence has been written in the current turn.
    pub fn evidence_locked(&self) -> bool {
        self.evidence_locked
    }

    /// Most recent user message, falling back to the raw turn input.
    pub fn last_user_text(&self) -> &str {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User && !m.content.trim().is_empty())
            .map(|m| m.content.trim())
            .unwrap_or_else(|| self.input.trim())
    }

    /// All user messages joined with spaces.
    pub fn joined_user_text(&self) -> String {
        self.messages
            .iter()
            .filter(|m| m.role == Role::User)
            .map(|m| m.content.trim())
            .filter(|c| !c.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn last_assistant_text(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant)
            .map(|m| m.content.as_str())
    }

    /// Swaps the turn's answer for `text` in `answer` and in the trailing
    /// assistant message the graph wrote for it.
    pub fn replace_answer(&mut self, text: &str) {
        if self.answer == text {
            return;
        }
        match self.messages.last_mut() {
            Some(last) if last.role == Role::Assistant && last.content == self.answer => {
                last.content = text.to_string();
            }
            _ => self.messages.push(Message::assistant(text)),
        }
        self.answer = text.to_string();
    }

    pub fn domain_id(&self) -> Option<&str> {
        self.domain.as_deref()
    }

    /// Compact view logged when a node fails.
    pub fn snapshot(&self) -> serde_json::Value {
        serde_json::json!({
            "phase": self.phase,
            "domain": self.domain,
            "params": self.params,
            "missing_fields": self.missing_fields,
            "n_messages": self.messages.len(),
            "n_docs": self.retrieved_docs.len(),
        })
    }
}
