//! Retrieved evidence and the pure functions that read it.

use serde::{Deserialize, Serialize};

const CONTEXT_MAX_DOCS: usize = 6;
const CONTEXT_MAX_CHARS: usize = 1200;
const NO_DOCS_CONFIDENCE: f64 = 0.15;
const NEEDS_MORE_BELOW: f64 = 0.35;

/// A ranked passage returned by the retrieval oracle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrievedDoc {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keyword_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fused_score: Option<f64>,
}

impl RetrievedDoc {
    /// Fused score if present, otherwise `max(vector, keyword / 100)`.
    pub fn score(&self) -> f64 {
        match self.fused_score {
            Some(fused) => fused,
            None => self
                .vector_score
                .unwrap_or(0.0)
                .max(self.keyword_score.unwrap_or(0.0) / 100.0),
        }
    }
}

/// Quality assessment of the evidence behind an answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerValidation {
    pub n_docs: usize,
    pub confidence: f64,
    pub top_source: String,
}

/// Compact prompt context: up to six passages with their source, capped
/// at 1200 characters.
pub fn context_from_docs(docs: &[RetrievedDoc]) -> String {
    let parts: Vec<String> = docs
        .iter()
        .take(CONTEXT_MAX_DOCS)
        .filter_map(|doc| {
            let text = doc.text.trim();
            if text.is_empty() {
                return None;
            }
            Some(match doc.source.as_deref().filter(|s| !s.is_empty()) {
                Some(source) => format!("{}\n[source: {}]", text, source),
                None => text.to_string(),
            })
        })
        .collect();
    truncate_chars(&parts.join("\n\n"), CONTEXT_MAX_CHARS)
}

/// Distinct sources of the `k` best-scoring docs.
pub fn top_sources(docs: &[RetrievedDoc], k: usize) -> Vec<String> {
    let mut ranked: Vec<&RetrievedDoc> = docs.iter().collect();
    ranked.sort_by(|a, b| b.score().total_cmp(&a.score()));

    let mut out: Vec<String> = Vec::new();
    for doc in ranked.into_iter().take(k) {
        if let Some(source) = doc.source.as_deref().filter(|s| !s.is_empty()) {
            if !out.iter().any(|s| s == source) {
                out.push(source.to_string());
            }
        }
    }
    out
}

/// Mean score over the first six docs, sigmoid-squashed when a score is
/// outside `[0, 1]`, clamped to `[0.05, 0.98]`.
pub fn answer_confidence(docs: &[RetrievedDoc]) -> f64 {
    if docs.is_empty() {
        return NO_DOCS_CONFIDENCE;
    }
    let values: Vec<f64> = docs
        .iter()
        .take(CONTEXT_MAX_DOCS)
        .map(|doc| {
            let base = doc.score();
            if (0.0..=1.0).contains(&base) {
                base
            } else {
                sigmoid(base)
            }
        })
        .collect();
    let mean = values.iter().sum::<f64>() / values.len().max(1) as f64;
    mean.clamp(0.05, 0.98)
}

/// Validation record plus whether more parameters should be requested.
pub fn validate_answer(docs: &[RetrievedDoc], already_needs_more: bool) -> (AnswerValidation, bool) {
    let confidence = answer_confidence(docs);
    let validation = AnswerValidation {
        n_docs: docs.len(),
        confidence: (confidence * 1000.0).round() / 1000.0,
        top_source: docs
            .first()
            .and_then(|d| d.source.clone())
            .unwrap_or_default(),
    };
    (validation, already_needs_more || confidence < NEEDS_MORE_BELOW)
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Truncates on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}
