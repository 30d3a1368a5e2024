//! Domain classification policy.
//!
//! The classifiers themselves are model calls made by the application
//! layer; this module owns the prompt, the answer parsing and the decision
//! of which answer to trust.

use serde::{Deserialize, Serialize};

use super::json::{parse_object, JsonError};
use super::params::{self, Params};
use super::registry::DomainRegistry;

/// One classifier answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub domain: String,
    pub confidence: f64,
}

impl Classification {
    /// Answer used when a classifier call or its parsing failed.
    pub fn unknown() -> Self {
        Self {
            domain: String::new(),
            confidence: 0.0,
        }
    }
}

/// Parses `{"domain": str, "confidence": float}` from a model response.
pub fn parse_classification(response: &str) -> Result<Classification, JsonError> {
    let map = parse_object(response)?;
    let domain = map
        .get("domain")
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_lowercase())
        .unwrap_or_default();
    let confidence = map
        .get("confidence")
        .and_then(params::as_f64)
        .unwrap_or(0.0)
        .clamp(0.0, 1.0);
    Ok(Classification { domain, confidence })
}

/// Prompt for both classifiers.
pub fn classification_prompt(registry: &DomainRegistry, user_text: &str, params: &Params) -> String {
    let params_json = serde_json::to_string(params).unwrap_or_else(|_| "{}".into());
    format!(
        "Ordne die Anfrage genau einer Dichtungsdomäne zu. Erlaubte Domänen: {}.\n\
         Antworte nur mit JSON: {{\"domain\": \"<id>\", \"confidence\": <0..1>}}.\n\
         Bekannte Parameter: {}\n\
         Anfrage: {}",
        registry.ids().join(", "),
        params_json,
        user_text
    )
}

/// Where the final domain came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteSource {
    Primary,
    Fallback,
    Heuristic,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RouteDecision {
    pub domain: String,
    pub confidence: f64,
    pub source: RouteSource,
}

/// Acceptance thresholds for classifier answers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RouterPolicy {
    /// Primary answers at or above this are accepted without a fallback.
    pub threshold: f64,
    /// Below this the keyword heuristic decides.
    pub floor: f64,
}

impl Default for RouterPolicy {
    fn default() -> Self {
        Self {
            threshold: 0.70,
            floor: 0.40,
        }
    }
}

impl RouterPolicy {
    /// True when the fallback classifier should be consulted.
    pub fn needs_fallback(&self, registry: &DomainRegistry, primary: &Classification) -> bool {
        primary.confidence < self.threshold || !registry.contains(&primary.domain)
    }

    /// Combines the classifier answers into a registered domain.
    pub fn resolve(
        &self,
        registry: &DomainRegistry,
        primary: Classification,
        fallback: Option<Classification>,
        user_text: &str,
        params: &Params,
    ) -> RouteDecision {
        let mut best = RouteDecision {
            domain: primary.domain.clone(),
            confidence: primary.confidence,
            source: RouteSource::Primary,
        };

        if self.needs_fallback(registry, &primary) {
            if let Some(fb) = fallback {
                if registry.contains(&fb.domain) && fb.confidence >= primary.confidence {
                    best = RouteDecision {
                        domain: fb.domain,
                        confidence: fb.confidence,
                        source: RouteSource::Fallback,
                    };
                }
            }
        }

        if best.confidence < self.floor || !registry.contains(&best.domain) {
            best = RouteDecision {
                domain: heuristic_domain(registry, user_text, params),
                confidence: best.confidence,
                source: RouteSource::Heuristic,
            };
        }
        best
    }
}

/// Keyword rules over the latest user text, then the default domain.
pub fn heuristic_domain(registry: &DomainRegistry, user_text: &str, params: &Params) -> String {
    let text = user_text.to_lowercase();
    let pick = |id: &str| registry.contains(id).then(|| id.to_string());

    let by_keyword = if text.contains("wellendichtring") || text.contains("rwdr") {
        pick("rwdr")
    } else if ["stangendichtung", "kolbenstange", "hydraulik"]
        .iter()
        .any(|k| text.contains(k))
    {
        pick("hydraulics_rod")
    } else if params::text(params, "bauform")
        .map(|b| b.to_uppercase().starts_with("BA"))
        .unwrap_or(false)
    {
        pick("rwdr")
    } else {
        None
    };

    by_keyword.unwrap_or_else(|| registry.first().id.to_string())
}
