//! Consultation graph configuration

use serde::Deserialize;

use super::error::ValidationError;
use crate::application::RagSettings;
use crate::domain::consult::{DomainRegistry, RouterPolicy};

/// Domains, routing thresholds and retrieval parameters
#[derive(Debug, Clone, Deserialize)]
pub struct ConsultConfig {
    /// Comma-separated domain ids; the first is the default domain
    #[serde(default = "default_enabled_domains")]
    pub enabled_domains: String,

    /// Primary classifier confidence accepted without a second opinion
    #[serde(default = "default_router_threshold")]
    pub router_threshold: f64,

    /// Below this confidence the keyword heuristic decides
    #[serde(default = "default_router_floor")]
    pub router_floor: f64,

    /// Documents requested from retrieval
    #[serde(default = "default_rag_k")]
    pub rag_k: usize,

    /// Ask retrieval to rerank
    #[serde(default = "default_rag_rerank")]
    pub rag_rerank: bool,

    /// Retrieval tenant
    pub tenant: Option<String>,
}

impl ConsultConfig {
    pub fn domain_ids(&self) -> Vec<String> {
        self.enabled_domains
            .split(',')
            .map(|d| d.trim().to_lowercase())
            .filter(|d| !d.is_empty())
            .collect()
    }

    pub fn registry(&self) -> Result<DomainRegistry, ValidationError> {
        DomainRegistry::with_enabled(&self.domain_ids()).map_err(|e| ValidationError::InvalidDomains(e.to_string()))
    }

    pub fn router_policy(&self) -> RouterPolicy {
        RouterPolicy {
            threshold: self.router_threshold,
            floor: self.router_floor,
        }
    }

    pub fn rag_settings(&self) -> RagSettings {
        RagSettings {
            k: self.rag_k,
            rerank: self.rag_rerank,
            tenant: self.tenant.clone().filter(|t| !t.trim().is_empty()),
        }
    }

    /// Validate consultation configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.registry()?;
        let in_unit = |v: f64| (0.0..=1.0).contains(&v);
        if !in_unit(self.router_threshold) || !in_unit(self.router_floor) {
            return Err(ValidationError::OutOfRange("consult.router_threshold"));
        }
        if self.router_floor > self.router_threshold {
            return Err(ValidationError::OutOfRange("consult.router_floor"));
        }
        if self.rag_k == 0 {
            return Err(ValidationError::OutOfRange("consult.rag_k"));
        }
        Ok(())
    }
}

impl Default for ConsultConfig {
    fn default() -> Self {
        Self {
            enabled_domains: default_enabled_domains(),
            router_threshold: default_router_threshold(),
            router_floor: default_router_floor(),
            rag_k: default_rag_k(),
            rag_rerank: default_rag_rerank(),
            tenant: None,
        }
    }
}

fn default_enabled_domains() -> String {
    "rwdr,hydraulics_rod".to_string()
}

fn default_router_threshold() -> f64 {
    0.70
}

fn default_router_floor() -> f64 {
    0.40
}

fn default_rag_k() -> usize {
    6
}

fn default_rag_rerank() -> bool {
    true
}
