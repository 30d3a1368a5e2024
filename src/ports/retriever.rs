//! Retrieval Port - Interface for the evidence oracle.
//!
//! A retriever returns ranked passages for a query. It is treated as a
//! black box: the consultation only reads `text`, `source` and the scores.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::domain::consult::RetrievedDoc;

/// Parameters of one hybrid retrieval call.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalRequest {
    pub query: String,
    pub tenant: Option<String>,
    pub k: usize,
    pub filters: Map<String, Value>,
    pub rerank: bool,
}

impl RetrievalRequest {
    pub fn new(query: impl Into<String>, k: usize) -> Self {
        Self {
            query: query.into(),
            tenant: None,
            k,
            filters: Map::new(),
            rerank: true,
        }
    }

    pub fn with_tenant(mut self, tenant: Option<String>) -> Self {
        self.tenant = tenant.filter(|t| !t.trim().is_empty());
        self
    }

    pub fn with_filter(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.filters.insert(key.to_string(), value.into());
        self
    }

    pub fn with_rerank(mut self, rerank: bool) -> Self {
        self.rerank = rerank;
        self
    }
}

/// Retrieval errors.
#[derive(Debug, thiserror::Error)]
pub enum RetrievalError {
    #[error("retrieval unavailable: {0}")]
    Unavailable(String),

    #[error("retrieval timed out")]
    Timeout,

    #[error("invalid retrieval response: {0}")]
    InvalidResponse(String),
}

/// Port for ranked evidence retrieval.
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Ranked passages for the request, best first, at most `k`.
    async fn hybrid_retrieve(&self, request: RetrievalRequest) -> Result<Vec<RetrievedDoc>, RetrievalError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_drops_blank_tenant() {
        let req = RetrievalRequest::new("FKM", 6).with_tenant(Some(" ".into()));
        assert!(req.tenant.is_none());
        assert!(req.rerank);
    }

    #[test]
    fn filters_accumulate() {
        let req = RetrievalRequest::new("q", 3)
            .with_filter("domain", "rwdr")
            .with_rerank(false);
        assert_eq!(req.filters["domain"], "rwdr");
        assert!(!req.rerank);
    }
}
