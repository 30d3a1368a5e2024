//! HTTP retriever - Calls an external hybrid retrieval service.
//!
//! The service receives `{query, tenant, k, filters, rerank}` as JSON and
//! answers either with a bare document list or `{"docs": [...]}`. Each
//! document carries `text`, and optionally `source` and the
//! `vector_score` / `keyword_score` / `fused_score` ranking scores.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::consult::RetrievedDoc;
use crate::ports::{RetrievalError, RetrievalRequest, Retriever};

/// Configuration for the HTTP retriever.
#[derive(Debug, Clone)]
pub struct HttpRetrieverConfig {
    /// Full endpoint URL.
    pub url: String,
    /// Request timeout.
    pub timeout: Duration,
}

impl HttpRetrieverConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Retriever backed by a JSON HTTP endpoint.
pub struct HttpRetriever {
    config: HttpRetrieverConfig,
    client: Client,
}

impl HttpRetriever {
    pub fn new(config: HttpRetrieverConfig) -> Self {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { config, client }
    }
}

#[derive(Debug, Serialize)]
struct RetrieveBody<'a> {
    query: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    tenant: Option<&'a str>,
    k: usize,
    filters: &'a Map<String, Value>,
    rerank: bool,
}

impl<'a> From<&'a RetrievalRequest> for RetrieveBody<'a> {
    fn from(request: &'a RetrievalRequest) -> Self {
        Self {
            query: &request.query,
            tenant: request.tenant.as_deref(),
            k: request.k,
            filters: &request.filters,
            rerank: request.rerank,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RetrieveResponse {
    Wrapped { docs: Vec<RetrievedDoc> },
    Bare(Vec<RetrievedDoc>),
}

fn parse_response(body: &str) -> Result<Vec<RetrievedDoc>, RetrievalError> {
    let parsed: RetrieveResponse =
        serde_json::from_str(body).map_err(|e| RetrievalError::InvalidResponse(e.to_string()))?;
    Ok(match parsed {
        RetrieveResponse::Wrapped { docs } | RetrieveResponse::Bare(docs) => docs,
    })
}

#[async_trait]
impl Retriever for HttpRetriever {
    async fn hybrid_retrieve(&self, request: RetrievalRequest) -> Result<Vec<RetrievedDoc>, RetrievalError> {
        let response = self
            .client
            .post(&self.config.url)
            .json(&RetrieveBody::from(&request))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RetrievalError::Timeout
                } else {
                    RetrievalError::Unavailable(e.to_string())
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| RetrievalError::Unavailable(e.to_string()))?;
        if !status.is_success() {
            return Err(RetrievalError::Unavailable(format!("status {}: {}", status, body)));
        }

        let mut docs = parse_response(&body)?;
        docs.truncate(request.k);
        Ok(docs)
    }
}
