//! Retriever over a fixed document list.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::domain::consult::RetrievedDoc;
use crate::ports::{RetrievalError, RetrievalRequest, Retriever};

/// Returns the same documents for every query, capped at `k`.
#[derive(Debug, Default)]
pub struct StaticRetriever {
    docs: Vec<RetrievedDoc>,
    fail: bool,
    requests: Mutex<Vec<RetrievalRequest>>,
}

impl StaticRetriever {
    pub fn new(docs: Vec<RetrievedDoc>) -> Self {
        Self {
            docs,
            ..Self::default()
        }
    }

    /// A retriever that never finds anything.
    pub fn empty() -> Self {
        Self::default()
    }

    /// A retriever whose every call fails as unavailable.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<RetrievalRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Retriever for StaticRetriever {
    async fn hybrid_retrieve(&self, request: RetrievalRequest) -> Result<Vec<RetrievedDoc>, RetrievalError> {
        let k = request.k;
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request);
        }
        if self.fail {
            return Err(RetrievalError::Unavailable("static retriever configured to fail".into()));
        }
        Ok(self.docs.iter().take(k).cloned().collect())
    }
}
