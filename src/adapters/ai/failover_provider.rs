//! Failover AI Provider - Wrapper that provides automatic failover between providers.
//!
//! When the primary provider fails with a transient error (rate limit, unavailable),
//! automatically falls back to the secondary provider if configured. The
//! service pairs the configured model with its `fallback_model` this way.
//!
//! # Example
//!
//! ```ignore
//! let primary = Arc::new(OpenAIProvider::new(config.clone()));
//! let fallback = Arc::new(OpenAIProvider::new(config.with_model("gpt-4o-mini")));
//!
//! let provider = FailoverAIProvider::new(primary).with_fallback(fallback);
//! ```

use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::ports::{
    AIError, AIProvider, CompletionRequest, CompletionResponse, ProviderInfo, StreamChunk,
};

/// AI provider wrapper with automatic failover support.
pub struct FailoverAIProvider {
    primary: Arc<dyn AIProvider>,
    fallback: Option<Arc<dyn AIProvider>>,
    failovers: AtomicU64,
}

impl FailoverAIProvider {
    /// Creates a new failover provider with only a primary provider.
    pub fn new(primary: Arc<dyn AIProvider>) -> Self {
        Self {
            primary,
            fallback: None,
            failovers: AtomicU64::new(0),
        }
    }

    /// Adds a fallback provider.
    pub fn with_fallback(mut self, fallback: Arc<dyn AIProvider>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// Number of requests served by the fallback so far.
    pub fn failover_count(&self) -> u64 {
        self.failovers.load(Ordering::Relaxed)
    }

    /// The fallback to use for `err`, if any.
    fn fallback_for(&self, err: &AIError, request: &CompletionRequest) -> Option<&Arc<dyn AIProvider>> {
        let fallback = self.fallback.as_ref().filter(|_| err.is_retryable())?;
        self.failovers.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(
            primary = %self.primary.provider_info().model,
            fallback = %fallback.provider_info().model,
            purpose = request.metadata.purpose,
            trace_id = %request.metadata.trace_id,
            error = %err,
            "AI provider failover"
        );
        Some(fallback)
    }
}

#[async_trait]
impl AIProvider for FailoverAIProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, AIError> {
        match self.primary.complete(request.clone()).await {
            Ok(response) => Ok(response),
            Err(err) => match self.fallback_for(&err, &request) {
                Some(fallback) => fallback.complete(request).await,
                None => Err(err),
            },
        }
    }

    async fn stream_complete(
        &self,
        request: CompletionRequest,
    ) -> Result<Pin<Box<dyn Stream<Item = Result<StreamChunk, AIError>> + Send>>, AIError> {
        // Only failures before the first chunk can fail over.
        match self.primary.stream_complete(request.clone()).await {
            Ok(stream) => Ok(stream),
            Err(err) => match self.fallback_for(&err, &request) {
                Some(fallback) => fallback.stream_complete(request).await,
                None => Err(err),
            },
        }
    }

    fn provider_info(&self) -> ProviderInfo {
        self.primary.provider_info()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::ai::{MockAIProvider, MockError};
    use crate::ports::{Message, RequestMetadata};
    use futures::StreamExt;

    fn make_request() -> CompletionRequest {
        CompletionRequest::new(RequestMetadata::new("chat", "trace-123")).with_message(Message::user("Hallo"))
    }

    fn provider(primary: MockAIProvider, fallback: Option<MockAIProvider>) -> FailoverAIProvider {
        let base = FailoverAIProvider::new(Arc::new(primary));
        match fallback {
            Some(fallback) => base.with_fallback(Arc::new(fallback)),
            None => base,
        }
    }

    #[tokio::test]
    async fn primary_success_no_fallback_used() {
        let provider = provider(
            MockAIProvider::new().with_response("Hi there!"),
            Some(MockAIProvider::new().with_response("Fallback response")),
        );

        let response = provider.complete(make_request()).await.unwrap();

        assert_eq!(response.content, "Hi there!");
        assert_eq!(provider.failover_count(), 0);
    }

    #[tokio::test]
    async fn primary_rate_limited_uses_fallback() {
        let provider = provider(
            MockAIProvider::new().with_error(MockError::RateLimited { retry_after_secs: 30 }),
            Some(MockAIProvider::new().with_response("Fallback response")),
        );

        let response = provider.complete(make_request()).await.unwrap();

        assert_eq!(response.content, "Fallback response");
        assert_eq!(provider.failover_count(), 1);
    }

    #[tokio::test]
    async fn non_retryable_error_not_fallback() {
        let provider = provider(
            MockAIProvider::new().with_error(MockError::AuthenticationFailed),
            Some(MockAIProvider::new().with_response("Fallback response")),
        );

        let result = provider.complete(make_request()).await;

        assert!(matches!(result.unwrap_err(), AIError::AuthenticationFailed));
        assert_eq!(provider.failover_count(), 0);
    }

    #[tokio::test]
    async fn no_fallback_configured_returns_error() {
        let provider = provider(
            MockAIProvider::new().with_error(MockError::RateLimited { retry_after_secs: 30 }),
            None,
        );
        assert!(provider.complete(make_request()).await.is_err());
    }

    #[tokio::test]
    async fn fallback_also_fails_returns_fallback_error() {
        let provider = provider(
            MockAIProvider::new().with_error(MockError::RateLimited { retry_after_secs: 30 }),
            Some(MockAIProvider::new().with_error(MockError::AuthenticationFailed)),
        );

        let result = provider.complete(make_request()).await;

        assert!(matches!(result.unwrap_err(), AIError::AuthenticationFailed));
        assert_eq!(provider.failover_count(), 1);
    }

    #[tokio::test]
    async fn stream_fails_over_before_first_chunk() {
        let provider = provider(
            MockAIProvider::new().with_error(MockError::Unavailable {
                message: "down".to_string(),
            }),
            Some(MockAIProvider::new().with_response("aus dem Ersatzmodell")),
        );

        let mut stream = provider.stream_complete(make_request()).await.unwrap();
        let mut text = String::new();
        while let Some(chunk) = stream.next().await {
            text.push_str(&chunk.unwrap().delta);
        }
        assert_eq!(text, "aus dem Ersatzmodell");
    }
}
