//! Mock AI Provider for testing.
//!
//! Provides a configurable mock implementation of the AIProvider port,
//! allowing tests to run whole consultation turns without calling real
//! AI APIs.
//!
//! # Features
//!
//! - Pre-configured responses, globally or per request purpose
//! - Simulated delays for timeout testing, per request and per chunk
//! - Error injection for resilience testing
//! - Call tracking for verification
//!
//! # Example
//!
//! ```ignore
//! let provider = MockAIProvider::new()
//!     .with_purpose_response("classify", r#"{"domain":"rwdr","confidence":0.9}"#)
//!     .with_response("Hallo!")
//!     .with_delay(Duration::from_millis(100));
//! ```

use async_trait::async_trait;
use futures::stream::{self, Stream, StreamExt};
use std::collections::{HashMap, VecDeque};
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;

use crate::ports::{
    AIError, AIProvider, CompletionRequest, CompletionResponse, FinishReason, ProviderInfo,
    StreamChunk, TokenUsage,
};

/// Mock AI provider for testing.
///
/// Responses scripted for a purpose are consumed first, then the general
/// queue, then the default response.
#[derive(Debug, Clone)]
pub struct MockAIProvider {
    /// Pre-configured responses (consumed in order).
    responses: Arc<Mutex<VecDeque<MockResponse>>>,
    /// Responses keyed by `RequestMetadata::purpose`.
    by_purpose: Arc<Mutex<HashMap<&'static str, VecDeque<MockResponse>>>>,
    /// Returned when nothing is scripted.
    default: MockResponse,
    /// Provider info to return.
    info: ProviderInfo,
    /// Simulated latency per request.
    delay: Duration,
    /// Simulated latency between streamed chunks.
    chunk_delay: Duration,
    /// Call history for verification.
    calls: Arc<Mutex<Vec<CompletionRequest>>>,
}

/// A configured mock response.
#[derive(Debug, Clone)]
pub enum MockResponse {
    /// Return a successful completion.
    Success {
        content: String,
        usage: TokenUsage,
        finish_reason: FinishReason,
    },
    /// Return an error.
    Error(MockError),
}

impl MockResponse {
    fn text(content: impl Into<String>) -> Self {
        MockResponse::Success {
            content: content.into(),
            usage: TokenUsage::new(10, 20),
            finish_reason: FinishReason::Stop,
        }
    }
}

/// Mock error types for testing error handling.
#[derive(Debug, Clone)]
pub enum MockError {
    /// Simulate rate limiting.
    RateLimited { retry_after_secs: u32 },
    /// Simulate provider unavailable.
    Unavailable { message: String },
    /// Simulate authentication failure.
    AuthenticationFailed,
    /// Simulate network error.
    Network { message: String },
    /// Simulate timeout.
    Timeout { timeout_secs: u32 },
}

impl From<MockError> for AIError {
    fn from(err: MockError) -> Self {
        match err {
            MockError::RateLimited { retry_after_secs } => AIError::rate_limited(retry_after_secs),
            MockError::Unavailable { message } => AIError::unavailable(message),
            MockError::AuthenticationFailed => AIError::AuthenticationFailed,
            MockError::Network { message } => AIError::network(message),
            MockError::Timeout { timeout_secs } => AIError::Timeout { timeout_secs },
        }
    }
}

impl Default for MockAIProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockAIProvider {
    /// Creates a new mock provider with default settings.
    pub fn new() -> Self {
        Self {
            responses: Arc::new(Mutex::new(VecDeque::new())),
            by_purpose: Arc::new(Mutex::new(HashMap::new())),
            default: MockResponse::text("Mock response"),
            info: ProviderInfo::new("mock", "mock-model-1"),
            delay: Duration::ZERO,
            chunk_delay: Duration::ZERO,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A provider whose every call fails as unavailable.
    pub fn failing() -> Self {
        Self::new().with_default_error(MockError::Unavailable {
            message: "mock provider down".to_string(),
        })
    }

    /// Adds a successful response to the queue.
    pub fn with_response(self, content: impl Into<String>) -> Self {
        self.responses.lock().unwrap().push_back(MockResponse::text(content));
        self
    }

    /// Adds an error response to the queue.
    pub fn with_error(self, error: MockError) -> Self {
        self.responses.lock().unwrap().push_back(MockResponse::Error(error));
        self
    }

    /// Adds a successful response for requests with the given purpose.
    pub fn with_purpose_response(self, purpose: &'static str, content: impl Into<String>) -> Self {
        self.push_purpose(purpose, MockResponse::text(content));
        self
    }

    /// Adds an error for requests with the given purpose.
    pub fn with_purpose_error(self, purpose: &'static str, error: MockError) -> Self {
        self.push_purpose(purpose, MockResponse::Error(error));
        self
    }

    fn push_purpose(&self, purpose: &'static str, response: MockResponse) {
        self.by_purpose
            .lock()
            .unwrap()
            .entry(purpose)
            .or_default()
            .push_back(response);
    }

    /// Sets the response used when nothing is scripted.
    pub fn with_default_response(mut self, content: impl Into<String>) -> Self {
        self.default = MockResponse::text(content);
        self
    }

    /// Makes unscripted calls fail with `error`.
    pub fn with_default_error(mut self, error: MockError) -> Self {
        self.default = MockResponse::Error(error);
        self
    }

    /// Sets simulated latency per request.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Sets simulated latency between streamed chunks.
    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = delay;
        self
    }

    /// Returns the number of calls made to this provider.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Number of calls made with the given purpose.
    pub fn calls_for(&self, purpose: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.metadata.purpose == purpose)
            .count()
    }

    /// Returns all recorded calls.
    pub fn get_calls(&self) -> Vec<CompletionRequest> {
        self.calls.lock().unwrap().clone()
    }

    /// Clears the call history.
    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// Records the call and picks its response.
    async fn begin(&self, request: CompletionRequest) -> MockResponse {
        let purpose = request.metadata.purpose;
        self.calls.lock().unwrap().push(request);

        if !self.delay.is_zero() {
            sleep(self.delay).await;
        }

        let scripted = self
            .by_purpose
            .lock()
            .unwrap()
            .get_mut(purpose)
            .and_then(VecDeque::pop_front);
        scripted
            .or_else(|| self.responses.lock().unwrap().pop_front())
            .unwrap_or_else(|| self.default.clone())
    }
}

#[async_trait]
impl AIProvider for MockAIProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, AIError> {
        match self.begin(request).await {
            MockResponse::Success {
                content,
                usage,
                finish_reason,
            } => Ok(CompletionResponse {
                content,
                usage,
                model: self.info.model.clone(),
                finish_reason,
            }),
            MockResponse::Error(err) => Err(err.into()),
        }
    }

    async fn stream_complete(
        &self,
        request: CompletionRequest,
    ) -> Result<Pin<Box<dyn Stream<Item = Result<StreamChunk, AIError>> + Send>>, AIError> {
        let (content, usage, finish_reason) = match self.begin(request).await {
            MockResponse::Success {
                content,
                usage,
                finish_reason,
            } => (content, usage, finish_reason),
            MockResponse::Error(err) => return Err(err.into()),
        };

        // Word-sized pieces that concatenate back to the content.
        let pieces: Vec<String> = content.split_inclusive(' ').map(str::to_string).collect();
        let chunk_delay = self.chunk_delay;

        let chunks = stream::iter(pieces).then(move |piece| async move {
            if !chunk_delay.is_zero() {
                sleep(chunk_delay).await;
            }
            Ok::<_, AIError>(StreamChunk::content(piece))
        });
        let final_chunk = stream::once(async move { Ok::<_, AIError>(StreamChunk::final_chunk(finish_reason, usage)) });

        Ok(Box::pin(chunks.chain(final_chunk)))
    }

    fn provider_info(&self) -> ProviderInfo {
        self.info.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{Message, RequestMetadata};
    use futures::StreamExt;

    fn request(purpose: &'static str) -> CompletionRequest {
        CompletionRequest::new(RequestMetadata::new(purpose, "trace-123")).with_message(Message::user("Hallo"))
    }

    #[tokio::test]
    async fn returns_responses_in_order_then_default() {
        let provider = MockAIProvider::new().with_response("First").with_response("Second");

        assert_eq!(provider.complete(request("chat")).await.unwrap().content, "First");
        assert_eq!(provider.complete(request("chat")).await.unwrap().content, "Second");
        assert_eq!(provider.complete(request("chat")).await.unwrap().content, "Mock response");
    }

    #[tokio::test]
    async fn purpose_scripts_take_precedence() {
        let provider = MockAIProvider::new()
            .with_response("general")
            .with_purpose_response("classify", "{\"domain\":\"rwdr\"}");

        assert_eq!(provider.complete(request("classify")).await.unwrap().content, "{\"domain\":\"rwdr\"}");
        assert_eq!(provider.complete(request("classify")).await.unwrap().content, "general");
        assert_eq!(provider.calls_for("classify"), 2);
    }

    #[tokio::test]
    async fn returns_configured_error() {
        let provider = MockAIProvider::new().with_error(MockError::RateLimited { retry_after_secs: 30 });

        let err = provider.complete(request("chat")).await.unwrap_err();
        assert!(err.is_retryable());
        assert!(matches!(err, AIError::RateLimited { retry_after_secs: 30 }));
    }

    #[tokio::test]
    async fn failing_provider_fails_every_call() {
        let provider = MockAIProvider::failing();
        assert!(provider.complete(request("chat")).await.is_err());
        assert!(provider.stream_complete(request("recommend")).await.is_err());
        assert_eq!(provider.call_count(), 2);
    }

    #[tokio::test]
    async fn streaming_is_lossless_and_ends_with_final_chunk() {
        let provider = MockAIProvider::new().with_response("Hallo Welt\n aus dem  Stream");

        let mut stream = provider.stream_complete(request("recommend")).await.unwrap();
        let mut content = String::new();
        let mut finished = false;

        while let Some(result) = stream.next().await {
            let chunk = result.unwrap();
            if chunk.is_final() {
                finished = true;
            } else {
                content.push_str(&chunk.delta);
            }
        }

        assert_eq!(content, "Hallo Welt\n aus dem  Stream");
        assert!(finished);
    }

    #[tokio::test]
    async fn tracks_and_clears_calls() {
        let provider = MockAIProvider::new();
        provider.complete(request("chat")).await.unwrap();
        assert_eq!(provider.call_count(), 1);
        provider.clear_calls();
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn respects_delay() {
        let provider = MockAIProvider::new().with_delay(Duration::from_millis(50));

        let start = std::time::Instant::now();
        provider.complete(request("chat")).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn mock_error_converts_to_ai_error() {
        let err: AIError = MockError::AuthenticationFailed.into();
        assert!(matches!(err, AIError::AuthenticationFailed));

        let err: AIError = MockError::Timeout { timeout_secs: 30 }.into();
        assert!(matches!(err, AIError::Timeout { timeout_secs: 30 }));
    }
}
