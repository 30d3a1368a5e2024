//! JSON error responses for the HTTP surface.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::application::TurnError;
use crate::domain::streaming::ErrorCode;
use crate::ports::AuthError;

/// Body of every error response: `{code, message}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: ErrorCode,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Errors returned by HTTP handlers.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Unauthorized(String),

    #[error("authentication service unavailable")]
    AuthUnavailable,

    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    #[error("input is empty")]
    MissingInput,

    #[error("input exceeds {0} characters")]
    InputTooLong(usize),

    #[error("{message}")]
    RateLimited { message: String, retry_after_secs: u32 },

    #[error("the consultation could not be completed")]
    GraphFailed,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::AuthUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::InvalidJson(_) | ApiError::MissingInput | ApiError::InputTooLong(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::GraphFailed => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            ApiError::Unauthorized(_) => ErrorCode::Unauthorized,
            ApiError::AuthUnavailable => ErrorCode::InternalError,
            ApiError::InvalidJson(_) => ErrorCode::InvalidJson,
            ApiError::MissingInput => ErrorCode::MissingInput,
            ApiError::InputTooLong(_) => ErrorCode::InputTooLong,
            ApiError::RateLimited { .. } => ErrorCode::RateLimited,
            ApiError::GraphFailed => ErrorCode::GraphFailed,
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::ServiceUnavailable(msg) => {
                tracing::error!(error = %msg, "auth service unavailable");
                ApiError::AuthUnavailable
            }
            other => ApiError::Unauthorized(other.to_string()),
        }
    }
}

impl From<TurnError> for ApiError {
    fn from(err: TurnError) -> Self {
        match err {
            TurnError::RateLimited(denied) => ApiError::RateLimited {
                message: denied.message,
                retry_after_secs: denied.retry_after_secs,
            },
            TurnError::Graph(err) => {
                tracing::error!(error = %err, "synchronous turn failed");
                ApiError::GraphFailed
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let retry_after = match &self {
            ApiError::RateLimited { retry_after_secs, .. } => Some(*retry_after_secs),
            _ => None,
        };
        let body = ErrorResponse::new(self.code(), self.to_string());
        let mut response = (self.status(), Json(body)).into_response();
        if let Some(secs) = retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::RateLimitDenied;

    #[test]
    fn rate_limit_maps_to_429_with_retry_after() {
        let err = ApiError::from(TurnError::RateLimited(RateLimitDenied::new(30, 12)));
        let response = err.into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "12");
    }

    #[test]
    fn auth_outage_is_not_reported_as_unauthorized() {
        let err = ApiError::from(AuthError::ServiceUnavailable("jwks down".into()));
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);

        let err = ApiError::from(AuthError::TokenExpired);
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(err.code(), ErrorCode::Unauthorized);
    }

    #[test]
    fn error_body_uses_wire_codes() {
        let body = serde_json::to_value(ErrorResponse::new(ErrorCode::InvalidJson, "bad")).unwrap();
        assert_eq!(body, serde_json::json!({"code": "invalid_json", "message": "bad"}));
    }
}
