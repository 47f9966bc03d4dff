//! Error taxonomy.
//!
//! One enum carries every failure the system distinguishes. The HTTP edge
//! maps variants to status codes; the worker edge maps them to
//! permanent/recoverable classes that drive queue retries and the DLQ
//! `is_retryable` flag.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use uuid::Uuid;

/// How the queue should treat a failed job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Never retried; DLQ'd with `is_retryable = false`.
    Permanent,
    /// Retried up to `max_tries`, then DLQ'd with `is_retryable = true`.
    Recoverable,
    /// Retried like recoverable, but DLQ'd with `is_retryable = false`.
    Unknown,
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    DuplicateDocument(String),

    #[error("duplicate idempotency key: {0}")]
    DuplicateIdempotencyKey(String),

    #[error("application {0} not found")]
    ApplicationNotFound(Uuid),

    #[error("{0}")]
    NotFound(String),

    #[error("invalid application id: {0}")]
    InvalidApplicationId(String),

    #[error("{0}")]
    StateTransition(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("payload exceeds maximum size of {limit_mb}MB")]
    PayloadTooLarge { limit_mb: usize },

    #[error("external service error: {0}")]
    ExternalService(String),

    #[error("network timeout: {0}")]
    NetworkTimeout(String),

    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("{0}")]
    Recoverable(String),

    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Worker-side classification per the retry table.
    pub fn class(&self) -> ErrorClass {
        match self {
            AppError::Validation(_)
            | AppError::DuplicateDocument(_)
            | AppError::DuplicateIdempotencyKey(_)
            | AppError::ApplicationNotFound(_)
            | AppError::NotFound(_)
            | AppError::InvalidApplicationId(_)
            | AppError::StateTransition(_)
            | AppError::Unauthorized(_)
            | AppError::PayloadTooLarge { .. } => ErrorClass::Permanent,
            AppError::ExternalService(_)
            | AppError::NetworkTimeout(_)
            | AppError::ProviderUnavailable(_)
            | AppError::Recoverable(_)
            | AppError::Database(_) => ErrorClass::Recoverable,
            AppError::Internal(_) => ErrorClass::Unknown,
        }
    }

    /// Stable type name stored in `failed_jobs.error_type`. The retry
    /// scheduler matches on these strings.
    pub fn error_type(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "ValidationError",
            AppError::DuplicateDocument(_) => "DuplicateApplicationError",
            AppError::DuplicateIdempotencyKey(_) => "DuplicateIdempotencyKeyError",
            AppError::ApplicationNotFound(_) => "ApplicationNotFoundError",
            AppError::NotFound(_) => "NotFoundError",
            AppError::InvalidApplicationId(_) => "InvalidApplicationIdError",
            AppError::StateTransition(_) => "StateTransitionError",
            AppError::Unauthorized(_) => "UnauthorizedError",
            AppError::PayloadTooLarge { .. } => "PayloadTooLargeError",
            AppError::ExternalService(_) => "ExternalServiceError",
            AppError::NetworkTimeout(_) => "NetworkTimeoutError",
            AppError::ProviderUnavailable(_) => "ProviderUnavailableError",
            AppError::Recoverable(_) => "RecoverableError",
            AppError::Database(_) => "DatabaseError",
            AppError::Internal(_) => "InternalError",
        }
    }

    /// Whether the DLQ row should be flagged for the retry scheduler.
    pub fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::Recoverable
    }

    /// Whether the circuit breaker counts this failure. Programming errors
    /// pass through without advancing the circuit.
    pub fn counts_toward_circuit(&self) -> bool {
        matches!(
            self,
            AppError::ExternalService(_)
                | AppError::NetworkTimeout(_)
                | AppError::Recoverable(_)
        )
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_)
            | AppError::InvalidApplicationId(_)
            | AppError::StateTransition(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::ApplicationNotFound(_) | AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::DuplicateDocument(_) | AppError::DuplicateIdempotencyKey(_) => {
                StatusCode::CONFLICT
            }
            AppError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::ProviderUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::ExternalService(_)
            | AppError::NetworkTimeout(_)
            | AppError::Recoverable(_)
            | AppError::Database(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let request_id = crate::server::middleware::current_request_id();

        if status.is_server_error() {
            tracing::error!(error = %self, request_id = ?request_id, "request failed");
        }

        let body = json!({
            "error": self.error_type(),
            "detail": self.to_string(),
            "request_id": request_id,
        });

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permanent_errors_are_not_retryable() {
        let err = AppError::Validation("bad document".into());
        assert_eq!(err.class(), ErrorClass::Permanent);
        assert!(!err.is_retryable());
    }

    #[test]
    fn provider_unavailable_is_retryable() {
        let err = AppError::ProviderUnavailable("circuit open".into());
        assert_eq!(err.class(), ErrorClass::Recoverable);
        assert!(err.is_retryable());
        assert_eq!(err.error_type(), "ProviderUnavailableError");
    }

    #[test]
    fn circuit_counts_only_retryable_provider_classes() {
        assert!(AppError::NetworkTimeout("t".into()).counts_toward_circuit());
        assert!(AppError::ExternalService("e".into()).counts_toward_circuit());
        assert!(!AppError::Validation("v".into()).counts_toward_circuit());
        assert!(!AppError::Internal(anyhow::anyhow!("bug")).counts_toward_circuit());
    }

    #[test]
    fn unknown_errors_retry_but_are_not_scheduler_retryable() {
        let err = AppError::Internal(anyhow::anyhow!("boom"));
        assert_eq!(err.class(), ErrorClass::Unknown);
        assert!(!err.is_retryable());
    }

    #[test]
    fn http_status_mapping_follows_the_contract() {
        let cases = [
            (AppError::Validation("v".into()), StatusCode::BAD_REQUEST),
            (
                AppError::StateTransition("s".into()),
                StatusCode::BAD_REQUEST,
            ),
            (
                AppError::InvalidApplicationId("x".into()),
                StatusCode::BAD_REQUEST,
            ),
            (AppError::Unauthorized("u".into()), StatusCode::UNAUTHORIZED),
            (
                AppError::ApplicationNotFound(Uuid::nil()),
                StatusCode::NOT_FOUND,
            ),
            (AppError::DuplicateDocument("d".into()), StatusCode::CONFLICT),
            (
                AppError::DuplicateIdempotencyKey("k".into()),
                StatusCode::CONFLICT,
            ),
            (
                AppError::PayloadTooLarge { limit_mb: 2 },
                StatusCode::PAYLOAD_TOO_LARGE,
            ),
            (
                AppError::ProviderUnavailable("p".into()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                AppError::ExternalService("e".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(err.status_code(), expected, "{err}");
        }
    }

    #[test]
    fn error_body_carries_the_stable_shape() {
        let response = AppError::Validation("bad input".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
