//! API error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use mpost_imaging::UploadError;
use mpost_ledger::{LedgerError, VerificationError};
use mpost_models::{CreditShortfall, ModelError};
use mpost_queue::QueueError;

use crate::services::PaymentError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Insufficient credits: required {}, available {}", .0.required, .0.available)]
    InsufficientCredits(CreditShortfall),

    #[error("{0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Rate limited")]
    RateLimited,

    #[error("Upstream service failed: {0}")]
    Upstream(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn upstream(msg: impl Into<String>) -> Self {
        Self::Upstream(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::InsufficientCredits(_) => StatusCode::PAYMENT_REQUIRED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Unauthorized(_) => "unauthorized",
            ApiError::InsufficientCredits(_) => "insufficient_credits",
            ApiError::BadRequest(_) => "invalid_input",
            ApiError::NotFound(_) => "not_found",
            ApiError::RateLimited => "rate_limited",
            ApiError::Upstream(_) => "upstream_failure",
            ApiError::ServiceUnavailable(_) => "service_unavailable",
            ApiError::Internal(_) => "internal",
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    detail: String,
    code: &'static str,
    #[serde(flatten)]
    shortfall: Option<CreditShortfall>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Don't expose internal error details in production
        let detail = match &self {
            ApiError::Internal(_) | ApiError::Upstream(_) => {
                if std::env::var("ENVIRONMENT").unwrap_or_default() == "production" {
                    "An internal error occurred".to_string()
                } else {
                    self.to_string()
                }
            }
            _ => self.to_string(),
        };

        let shortfall = match &self {
            ApiError::InsufficientCredits(s) => Some(*s),
            _ => None,
        };

        let body = ErrorResponse {
            detail,
            code: self.code(),
            shortfall,
        };

        (status, Json(body)).into_response()
    }
}

// =============================================================================
// Conversions
// =============================================================================

impl From<VerificationError> for ApiError {
    fn from(e: VerificationError) -> Self {
        match e {
            VerificationError::Insufficient(shortfall) => ApiError::InsufficientCredits(shortfall),
            VerificationError::NoImages => ApiError::bad_request("Job has no images to process"),
            VerificationError::Ledger(e) => e.into(),
        }
    }
}

impl From<LedgerError> for ApiError {
    fn from(e: LedgerError) -> Self {
        ApiError::upstream(format!("Credit ledger: {}", e))
    }
}

impl From<QueueError> for ApiError {
    fn from(e: QueueError) -> Self {
        match e {
            QueueError::JobNotFound(_) => ApiError::not_found("Job not found"),
            QueueError::InvalidTransition { status, .. } => {
                ApiError::bad_request(format!("Job is {}", status))
            }
            QueueError::InvalidUpdate(e) => ApiError::internal(e.to_string()),
            QueueError::QueueFull(_) | QueueError::Closed => {
                ApiError::ServiceUnavailable(e.to_string())
            }
        }
    }
}

impl From<UploadError> for ApiError {
    fn from(e: UploadError) -> Self {
        if e.is_client_error() {
            ApiError::bad_request(e.to_string())
        } else {
            ApiError::internal(e.to_string())
        }
    }
}

impl From<ModelError> for ApiError {
    fn from(e: ModelError) -> Self {
        ApiError::bad_request(e.to_string())
    }
}

impl From<PaymentError> for ApiError {
    fn from(e: PaymentError) -> Self {
        match e {
            PaymentError::NotConfigured | PaymentError::NoPrice(_) => {
                ApiError::ServiceUnavailable(e.to_string())
            }
            PaymentError::Processor(_) | PaymentError::Network(_) => {
                ApiError::upstream(format!("Payment processor: {}", e))
            }
            PaymentError::InvalidPayload(_) => ApiError::bad_request(e.to_string()),
            _ if e.is_signature_error() => ApiError::bad_request(format!("Invalid signature: {}", e)),
            _ => ApiError::bad_request(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(err: ApiError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_insufficient_credits_body() {
        let shortfall = CreditShortfall {
            required: 5,
            available: 3,
            shortfall: 2,
        };
        let (status, body) = body_json(ApiError::InsufficientCredits(shortfall)).await;
        assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
        assert_eq!(body["code"], "insufficient_credits");
        assert_eq!(body["required"], 5);
        assert_eq!(body["available"], 3);
        assert_eq!(body["shortfall"], 2);
    }

    #[tokio::test]
    async fn test_not_found_body() {
        let (status, body) = body_json(QueueError::not_found("abc").into()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["detail"], "Not found: Job not found");
        assert!(body.get("shortfall").is_none());
    }

    #[test]
    fn test_upload_error_mapping() {
        let err: ApiError = UploadError::UnsupportedType("a.gif".into()).into();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        let err: ApiError = UploadError::Io(std::io::Error::other("disk")).into();
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_payment_error_mapping() {
        let err: ApiError = PaymentError::SignatureMismatch.into();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);

        let err: ApiError = PaymentError::Processor("card declined".into()).into();
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);

        let err: ApiError = PaymentError::NotConfigured.into();
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
