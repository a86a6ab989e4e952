use std::time::Duration;

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header::RETRY_AFTER},
    response::IntoResponse,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;
use validator::ValidationErrors;

use crate::{dao::storage::StorageError, dto::canvas::TooManyRequestsBody};

/// Errors that can occur in service layer operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The store answered with an error other than "key absent".
    #[error("storage unavailable")]
    Unavailable(#[source] StorageError),
    /// Application is running in degraded mode without a reachable store.
    #[error("storage unavailable (degraded mode)")]
    Degraded,
    /// Invalid input provided by the client.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Request asks for more than the configured limits allow.
    #[error("too large: {0}")]
    TooLarge(String),
    /// The identity is still inside its cooldown window.
    #[error("rate limited for another {retry_after:?}")]
    RateLimited { retry_after: Duration },
}

impl ServiceError {
    /// Message safe to hand to a WebSocket client.
    pub fn client_message(&self) -> &'static str {
        match self {
            ServiceError::Degraded => "storage unavailable",
            ServiceError::InvalidInput(_) | ServiceError::TooLarge(_) => "invalid request",
            ServiceError::RateLimited { .. } => "rate limited",
            ServiceError::Unavailable(_) => "internal server error",
        }
    }
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        ServiceError::Unavailable(err)
    }
}

impl From<ValidationErrors> for ServiceError {
    fn from(err: ValidationErrors) -> Self {
        ServiceError::InvalidInput(format!("validation failed: {}", err))
    }
}

/// Application-level errors that are converted to HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    /// Bad request with invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),
    /// Requested entity exceeds configured limits.
    #[error("request entity too large: {0}")]
    PayloadTooLarge(String),
    /// Caller must wait before retrying.
    #[error("too many requests")]
    TooManyRequests { retry_after: Duration },
    /// Service unavailable or degraded.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Unavailable(source) => AppError::Internal(source.to_string()),
            ServiceError::Degraded => AppError::ServiceUnavailable("degraded mode".into()),
            ServiceError::InvalidInput(message) => AppError::BadRequest(message),
            ServiceError::TooLarge(message) => AppError::PayloadTooLarge(message),
            ServiceError::RateLimited { retry_after } => AppError::TooManyRequests { retry_after },
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::TooManyRequests { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        match self {
            AppError::TooManyRequests { retry_after } => {
                let body = Json(TooManyRequestsBody::new(retry_after));
                let mut response = (status, body).into_response();
                let seconds = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
                if let Ok(value) = HeaderValue::from_str(&seconds.to_string()) {
                    response.headers_mut().insert(RETRY_AFTER, value);
                }
                response
            }
            AppError::Internal(detail) => {
                // Details stay in the logs.
                error!(error = %detail, "request failed with internal error");
                let payload = Json(ErrorBody {
                    message: "internal server error".into(),
                });
                (status, payload).into_response()
            }
            other => {
                let payload = Json(ErrorBody {
                    message: other.to_string(),
                });
                (status, payload).into_response()
            }
        }
    }
}
