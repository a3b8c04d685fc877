use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::{models::WithdrawalViolation, store::StoreError};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid withdrawal request: {0}")]
    InvalidRequest(#[from] WithdrawalViolation),

    #[error("Daily ad limit of {limit} reached")]
    QuotaExceeded { limit: u32 },

    #[error("Please wait {retry_after_secs}s before claiming another ad")]
    AdCooldown { retry_after_secs: u64 },

    #[error("Withdrawal request {0} has already been resolved")]
    AlreadyResolved(Uuid),

    #[error("Not found")]
    NotFound,

    #[error("Forbidden")]
    Forbidden,

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Stable machine-readable kind, sent alongside the human message.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Store(_) => "store_error",
            AppError::StoreUnavailable(_) => "store_unavailable",
            AppError::Auth(_) => "unauthorized",
            AppError::Validation(_) => "validation_error",
            AppError::InvalidRequest(_) => "invalid_request",
            AppError::QuotaExceeded { .. } => "quota_exceeded",
            AppError::AdCooldown { .. } => "ad_cooldown",
            AppError::AlreadyResolved(_) => "already_resolved",
            AppError::NotFound => "not_found",
            AppError::Forbidden => "forbidden",
            AppError::Internal(_) => "internal_error",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::StoreUnavailable(_))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::Store(ref e) => {
                tracing::error!("Store error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Store error".to_string())
            }
            AppError::StoreUnavailable(ref msg) => {
                tracing::error!("Store unavailable: {}", msg);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Service temporarily unavailable, please try again".to_string(),
                )
            }
            AppError::Auth(ref msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            AppError::Validation(ref msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::InvalidRequest(ref violation) => {
                (StatusCode::BAD_REQUEST, violation.to_string())
            }
            AppError::QuotaExceeded { .. } | AppError::AdCooldown { .. } => {
                (StatusCode::TOO_MANY_REQUESTS, self.to_string())
            }
            AppError::AlreadyResolved(_) => (StatusCode::CONFLICT, self.to_string()),
            AppError::NotFound => (StatusCode::NOT_FOUND, "Resource not found".to_string()),
            AppError::Forbidden => (StatusCode::FORBIDDEN, "Access forbidden".to_string()),
            AppError::Internal(ref e) => {
                tracing::error!("Internal error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        let mut body = json!({
            "error": error_message,
            "code": self.code(),
            "status": status.as_u16()
        });
        if self.is_retryable() {
            body["retryable"] = json!(true);
        }
        if let AppError::AdCooldown { retry_after_secs } = &self {
            body["retryAfterSecs"] = json!(retry_after_secs);
        }

        (status, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
