//! Error types for the HETS server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Rejection codes surfaced to callers alongside the error kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, utoipa::ToSchema)]
pub enum ErrorCode {
    Failure,
    DbFailure,
    BadValue,
    NotFound,
    // Conflicts: caller re-fetches and decides whether to retry
    DuplicateActiveRequest,
    VersionConflict,
    RolloverActive,
    FiscalYearCurrent,
    // Invariant violations: rejected, never coerced
    CountBelowHired,
    AgreementsExist,
    RequestComplete,
    RequestNotInProgress,
    EntryAlreadyAnswered,
    MissingScoringRule,
}

/// Main application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict ({code:?}): {message}")]
    Conflict { code: ErrorCode, message: String },

    #[error("Invariant violation ({code:?}): {message}")]
    InvariantViolation { code: ErrorCode, message: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn conflict(code: ErrorCode, message: impl Into<String>) -> Self {
        AppError::Conflict {
            code,
            message: message.into(),
        }
    }

    pub fn invariant(code: ErrorCode, message: impl Into<String>) -> Self {
        AppError::InvariantViolation {
            code,
            message: message.into(),
        }
    }

    pub fn version_conflict(entity: &str, id: i32) -> Self {
        AppError::conflict(
            ErrorCode::VersionConflict,
            format!("{} {} was modified by another user, re-fetch and retry", entity, id),
        )
    }

    /// Reason code carried by this error
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::NotFound(_) => ErrorCode::NotFound,
            AppError::Conflict { code, .. } => *code,
            AppError::InvariantViolation { code, .. } => *code,
            AppError::Configuration(_) => ErrorCode::MissingScoringRule,
            AppError::Validation(_) => ErrorCode::BadValue,
            AppError::Database(_) => ErrorCode::DbFailure,
            AppError::Internal(_) => ErrorCode::Failure,
        }
    }

    /// Whether a rollover batch save may be retried after this error
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::Database(_)
                | AppError::Conflict {
                    code: ErrorCode::VersionConflict,
                    ..
                }
        )
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::Validation(errors.to_string())
    }
}

/// Error response body
#[derive(Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    pub code: ErrorCode,
    pub error: String,
    pub message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let code = self.code();
        let (status, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Conflict { message, .. } => (StatusCode::CONFLICT, message.clone()),
            AppError::InvariantViolation { message, .. } => {
                (StatusCode::UNPROCESSABLE_ENTITY, message.clone())
            }
            AppError::Configuration(msg) => {
                tracing::error!("Configuration error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg.clone())
            }
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Database error".to_string(),
                )
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        let body = Json(ErrorResponse {
            code,
            error: format!("{:?}", code),
            message,
        });

        (status, body).into_response()
    }
}

/// Result type alias for application operations
pub type AppResult<T> = Result<T, AppError>;
