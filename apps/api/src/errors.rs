use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::chat::handoff::TransitionError;
use crate::email::EmailError;
use crate::llm_client::LlmError;
use crate::roi::verification::CodeError;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
/// Every error body has the shape `{"success": false, "code": ..., "message": ...}`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Captcha verification failed: {0}")]
    Captcha(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Second factor required")]
    TotpRequired,

    #[error("Forbidden")]
    Forbidden,

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Too many attempts")]
    TooManyAttempts,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Email error: {0}")]
    Email(#[from] EmailError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<TransitionError> for AppError {
    fn from(e: TransitionError) -> Self {
        AppError::Conflict(e.to_string())
    }
}

impl From<CodeError> for AppError {
    fn from(e: CodeError) -> Self {
        match e {
            CodeError::TooManyAttempts => AppError::TooManyAttempts,
            CodeError::Store(msg) => AppError::Internal(anyhow::anyhow!(msg)),
            other => AppError::Validation(other.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::Captcha(msg) => {
                tracing::warn!("Captcha rejected: {msg}");
                (
                    StatusCode::BAD_REQUEST,
                    "CAPTCHA_FAILED",
                    "Captcha verification failed. Please try again.".to_string(),
                )
            }
            AppError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED",
                "Authentication required".to_string(),
            ),
            AppError::TotpRequired => (
                StatusCode::UNAUTHORIZED,
                "TOTP_REQUIRED",
                "A valid authenticator code is required".to_string(),
            ),
            AppError::Forbidden => (
                StatusCode::FORBIDDEN,
                "FORBIDDEN",
                "Access denied".to_string(),
            ),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
            AppError::TooManyAttempts => (
                StatusCode::TOO_MANY_REQUESTS,
                "TOO_MANY_ATTEMPTS",
                "Too many incorrect attempts. Request a new code.".to_string(),
            ),
            AppError::Database(e) => {
                tracing::error!("Database error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "A database error occurred".to_string(),
                )
            }
            AppError::Email(e) => {
                tracing::error!("Email error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "EMAIL_ERROR",
                    "We could not send the email. Please try again later.".to_string(),
                )
            }
            AppError::Llm(e) => {
                tracing::error!("LLM error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "LLM_ERROR",
                    "An AI processing error occurred".to_string(),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                )
            }
        };

        let body = Json(json!({
            "success": false,
            "code": code,
            "message": message
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_maps_to_bad_request() {
        let response = AppError::Validation("email is required".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_totp_required_is_unauthorized() {
        let response = AppError::TotpRequired.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_code_errors_map_by_kind() {
        assert!(matches!(
            AppError::from(CodeError::TooManyAttempts),
            AppError::TooManyAttempts
        ));
        assert!(matches!(
            AppError::from(CodeError::Expired),
            AppError::Validation(_)
        ));
    }

    #[test]
    fn test_handoff_transition_errors_are_conflicts() {
        let stale = AppError::from(TransitionError::Stale { expected: "none" }).into_response();
        assert_eq!(stale.status(), StatusCode::CONFLICT);

        let resolved = AppError::from(TransitionError::AlreadyResolved).into_response();
        assert_eq!(resolved.status(), StatusCode::CONFLICT);
    }
}
