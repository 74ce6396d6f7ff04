//! API error handling
//!
//! Errors outside the authorization interceptor render as an `ApiError`
//! body. Interceptor rejections use their own fixed bodies (see
//! `auth::middleware::AuthError`).

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use milkman_core::MilkmanError;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// API error response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// Error code
    pub code: String,
    /// Human-readable message
    pub message: String,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn not_found(resource: &str) -> Self {
        Self::new("NOT_FOUND", format!("{resource} not found"))
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new("BAD_REQUEST", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new("CONFLICT", message)
    }

    pub fn internal_error() -> Self {
        Self::new("INTERNAL_ERROR", "Internal server error")
    }
}

/// Application error type
#[derive(Debug)]
pub enum AppError {
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    Forbidden(String),
    Internal(String),
    Database(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Internal detail is logged, never returned
        let (status, error) = match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, ApiError::not_found(&msg)),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, ApiError::bad_request(msg)),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, ApiError::conflict(msg)),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, ApiError::new("FORBIDDEN", msg)),
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, ApiError::internal_error())
            }
            AppError::Database(msg) => {
                tracing::error!(error = %msg, "Database error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ApiError::new("DATABASE_ERROR", "Database operation failed"),
                )
            }
        };

        (status, Json(error)).into_response()
    }
}

impl From<MilkmanError> for AppError {
    fn from(err: MilkmanError) -> Self {
        match err {
            MilkmanError::NotFound(msg) => AppError::NotFound(msg),
            MilkmanError::Conflict(msg) => AppError::Conflict(msg),
            MilkmanError::ValidationError(msg) => AppError::BadRequest(msg),
            MilkmanError::DatabaseError(msg) => AppError::Database(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_error_mapping() {
        assert!(matches!(
            AppError::from(MilkmanError::NotFound("Customer".into())),
            AppError::NotFound(_)
        ));
        assert!(matches!(
            AppError::from(MilkmanError::Conflict("dup".into())),
            AppError::Conflict(_)
        ));
        assert!(matches!(
            AppError::from(MilkmanError::DatabaseError("down".into())),
            AppError::Database(_)
        ));
    }

    #[test]
    fn test_status_codes() {
        let cases = vec![
            (AppError::NotFound("Customer".into()), StatusCode::NOT_FOUND),
            (AppError::BadRequest("bad".into()), StatusCode::BAD_REQUEST),
            (AppError::Conflict("dup".into()), StatusCode::CONFLICT),
            (AppError::Forbidden("no".into()), StatusCode::FORBIDDEN),
            (
                AppError::Database("connection refused".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(error.into_response().status(), expected);
        }
    }

    #[test]
    fn test_api_error_body() {
        let json = serde_json::to_string(&ApiError::not_found("Customer")).unwrap();
        assert_eq!(json, r#"{"code":"NOT_FOUND","message":"Customer not found"}"#);
    }
}
