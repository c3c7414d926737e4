//! Application error type mapping to HTTP status codes and envelope format.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use parley_types::error::{AccountError, SendError, StoreError};

use crate::http::response::ApiResponse;

/// Application-level error that maps to HTTP responses.
#[derive(Debug)]
pub enum AppError {
    /// Direct message send errors.
    Send(SendError),
    /// Account and token errors.
    Account(AccountError),
    /// Message store errors outside of a send.
    Store(StoreError),
    /// Authentication failure.
    Unauthorized(String),
    /// Validation error.
    Validation(String),
    /// Generic internal error.
    Internal(String),
}

impl From<SendError> for AppError {
    fn from(e: SendError) -> Self {
        AppError::Send(e)
    }
}

impl From<AccountError> for AppError {
    fn from(e: AccountError) -> Self {
        AppError::Account(e)
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        AppError::Store(e)
    }
}

impl AppError {
    /// Status code, machine-readable code and message for this error.
    pub fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            AppError::Send(e) if e.is_client_error() => {
                (StatusCode::BAD_REQUEST, e.code(), e.to_string())
            }
            AppError::Send(e) => (StatusCode::SERVICE_UNAVAILABLE, e.code(), e.to_string()),
            AppError::Account(AccountError::MissingField) => (
                StatusCode::BAD_REQUEST,
                "MISSING_FIELD",
                "Please fill all fields.".to_string(),
            ),
            AppError::Account(AccountError::InvalidUserId(e)) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", e.to_string())
            }
            AppError::Account(AccountError::AlreadyExists(_)) => (
                StatusCode::CONFLICT,
                "USER_EXISTS",
                "User already exists!".to_string(),
            ),
            AppError::Account(AccountError::InvalidCredentials) => (
                StatusCode::UNAUTHORIZED,
                "INVALID_CREDENTIALS",
                "Wrong username or password.".to_string(),
            ),
            AppError::Account(AccountError::InvalidToken) => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED",
                "Invalid or revoked token.".to_string(),
            ),
            AppError::Account(e) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "ACCOUNT_ERROR", e.to_string())
            }
            AppError::Store(e @ StoreError::StorageUnavailable(_)) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "STORAGE_UNAVAILABLE",
                e.to_string(),
            ),
            AppError::Store(e) => (StatusCode::INTERNAL_SERVER_ERROR, "STORE_ERROR", e.to_string()),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg.clone()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::Internal(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg.clone())
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.parts();
        if status.is_server_error() {
            tracing::warn!(%status, code, "request failed: {message}");
        }

        let retryable = status == StatusCode::SERVICE_UNAVAILABLE;
        let body = ApiResponse::error(code, &message, retryable, uuid::Uuid::now_v7().to_string());
        let body = serde_json::to_string(&body).unwrap_or_else(|_| {
            r#"{"errors":[{"code":"SERIALIZATION_ERROR","message":"Failed to serialize response"}]}"#.to_string()
        });

        (
            status,
            [(axum::http::header::CONTENT_TYPE, "application/json")],
            body,
        )
            .into_response()
    }
}
