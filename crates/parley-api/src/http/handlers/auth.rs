//! Account HTTP handlers.
//!
//! Endpoints:
//! - POST /api/v1/auth/register - Create an account
//! - POST /api/v1/auth/login    - Exchange credentials for a session token
//! - POST /api/v1/auth/logout   - Revoke the presented token

use std::time::Instant;

use axum::Json;
use axum::extract::State;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::http::error::AppError;
use crate::http::extractors::auth::AuthenticatedUser;
use crate::http::response::ApiResponse;
use crate::state::AppState;

/// Credentials posted to register and login.
#[derive(Deserialize)]
pub struct CredentialsRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

impl CredentialsRequest {
    fn into_parts(self) -> (String, SecretString) {
        (self.username, SecretString::from(self.password))
    }
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user_id: String,
    pub created_at: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user_id: String,
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct LogoutResponse {
    pub revoked: bool,
}

/// POST /api/v1/auth/register
pub async fn register(
    State(state): State<AppState>,
    Json(body): Json<CredentialsRequest>,
) -> Result<Json<ApiResponse<RegisterResponse>>, AppError> {
    let start = Instant::now();
    let request_id = Uuid::now_v7().to_string();

    let (username, password) = body.into_parts();
    let account = state.account_service.register(&username, &password).await?;

    let elapsed = start.elapsed().as_millis() as u64;
    Ok(Json(
        ApiResponse::success(
            RegisterResponse {
                user_id: account.user_id.to_string(),
                created_at: account.created_at.to_rfc3339(),
            },
            request_id,
            elapsed,
        )
        .with_link("login", "/api/v1/auth/login"),
    ))
}

/// POST /api/v1/auth/login
///
/// The token in the response is shown once; only its hash is kept.
pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<CredentialsRequest>,
) -> Result<Json<ApiResponse<LoginResponse>>, AppError> {
    let start = Instant::now();
    let request_id = Uuid::now_v7().to_string();

    let (username, password) = body.into_parts();
    let grant = state.account_service.login(&username, &password).await?;

    let elapsed = start.elapsed().as_millis() as u64;
    Ok(Json(
        ApiResponse::success(
            LoginResponse {
                user_id: grant.user_id.to_string(),
                token: grant.token.expose_secret().to_string(),
            },
            request_id,
            elapsed,
        )
        .with_link("ws", "/ws")
        .with_link("logout", "/api/v1/auth/logout"),
    ))
}

/// POST /api/v1/auth/logout
pub async fn logout(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
) -> Result<Json<ApiResponse<LogoutResponse>>, AppError> {
    let start = Instant::now();
    let request_id = Uuid::now_v7().to_string();

    let revoked = state.account_service.logout(&auth.token).await?;
    tracing::debug!(user_id = %auth.user_id, "logged out");

    let elapsed = start.elapsed().as_millis() as u64;
    Ok(Json(ApiResponse::success(
        LogoutResponse { revoked },
        request_id,
        elapsed,
    )))
}
