//! Bearer token authentication extractor.
//!
//! Extracts the session token from:
//! - `Authorization: Bearer <token>` header
//! - `?token=<token>` query parameter (browsers cannot set headers on a
//!   WebSocket upgrade)
//!
//! Tokens are resolved through the account service, which compares hashes
//! only.

use axum::extract::{FromRequestParts, Query};
use axum::http::request::Parts;
use parley_types::user::UserId;
use serde::Deserialize;

use crate::http::error::AppError;
use crate::state::AppState;

/// An authenticated caller. Extracting this validates the token.
pub struct AuthenticatedUser {
    pub user_id: UserId,
    /// The presented token, kept so `logout` can revoke it.
    pub token: String,
}

#[derive(Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_token(parts)?;
        let user_id = state.account_service.authenticate(&token).await?;
        Ok(AuthenticatedUser { user_id, token })
    }
}

/// Extract the token from the request headers or query string.
fn extract_token(parts: &Parts) -> Result<String, AppError> {
    if let Some(auth) = parts.headers.get("authorization") {
        let auth_str = auth.to_str().map_err(|_| {
            AppError::Unauthorized("Invalid Authorization header encoding".to_string())
        })?;
        if let Some(token) = auth_str.strip_prefix("Bearer ") {
            return Ok(token.trim().to_string());
        }
    }

    if let Ok(Query(TokenQuery { token: Some(token) })) =
        Query::<TokenQuery>::try_from_uri(&parts.uri)
    {
        if !token.trim().is_empty() {
            return Ok(token.trim().to_string());
        }
    }

    Err(AppError::Unauthorized(
        "Missing token. Provide via 'Authorization: Bearer <token>' header or '?token=' query parameter.".to_string(),
    ))
}
