//! Conversation history HTTP handler.
//!
//! Endpoints:
//! - GET /api/v1/conversations/{peer}/messages?since=&limit= - Messages of
//!   the caller's conversation with `peer`, ascending by id

use std::time::Instant;

use axum::Json;
use axum::extract::{Path, Query, State};
use parley_types::event::{DEFAULT_HISTORY_LIMIT, NewMessage};
use parley_types::message::ConversationId;
use parley_types::user::UserId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::http::error::AppError;
use crate::http::extractors::auth::AuthenticatedUser;
use crate::http::response::ApiResponse;
use crate::state::AppState;

/// Query parameters for history replay.
#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    #[serde(default)]
    pub since: u64,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_limit() -> u32 {
    DEFAULT_HISTORY_LIMIT
}

#[derive(Debug, Serialize)]
pub struct HistoryPage {
    pub conversation_id: ConversationId,
    pub messages: Vec<NewMessage>,
    /// Pass as `since` to continue; `None` when the page was not full.
    pub next_since: Option<u64>,
}

/// GET /api/v1/conversations/{peer}/messages
pub async fn get_messages(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Path(peer): Path<String>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<ApiResponse<HistoryPage>>, AppError> {
    let start = Instant::now();
    let request_id = Uuid::now_v7().to_string();

    let peer = UserId::parse(&peer)
        .map_err(|e| AppError::Validation(format!("Invalid peer '{peer}': {e}")))?;

    let query = state
        .router
        .history_query(&auth.user_id, &peer, params.since, params.limit);
    let messages = query.collect(state.router.store().clone()).await?;

    let next_since = (messages.len() as u32 == query.limit)
        .then(|| messages.last().map(|m| m.message_id))
        .flatten();
    let page = HistoryPage {
        conversation_id: query.conversation_id.clone(),
        messages: messages.iter().map(NewMessage::from).collect(),
        next_since,
    };

    let elapsed = start.elapsed().as_millis() as u64;
    let self_link = format!(
        "/api/v1/conversations/{peer}/messages?since={}&limit={}",
        params.since, query.limit
    );
    let mut response = ApiResponse::success(page, request_id, elapsed).with_link("self", &self_link);
    if let Some(next) = next_since {
        let next_link = format!(
            "/api/v1/conversations/{peer}/messages?since={next}&limit={}",
            query.limit
        );
        response = response.with_link("next", &next_link);
    }
    Ok(Json(response))
}
