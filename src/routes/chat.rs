use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::auth::AuthUser;
use crate::models::Message;
use crate::services::message_service::MessageService;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    pub limit: Option<i64>,
    /// Exclusive upper bound on message timestamps; RFC 3339.
    pub before: Option<DateTime<Utc>>,
}

/// GET /chat/{other_user_id}
pub async fn chat_history(
    State(state): State<AppState>,
    user: AuthUser,
    Path(other_user_id): Path<Uuid>,
    Query(params): Query<HistoryParams>,
) -> AppResult<Json<Vec<Message>>> {
    let page = MessageService::history(
        state.store.as_ref(),
        user.id,
        other_user_id,
        params.limit,
        params.before,
    )
    .await?;
    Ok(Json(page))
}
