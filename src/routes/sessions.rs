use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::error::AppResult;
use crate::middleware::auth::AuthUser;
use crate::middleware::guards::{require_role, SessionGuard};
use crate::models::{Role, Session};
use crate::services::booking_service::BookingService;
use crate::state::AppState;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct BookSessionRequest {
    pub mentor_id: Uuid,
    #[validate(length(min = 1, max = 200))]
    pub subject: String,
    #[serde(rename = "scheduledTime")]
    pub scheduled_at: DateTime<Utc>,
}

/// POST /sessions/book
pub async fn book_session(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<BookSessionRequest>,
) -> AppResult<(StatusCode, Json<Session>)> {
    payload.validate()?;
    require_role(&user, Role::Student)?;
    let session = BookingService::book(
        state.store.as_ref(),
        user.id,
        payload.mentor_id,
        payload.subject,
        payload.scheduled_at,
        state.config.conflict_window_minutes,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(session)))
}

/// PUT /sessions/{id}/confirm
pub async fn confirm_session(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Session>> {
    let guard = SessionGuard::load(state.store.as_ref(), id, &user).await?;
    guard.can_confirm()?;
    let session = BookingService::confirm(state.store.as_ref(), &guard.session).await?;
    Ok(Json(session))
}

/// PUT /sessions/{id}/cancel
pub async fn cancel_session(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Session>> {
    let guard = SessionGuard::load(state.store.as_ref(), id, &user).await?;
    guard.can_cancel()?;
    let session = BookingService::cancel(state.store.as_ref(), &guard.session).await?;
    Ok(Json(session))
}

/// PUT /sessions/{id}/complete
pub async fn complete_session(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Session>> {
    let guard = SessionGuard::load(state.store.as_ref(), id, &user).await?;
    guard.can_complete()?;
    let session =
        BookingService::complete(state.store.as_ref(), &guard.session, Utc::now()).await?;
    Ok(Json(session))
}

/// GET /sessions, newest first, both sides of the table.
pub async fn list_sessions(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<Vec<Session>>> {
    let sessions = state.store.sessions_for_user(user.id).await?;
    Ok(Json(sessions))
}
