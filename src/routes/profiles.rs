use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::models::{Profile, ProfileData, UserPublic};
use crate::state::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct ProfileRequest {
    #[validate(length(max = 2000))]
    pub bio: Option<String>,
    #[serde(default)]
    pub subjects: Vec<String>,
    #[validate(length(max = 500))]
    pub availability: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MentorSummary {
    pub user: UserPublic,
    pub profile: Option<Profile>,
}

/// PUT /profile. Wholesale replacement: omitted fields clear.
pub async fn update_my_profile(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<ProfileRequest>,
) -> AppResult<Json<Profile>> {
    payload.validate()?;
    let profile = state
        .store
        .upsert_profile(
            user.id,
            ProfileData {
                bio: payload.bio,
                subjects: payload.subjects,
                availability: payload.availability,
            },
        )
        .await?;
    Ok(Json(profile))
}

/// GET /profiles/{user_id}
pub async fn get_profile(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(user_id): Path<Uuid>,
) -> AppResult<Json<Profile>> {
    let profile = state
        .store
        .profile_by_user(user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("profile not found".into()))?;
    Ok(Json(profile))
}

/// GET /mentors
pub async fn list_mentors(
    State(state): State<AppState>,
    _user: AuthUser,
) -> AppResult<Json<Vec<MentorSummary>>> {
    let mentors = state.store.list_mentors().await?;
    Ok(Json(
        mentors
            .into_iter()
            .map(|record| MentorSummary {
                user: record.user.to_public(),
                profile: record.profile,
            })
            .collect(),
    ))
}
