use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{NewSession, Role, Session, SessionStatus};
use crate::store::Store;

pub struct BookingService;

impl BookingService {
    /// True when the proposed time lands strictly inside the conflict window
    /// of any of the mentor's active sessions. Landing exactly on the window
    /// boundary is allowed, and the comparison is to the second: 29m59s away
    /// conflicts, 30m00s does not.
    pub async fn has_conflict(
        store: &dyn Store,
        mentor_id: Uuid,
        proposed: DateTime<Utc>,
        window_minutes: i64,
    ) -> AppResult<bool> {
        let window_seconds = window_minutes * 60;
        let active = store.active_sessions_for_mentor(mentor_id).await?;
        Ok(active
            .iter()
            .any(|s| (s.scheduled_at - proposed).num_seconds().abs() < window_seconds))
    }

    pub async fn book(
        store: &dyn Store,
        student_id: Uuid,
        mentor_id: Uuid,
        subject: String,
        scheduled_at: DateTime<Utc>,
        window_minutes: i64,
    ) -> AppResult<Session> {
        let mentor = store
            .user_by_id(mentor_id)
            .await?
            .ok_or_else(|| AppError::NotFound("mentor not found".into()))?;
        if mentor.role != Role::Mentor {
            return Err(AppError::Validation(
                "mentorId must reference a mentor account".into(),
            ));
        }

        // The store repeats the window check atomically with the insert, so a
        // racing booking cannot slip in between check and write.
        store
            .insert_session_if_free(
                NewSession {
                    student_id,
                    mentor_id,
                    subject,
                    scheduled_at,
                },
                window_minutes,
            )
            .await
    }

    pub async fn confirm(store: &dyn Store, session: &Session) -> AppResult<Session> {
        if session.status != SessionStatus::Pending {
            return Err(AppError::Conflict(format!(
                "cannot confirm a {} session",
                session.status
            )));
        }
        store
            .transition_session(session.id, &[SessionStatus::Pending], SessionStatus::Confirmed)
            .await
    }

    pub async fn cancel(store: &dyn Store, session: &Session) -> AppResult<Session> {
        if session.status.is_terminal() {
            return Err(AppError::Conflict(format!(
                "cannot cancel a {} session",
                session.status
            )));
        }
        store
            .transition_session(
                session.id,
                &[SessionStatus::Pending, SessionStatus::Confirmed],
                SessionStatus::Cancelled,
            )
            .await
    }

    /// Mark a confirmed session as held. Refused until its scheduled time has
    /// passed.
    pub async fn complete(
        store: &dyn Store,
        session: &Session,
        now: DateTime<Utc>,
    ) -> AppResult<Session> {
        if session.status != SessionStatus::Confirmed {
            return Err(AppError::Conflict(format!(
                "cannot complete a {} session",
                session.status
            )));
        }
        if session.scheduled_at > now {
            return Err(AppError::Conflict(
                "cannot complete a session before it takes place".into(),
            ));
        }
        store
            .transition_session(
                session.id,
                &[SessionStatus::Confirmed],
                SessionStatus::Completed,
            )
            .await
    }
}
