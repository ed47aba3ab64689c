//! Authorization guards for session endpoints. Guards answer "may this
//! caller act on this session"; whether the transition itself is legal is
//! the booking service's business.

use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::models::{Role, Session};
use crate::store::Store;

/// Require a specific account role.
pub fn require_role(user: &AuthUser, role: Role) -> AppResult<()> {
    if user.role == role {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!("requires the {role} role")))
    }
}

/// A session loaded together with the caller's identity, so every predicate
/// works on the same snapshot.
pub struct SessionGuard {
    caller_id: Uuid,
    caller_role: Role,
    pub session: Session,
}

impl SessionGuard {
    pub async fn load(store: &dyn Store, session_id: Uuid, caller: &AuthUser) -> AppResult<Self> {
        let session = store
            .session_by_id(session_id)
            .await?
            .ok_or_else(|| AppError::NotFound("session not found".into()))?;
        Ok(SessionGuard {
            caller_id: caller.id,
            caller_role: caller.role,
            session,
        })
    }

    fn is_participant(&self) -> bool {
        self.caller_id == self.session.student_id || self.caller_id == self.session.mentor_id
    }

    fn is_session_mentor(&self) -> bool {
        self.caller_role == Role::Mentor && self.caller_id == self.session.mentor_id
    }

    /// Only the mentor the session was booked with may confirm it.
    pub fn can_confirm(&self) -> AppResult<()> {
        if self.is_session_mentor() {
            Ok(())
        } else {
            Err(AppError::Forbidden(
                "only the session's mentor may confirm it".into(),
            ))
        }
    }

    /// Either participant may cancel.
    pub fn can_cancel(&self) -> AppResult<()> {
        if self.is_participant() {
            Ok(())
        } else {
            Err(AppError::Forbidden(
                "only a participant may cancel this session".into(),
            ))
        }
    }

    /// Completion is the mentor's call, same as confirmation.
    pub fn can_complete(&self) -> AppResult<()> {
        if self.is_session_mentor() {
            Ok(())
        } else {
            Err(AppError::Forbidden(
                "only the session's mentor may complete it".into(),
            ))
        }
    }
}
