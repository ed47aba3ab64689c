pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{
    Message, NewSession, NewUser, Profile, ProfileData, Session, SessionStatus, User,
};

/// A mentor together with their profile, if they have written one.
#[derive(Debug, Clone)]
pub struct MentorRecord {
    pub user: User,
    pub profile: Option<Profile>,
}

/// Persistence seam. Production runs on [`PgStore`]; the test suite runs the
/// whole stack against [`MemoryStore`].
#[async_trait]
pub trait Store: Send + Sync {
    async fn insert_user(&self, user: NewUser) -> AppResult<User>;
    async fn user_by_id(&self, id: Uuid) -> AppResult<Option<User>>;
    async fn user_by_email(&self, email: &str) -> AppResult<Option<User>>;

    async fn upsert_profile(&self, user_id: Uuid, data: ProfileData) -> AppResult<Profile>;
    async fn profile_by_user(&self, user_id: Uuid) -> AppResult<Option<Profile>>;
    async fn list_mentors(&self) -> AppResult<Vec<MentorRecord>>;

    /// Insert a pending session unless one of the mentor's active sessions
    /// lies strictly inside the conflict window. Check and insert are a
    /// single atomic step, so two racing bookings cannot both land.
    async fn insert_session_if_free(
        &self,
        session: NewSession,
        window_minutes: i64,
    ) -> AppResult<Session>;
    async fn session_by_id(&self, id: Uuid) -> AppResult<Option<Session>>;
    /// Sessions still occupying the mentor's calendar, i.e. pending or
    /// confirmed ones.
    async fn active_sessions_for_mentor(&self, mentor_id: Uuid) -> AppResult<Vec<Session>>;
    async fn sessions_for_user(&self, user_id: Uuid) -> AppResult<Vec<Session>>;
    /// Move a session to `to`, but only while its current status is one of
    /// `from`. Atomic, so a stale caller can never pull a session out of a
    /// state someone else already moved it past. Unknown id is `NotFound`;
    /// an unexpected current status is `Conflict`.
    async fn transition_session(
        &self,
        id: Uuid,
        from: &[SessionStatus],
        to: SessionStatus,
    ) -> AppResult<Session>;

    async fn insert_message(
        &self,
        sender_id: Uuid,
        receiver_id: Uuid,
        content: &str,
    ) -> AppResult<Message>;
    /// Newest-first page of the conversation between two users. `before`
    /// restricts the page to strictly older messages.
    async fn messages_between(
        &self,
        user_a: Uuid,
        user_b: Uuid,
        limit: i64,
        before: Option<DateTime<Utc>>,
    ) -> AppResult<Vec<Message>>;
}

/// Hands out strictly increasing timestamps. Two messages stored within the
/// same microsecond would otherwise tie on `created_at` and break cursor
/// paging.
pub(crate) struct MonotonicClock {
    last_micros: AtomicI64,
}

impl MonotonicClock {
    pub fn new() -> Self {
        MonotonicClock {
            last_micros: AtomicI64::new(0),
        }
    }

    pub fn next(&self) -> DateTime<Utc> {
        let now = Utc::now().timestamp_micros();
        let mut prev = self.last_micros.load(Ordering::Relaxed);
        loop {
            let candidate = now.max(prev + 1);
            match self.last_micros.compare_exchange_weak(
                prev,
                candidate,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    return DateTime::from_timestamp_micros(candidate)
                        .unwrap_or_else(Utc::now)
                }
                Err(actual) => prev = actual,
            }
        }
    }
}
