use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{
    Message, NewSession, NewUser, Profile, ProfileData, Role, Session, SessionStatus, User,
};

use super::{MentorRecord, MonotonicClock, Store};

/// In-memory store with the same observable behavior as [`PgStore`]. Carries
/// the whole test suite, so any semantic difference from the SQL layer is a
/// bug here.
pub struct MemoryStore {
    inner: RwLock<Inner>,
    clock: MonotonicClock,
}

#[derive(Default)]
struct Inner {
    users: HashMap<Uuid, User>,
    /// Keyed by user id; one profile per user.
    profiles: HashMap<Uuid, Profile>,
    sessions: HashMap<Uuid, Session>,
    messages: Vec<Message>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore {
            inner: RwLock::new(Inner::default()),
            clock: MonotonicClock::new(),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_user(&self, user: NewUser) -> AppResult<User> {
        let mut inner = self.inner.write().await;
        let taken = inner
            .users
            .values()
            .any(|u| u.username == user.username || u.email == user.email);
        if taken {
            return Err(AppError::Conflict("username or email already in use".into()));
        }

        let record = User {
            id: Uuid::new_v4(),
            username: user.username,
            email: user.email,
            password_hash: user.password_hash,
            role: user.role,
            created_at: Utc::now(),
        };
        inner.users.insert(record.id, record.clone());
        Ok(record)
    }

    async fn user_by_id(&self, id: Uuid) -> AppResult<Option<User>> {
        Ok(self.inner.read().await.users.get(&id).cloned())
    }

    async fn user_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let inner = self.inner.read().await;
        Ok(inner.users.values().find(|u| u.email == email).cloned())
    }

    async fn upsert_profile(&self, user_id: Uuid, data: ProfileData) -> AppResult<Profile> {
        let mut inner = self.inner.write().await;
        // The profile id survives rewrites of the content.
        let id = inner
            .profiles
            .get(&user_id)
            .map(|p| p.id)
            .unwrap_or_else(Uuid::new_v4);
        let profile = Profile {
            id,
            user_id,
            bio: data.bio,
            subjects: data.subjects,
            availability: data.availability,
        };
        inner.profiles.insert(user_id, profile.clone());
        Ok(profile)
    }

    async fn profile_by_user(&self, user_id: Uuid) -> AppResult<Option<Profile>> {
        Ok(self.inner.read().await.profiles.get(&user_id).cloned())
    }

    async fn list_mentors(&self) -> AppResult<Vec<MentorRecord>> {
        let inner = self.inner.read().await;
        let mut mentors: Vec<MentorRecord> = inner
            .users
            .values()
            .filter(|u| u.role == Role::Mentor)
            .map(|u| MentorRecord {
                user: u.clone(),
                profile: inner.profiles.get(&u.id).cloned(),
            })
            .collect();
        mentors.sort_by(|a, b| a.user.username.cmp(&b.user.username));
        Ok(mentors)
    }

    async fn insert_session_if_free(
        &self,
        session: NewSession,
        window_minutes: i64,
    ) -> AppResult<Session> {
        let mut inner = self.inner.write().await;
        // Check and insert under the same write lock.
        let window_seconds = window_minutes * 60;
        let taken = inner.sessions.values().any(|s| {
            s.mentor_id == session.mentor_id
                && !s.status.is_terminal()
                && (s.scheduled_at - session.scheduled_at).num_seconds().abs() < window_seconds
        });
        if taken {
            return Err(AppError::Conflict(
                "the mentor already has a session too close to that time".into(),
            ));
        }

        let record = Session {
            id: Uuid::new_v4(),
            student_id: session.student_id,
            mentor_id: session.mentor_id,
            subject: session.subject,
            scheduled_at: session.scheduled_at,
            status: SessionStatus::Pending,
            created_at: Utc::now(),
        };
        inner.sessions.insert(record.id, record.clone());
        Ok(record)
    }

    async fn session_by_id(&self, id: Uuid) -> AppResult<Option<Session>> {
        Ok(self.inner.read().await.sessions.get(&id).cloned())
    }

    async fn active_sessions_for_mentor(&self, mentor_id: Uuid) -> AppResult<Vec<Session>> {
        let inner = self.inner.read().await;
        Ok(inner
            .sessions
            .values()
            .filter(|s| s.mentor_id == mentor_id && !s.status.is_terminal())
            .cloned()
            .collect())
    }

    async fn sessions_for_user(&self, user_id: Uuid) -> AppResult<Vec<Session>> {
        let inner = self.inner.read().await;
        let mut sessions: Vec<Session> = inner
            .sessions
            .values()
            .filter(|s| s.student_id == user_id || s.mentor_id == user_id)
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(sessions)
    }

    async fn transition_session(
        &self,
        id: Uuid,
        from: &[SessionStatus],
        to: SessionStatus,
    ) -> AppResult<Session> {
        let mut inner = self.inner.write().await;
        let session = inner
            .sessions
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound("session not found".into()))?;
        if !from.contains(&session.status) {
            return Err(AppError::Conflict(format!(
                "cannot move a {} session to {to}",
                session.status
            )));
        }
        session.status = to;
        Ok(session.clone())
    }

    async fn insert_message(
        &self,
        sender_id: Uuid,
        receiver_id: Uuid,
        content: &str,
    ) -> AppResult<Message> {
        let message = Message {
            id: Uuid::new_v4(),
            sender_id,
            receiver_id,
            content: content.to_string(),
            created_at: self.clock.next(),
        };
        self.inner.write().await.messages.push(message.clone());
        Ok(message)
    }

    async fn messages_between(
        &self,
        user_a: Uuid,
        user_b: Uuid,
        limit: i64,
        before: Option<DateTime<Utc>>,
    ) -> AppResult<Vec<Message>> {
        let inner = self.inner.read().await;
        let mut page: Vec<Message> = inner
            .messages
            .iter()
            .filter(|m| {
                (m.sender_id == user_a && m.receiver_id == user_b)
                    || (m.sender_id == user_b && m.receiver_id == user_a)
            })
            .filter(|m| before.map_or(true, |cutoff| m.created_at < cutoff))
            .cloned()
            .collect();
        page.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        page.truncate(limit.max(0) as usize);
        Ok(page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(name: &str, role: Role) -> NewUser {
        NewUser {
            username: name.to_string(),
            email: format!("{name}@example.com"),
            password_hash: "hash".to_string(),
            role,
        }
    }

    #[tokio::test]
    async fn test_duplicate_username_is_a_conflict() {
        let store = MemoryStore::new();
        store.insert_user(new_user("alice", Role::Student)).await.unwrap();

        let mut dup = new_user("alice", Role::Student);
        dup.email = "other@example.com".to_string();
        let err = store.insert_user(dup).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_duplicate_email_is_a_conflict() {
        let store = MemoryStore::new();
        store.insert_user(new_user("bob", Role::Mentor)).await.unwrap();

        let mut dup = new_user("robert", Role::Mentor);
        dup.email = "bob@example.com".to_string();
        let err = store.insert_user(dup).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_profile_upsert_replaces_wholesale_but_keeps_id() {
        let store = MemoryStore::new();
        let user = store.insert_user(new_user("carol", Role::Mentor)).await.unwrap();

        let first = store
            .upsert_profile(
                user.id,
                ProfileData {
                    bio: Some("ten years of rust".to_string()),
                    subjects: vec!["rust".to_string(), "databases".to_string()],
                    availability: Some("weekends".to_string()),
                },
            )
            .await
            .unwrap();

        let second = store
            .upsert_profile(
                user.id,
                ProfileData {
                    bio: None,
                    subjects: vec!["compilers".to_string()],
                    availability: None,
                },
            )
            .await
            .unwrap();

        assert_eq!(second.id, first.id);
        assert_eq!(second.bio, None);
        assert_eq!(second.subjects, vec!["compilers".to_string()]);
        assert_eq!(second.availability, None);
    }

    async fn seed_session(store: &MemoryStore, mentor_id: Uuid, offset_hours: i64) -> Session {
        store
            .insert_session_if_free(
                NewSession {
                    student_id: Uuid::new_v4(),
                    mentor_id,
                    subject: "rust".to_string(),
                    scheduled_at: Utc::now() + chrono::Duration::hours(offset_hours),
                },
                30,
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_active_sessions_exclude_terminal_statuses() {
        let store = MemoryStore::new();
        let mentor_id = Uuid::new_v4();
        let mut ids = Vec::new();
        for hour in 0..3 {
            ids.push(seed_session(&store, mentor_id, hour).await.id);
        }
        store
            .transition_session(ids[0], &[SessionStatus::Pending], SessionStatus::Cancelled)
            .await
            .unwrap();
        store
            .transition_session(ids[1], &[SessionStatus::Pending], SessionStatus::Completed)
            .await
            .unwrap();

        let active = store.active_sessions_for_mentor(mentor_id).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, ids[2]);
    }

    #[tokio::test]
    async fn test_insert_refuses_a_window_collision() {
        let store = MemoryStore::new();
        let mentor_id = Uuid::new_v4();
        let anchor = Utc::now();

        store
            .insert_session_if_free(
                NewSession {
                    student_id: Uuid::new_v4(),
                    mentor_id,
                    subject: "rust".to_string(),
                    scheduled_at: anchor,
                },
                30,
            )
            .await
            .unwrap();

        let err = store
            .insert_session_if_free(
                NewSession {
                    student_id: Uuid::new_v4(),
                    mentor_id,
                    subject: "rust".to_string(),
                    scheduled_at: anchor + chrono::Duration::minutes(15),
                },
                30,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        // Exactly on the window boundary is free.
        store
            .insert_session_if_free(
                NewSession {
                    student_id: Uuid::new_v4(),
                    mentor_id,
                    subject: "rust".to_string(),
                    scheduled_at: anchor + chrono::Duration::minutes(30),
                },
                30,
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_transition_requires_an_expected_status() {
        let store = MemoryStore::new();
        let session = seed_session(&store, Uuid::new_v4(), 0).await;

        store
            .transition_session(session.id, &[SessionStatus::Pending], SessionStatus::Cancelled)
            .await
            .unwrap();

        // The session left `pending`, so a pending-only transition fails.
        let err = store
            .transition_session(session.id, &[SessionStatus::Pending], SessionStatus::Confirmed)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_transitioning_a_missing_session_is_not_found() {
        let store = MemoryStore::new();
        let err = store
            .transition_session(
                Uuid::new_v4(),
                &[SessionStatus::Pending],
                SessionStatus::Confirmed,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_message_history_pages_newest_first_without_gaps() {
        let store = MemoryStore::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        for i in 0..5 {
            // Alternate direction; both belong to the same conversation.
            let (from, to) = if i % 2 == 0 { (a, b) } else { (b, a) };
            store.insert_message(from, to, &format!("msg {i}")).await.unwrap();
        }
        // Noise from an unrelated pair.
        store.insert_message(a, Uuid::new_v4(), "other").await.unwrap();

        let first = store.messages_between(a, b, 2, None).await.unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].content, "msg 4");
        assert_eq!(first[1].content, "msg 3");

        let cursor = first.last().map(|m| m.created_at);
        let second = store.messages_between(a, b, 2, cursor).await.unwrap();
        assert_eq!(second.len(), 2);
        assert_eq!(second[0].content, "msg 2");
        assert_eq!(second[1].content, "msg 1");

        let cursor = second.last().map(|m| m.created_at);
        let rest = store.messages_between(a, b, 2, cursor).await.unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].content, "msg 0");
    }

    #[tokio::test]
    async fn test_message_timestamps_are_strictly_increasing() {
        let store = MemoryStore::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let mut last = None;
        for i in 0..50 {
            let message = store.insert_message(a, b, &format!("{i}")).await.unwrap();
            if let Some(prev) = last {
                assert!(message.created_at > prev);
            }
            last = Some(message.created_at);
        }
    }
}
