use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::migrate::Migrator;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::FromRow;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{
    Message, NewSession, NewUser, Profile, ProfileData, Role, Session, SessionStatus, User,
};

use super::{MentorRecord, MonotonicClock, Store};

pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

pub async fn connect(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(16)
        .connect(database_url)
        .await
}

/// Postgres-backed store. Behavior must stay in lockstep with
/// [`super::MemoryStore`], which is what the test suite exercises.
pub struct PgStore {
    pool: PgPool,
    clock: MonotonicClock,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        PgStore {
            pool,
            clock: MonotonicClock::new(),
        }
    }
}

#[derive(FromRow)]
struct UserRow {
    id: Uuid,
    username: String,
    email: String,
    password_hash: String,
    role: String,
    created_at: DateTime<Utc>,
}

impl UserRow {
    fn into_user(self) -> AppResult<User> {
        let role = Role::parse(&self.role).ok_or_else(|| {
            AppError::Database(format!("unknown role '{}' in users table", self.role))
        })?;
        Ok(User {
            id: self.id,
            username: self.username,
            email: self.email,
            password_hash: self.password_hash,
            role,
            created_at: self.created_at,
        })
    }
}

#[derive(FromRow)]
struct ProfileRow {
    id: Uuid,
    user_id: Uuid,
    bio: Option<String>,
    subjects: Vec<String>,
    availability: Option<String>,
}

impl From<ProfileRow> for Profile {
    fn from(row: ProfileRow) -> Self {
        Profile {
            id: row.id,
            user_id: row.user_id,
            bio: row.bio,
            subjects: row.subjects,
            availability: row.availability,
        }
    }
}

#[derive(FromRow)]
struct SessionRow {
    id: Uuid,
    student_id: Uuid,
    mentor_id: Uuid,
    subject: String,
    scheduled_at: DateTime<Utc>,
    status: String,
    created_at: DateTime<Utc>,
}

impl SessionRow {
    fn into_session(self) -> AppResult<Session> {
        let status = SessionStatus::parse(&self.status).ok_or_else(|| {
            AppError::Database(format!("unknown status '{}' in sessions table", self.status))
        })?;
        Ok(Session {
            id: self.id,
            student_id: self.student_id,
            mentor_id: self.mentor_id,
            subject: self.subject,
            scheduled_at: self.scheduled_at,
            status,
            created_at: self.created_at,
        })
    }
}

#[derive(FromRow)]
struct MessageRow {
    id: Uuid,
    sender_id: Uuid,
    receiver_id: Uuid,
    content: String,
    created_at: DateTime<Utc>,
}

impl From<MessageRow> for Message {
    fn from(row: MessageRow) -> Self {
        Message {
            id: row.id,
            sender_id: row.sender_id,
            receiver_id: row.receiver_id,
            content: row.content,
            created_at: row.created_at,
        }
    }
}

#[derive(FromRow)]
struct MentorRow {
    id: Uuid,
    username: String,
    email: String,
    password_hash: String,
    role: String,
    created_at: DateTime<Utc>,
    profile_id: Option<Uuid>,
    bio: Option<String>,
    subjects: Option<Vec<String>>,
    availability: Option<String>,
}

fn map_insert_error(err: sqlx::Error) -> AppError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            AppError::Conflict("username or email already in use".into())
        }
        _ => AppError::Database(err.to_string()),
    }
}

#[async_trait]
impl Store for PgStore {
    async fn insert_user(&self, user: NewUser) -> AppResult<User> {
        let id = Uuid::new_v4();
        let created_at = Utc::now();
        sqlx::query(
            "INSERT INTO users (id, username, email, password_hash, role, created_at)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(id)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .bind(created_at)
        .execute(&self.pool)
        .await
        .map_err(map_insert_error)?;

        Ok(User {
            id,
            username: user.username,
            email: user.email,
            password_hash: user.password_hash,
            role: user.role,
            created_at,
        })
    }

    async fn user_by_id(&self, id: Uuid) -> AppResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, username, email, password_hash, role, created_at
               FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(UserRow::into_user).transpose()
    }

    async fn user_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, username, email, password_hash, role, created_at
               FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        row.map(UserRow::into_user).transpose()
    }

    async fn upsert_profile(&self, user_id: Uuid, data: ProfileData) -> AppResult<Profile> {
        // RETURNING reflects the stored row, so the original id wins on
        // conflict.
        let row = sqlx::query_as::<_, ProfileRow>(
            "INSERT INTO profiles (id, user_id, bio, subjects, availability)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (user_id) DO UPDATE
                SET bio = EXCLUDED.bio,
                    subjects = EXCLUDED.subjects,
                    availability = EXCLUDED.availability
             RETURNING id, user_id, bio, subjects, availability",
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(&data.bio)
        .bind(&data.subjects)
        .bind(&data.availability)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }

    async fn profile_by_user(&self, user_id: Uuid) -> AppResult<Option<Profile>> {
        let row = sqlx::query_as::<_, ProfileRow>(
            "SELECT id, user_id, bio, subjects, availability
               FROM profiles WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Profile::from))
    }

    async fn list_mentors(&self) -> AppResult<Vec<MentorRecord>> {
        let rows = sqlx::query_as::<_, MentorRow>(
            "SELECT u.id, u.username, u.email, u.password_hash, u.role, u.created_at,
                    p.id AS profile_id, p.bio, p.subjects, p.availability
               FROM users u
               LEFT JOIN profiles p ON p.user_id = u.id
              WHERE u.role = 'mentor'
              ORDER BY u.username",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let MentorRow {
                    id,
                    username,
                    email,
                    password_hash,
                    role,
                    created_at,
                    profile_id,
                    bio,
                    subjects,
                    availability,
                } = row;
                let role = Role::parse(&role).ok_or_else(|| {
                    AppError::Database(format!("unknown role '{role}' in users table"))
                })?;
                let user = User {
                    id,
                    username,
                    email,
                    password_hash,
                    role,
                    created_at,
                };
                let profile = profile_id.map(|pid| Profile {
                    id: pid,
                    user_id: id,
                    bio,
                    subjects: subjects.unwrap_or_default(),
                    availability,
                });
                Ok(MentorRecord { user, profile })
            })
            .collect()
    }

    async fn insert_session_if_free(
        &self,
        session: NewSession,
        window_minutes: i64,
    ) -> AppResult<Session> {
        let id = Uuid::new_v4();
        let created_at = Utc::now();

        // Serialize bookings per mentor; under READ COMMITTED two concurrent
        // inserts could otherwise both pass the overlap check.
        let mut tx = self.pool.begin().await?;
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1::text))")
            .bind(session.mentor_id)
            .execute(&mut *tx)
            .await?;

        let taken: bool = sqlx::query_scalar(
            "SELECT EXISTS (
                SELECT 1 FROM sessions
                 WHERE mentor_id = $1
                   AND status IN ('pending', 'confirmed')
                   AND abs(extract(epoch FROM (scheduled_at - $2::timestamptz))) < $3::double precision
             )",
        )
        .bind(session.mentor_id)
        .bind(session.scheduled_at)
        .bind((window_minutes * 60) as f64)
        .fetch_one(&mut *tx)
        .await?;
        if taken {
            return Err(AppError::Conflict(
                "the mentor already has a session too close to that time".into(),
            ));
        }

        sqlx::query(
            "INSERT INTO sessions (id, student_id, mentor_id, subject, scheduled_at, status, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(id)
        .bind(session.student_id)
        .bind(session.mentor_id)
        .bind(&session.subject)
        .bind(session.scheduled_at)
        .bind(SessionStatus::Pending.as_str())
        .bind(created_at)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(Session {
            id,
            student_id: session.student_id,
            mentor_id: session.mentor_id,
            subject: session.subject,
            scheduled_at: session.scheduled_at,
            status: SessionStatus::Pending,
            created_at,
        })
    }

    async fn session_by_id(&self, id: Uuid) -> AppResult<Option<Session>> {
        let row = sqlx::query_as::<_, SessionRow>(
            "SELECT id, student_id, mentor_id, subject, scheduled_at, status, created_at
               FROM sessions WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(SessionRow::into_session).transpose()
    }

    async fn active_sessions_for_mentor(&self, mentor_id: Uuid) -> AppResult<Vec<Session>> {
        let rows = sqlx::query_as::<_, SessionRow>(
            "SELECT id, student_id, mentor_id, subject, scheduled_at, status, created_at
               FROM sessions
              WHERE mentor_id = $1 AND status IN ('pending', 'confirmed')",
        )
        .bind(mentor_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(SessionRow::into_session).collect()
    }

    async fn sessions_for_user(&self, user_id: Uuid) -> AppResult<Vec<Session>> {
        let rows = sqlx::query_as::<_, SessionRow>(
            "SELECT id, student_id, mentor_id, subject, scheduled_at, status, created_at
               FROM sessions
              WHERE student_id = $1 OR mentor_id = $1
              ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(SessionRow::into_session).collect()
    }

    async fn transition_session(
        &self,
        id: Uuid,
        from: &[SessionStatus],
        to: SessionStatus,
    ) -> AppResult<Session> {
        let expected: Vec<String> = from.iter().map(|s| s.as_str().to_string()).collect();
        let row = sqlx::query_as::<_, SessionRow>(
            "UPDATE sessions SET status = $2
              WHERE id = $1 AND status = ANY($3)
             RETURNING id, student_id, mentor_id, subject, scheduled_at, status, created_at",
        )
        .bind(id)
        .bind(to.as_str())
        .bind(&expected)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => row.into_session(),
            // Zero rows updated: either the id is unknown or the session has
            // already moved past an expected status.
            None => {
                let current = self
                    .session_by_id(id)
                    .await?
                    .ok_or_else(|| AppError::NotFound("session not found".into()))?;
                Err(AppError::Conflict(format!(
                    "cannot move a {} session to {to}",
                    current.status
                )))
            }
        }
    }

    async fn insert_message(
        &self,
        sender_id: Uuid,
        receiver_id: Uuid,
        content: &str,
    ) -> AppResult<Message> {
        let id = Uuid::new_v4();
        let created_at = self.clock.next();
        sqlx::query(
            "INSERT INTO messages (id, sender_id, receiver_id, content, created_at)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(id)
        .bind(sender_id)
        .bind(receiver_id)
        .bind(content)
        .bind(created_at)
        .execute(&self.pool)
        .await?;

        Ok(Message {
            id,
            sender_id,
            receiver_id,
            content: content.to_string(),
            created_at,
        })
    }

    async fn messages_between(
        &self,
        user_a: Uuid,
        user_b: Uuid,
        limit: i64,
        before: Option<DateTime<Utc>>,
    ) -> AppResult<Vec<Message>> {
        let rows = sqlx::query_as::<_, MessageRow>(
            "SELECT id, sender_id, receiver_id, content, created_at
               FROM messages
              WHERE ((sender_id = $1 AND receiver_id = $2)
                  OR (sender_id = $2 AND receiver_id = $1))
                AND ($3::timestamptz IS NULL OR created_at < $3)
              ORDER BY created_at DESC
              LIMIT $4",
        )
        .bind(user_a)
        .bind(user_b)
        .bind(before)
        .bind(limit.max(0))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Message::from).collect())
    }
}
