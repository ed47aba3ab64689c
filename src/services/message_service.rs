use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::Message;
use crate::store::Store;

pub const DEFAULT_HISTORY_PAGE: i64 = 50;
pub const MAX_HISTORY_PAGE: i64 = 100;

pub struct MessageService;

impl MessageService {
    /// Validate and persist one direct message. The stored record comes back
    /// with its assigned timestamp; nothing is delivered from here.
    pub async fn record(
        store: &dyn Store,
        sender_id: Uuid,
        receiver_id: Uuid,
        content: &str,
    ) -> AppResult<Message> {
        if content.trim().is_empty() {
            return Err(AppError::Validation("message content must not be empty".into()));
        }
        if store.user_by_id(receiver_id).await?.is_none() {
            return Err(AppError::NotFound("receiver not found".into()));
        }
        store.insert_message(sender_id, receiver_id, content).await
    }

    /// Newest-first page of the conversation with `other_user_id`.
    pub async fn history(
        store: &dyn Store,
        user_id: Uuid,
        other_user_id: Uuid,
        limit: Option<i64>,
        before: Option<DateTime<Utc>>,
    ) -> AppResult<Vec<Message>> {
        let limit = limit
            .unwrap_or(DEFAULT_HISTORY_PAGE)
            .clamp(1, MAX_HISTORY_PAGE);
        store
            .messages_between(user_id, other_user_id, limit, before)
            .await
    }
}
