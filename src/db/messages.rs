use sqlx::{Pool, Sqlite};

use crate::db::models::{ChatMessage, NewChatMessage};
use crate::db::now_millis;
use crate::error::AppError;

pub struct MessageRepository;

impl MessageRepository {
    pub async fn create(
        pool: &Pool<Sqlite>,
        new: &NewChatMessage,
    ) -> Result<ChatMessage, AppError> {
        Self::create_at(pool, new, now_millis()).await
    }

    /// Insert with an explicit timestamp (unix ms). Used by imports and tests.
    pub async fn create_at(
        pool: &Pool<Sqlite>,
        new: &NewChatMessage,
        created_at: i64,
    ) -> Result<ChatMessage, AppError> {
        let message = sqlx::query_as::<_, ChatMessage>(
            r#"
INSERT INTO chat_messages (room_id, sender_id, receiver_id, content, kind, created_at)
VALUES (?, ?, ?, ?, ?, ?)
RETURNING *
            "#,
        )
        .bind(&new.room_id)
        .bind(&new.sender_id)
        .bind(&new.receiver_id)
        .bind(&new.content)
        .bind(new.kind)
        .bind(created_at)
        .fetch_one(pool)
        .await?;

        Ok(message)
    }

    /// Newest-first page of a room as seen by `viewer`. Direct messages are
    /// only included when the viewer sent or received them. `before` is an
    /// exclusive upper bound on `created_at`; ties on the timestamp are ordered
    /// by id so pages are stable across calls.
    pub async fn list_by_room(
        pool: &Pool<Sqlite>,
        room_id: &str,
        viewer: &str,
        before: Option<i64>,
        limit: i64,
    ) -> Result<Vec<ChatMessage>, AppError> {
        let messages = match before {
            Some(before) => {
                sqlx::query_as::<_, ChatMessage>(
                    r#"
SELECT * FROM chat_messages
WHERE room_id = ? AND created_at < ?
  AND (receiver_id IS NULL OR receiver_id = ? OR sender_id = ?)
ORDER BY created_at DESC, id DESC
LIMIT ?
                    "#,
                )
                .bind(room_id)
                .bind(before)
                .bind(viewer)
                .bind(viewer)
                .bind(limit)
                .fetch_all(pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, ChatMessage>(
                    r#"
SELECT * FROM chat_messages
WHERE room_id = ?
  AND (receiver_id IS NULL OR receiver_id = ? OR sender_id = ?)
ORDER BY created_at DESC, id DESC
LIMIT ?
                    "#,
                )
                .bind(room_id)
                .bind(viewer)
                .bind(viewer)
                .bind(limit)
                .fetch_all(pool)
                .await?
            }
        };

        Ok(messages)
    }
}
