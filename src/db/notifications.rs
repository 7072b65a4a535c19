use sqlx::{Pool, Sqlite};

use crate::db::models::{NewNotification, Notification};
use crate::db::now_millis;
use crate::error::AppError;

pub struct NotificationRepository;

impl NotificationRepository {
    pub async fn create(
        pool: &Pool<Sqlite>,
        new: &NewNotification,
    ) -> Result<Notification, AppError> {
        let now = now_millis();

        let notification = sqlx::query_as::<_, Notification>(
            r#"
INSERT INTO notifications (user_id, kind, message, is_read, created_at, updated_at)
VALUES (?, ?, ?, 0, ?, ?)
RETURNING *
            "#,
        )
        .bind(&new.user_id)
        .bind(&new.kind)
        .bind(&new.message)
        .bind(now)
        .bind(now)
        .fetch_one(pool)
        .await?;

        Ok(notification)
    }

    pub async fn list_by_recipient(
        pool: &Pool<Sqlite>,
        user_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Notification>, AppError> {
        let notifications = sqlx::query_as::<_, Notification>(
            r#"
SELECT * FROM notifications
WHERE user_id = ?
ORDER BY created_at DESC, id DESC
LIMIT ? OFFSET ?
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await?;

        Ok(notifications)
    }

    /// Marks one notification read. Re-marking leaves `updated_at` untouched,
    /// so repeated calls return identical rows. `None` when the id does not
    /// exist or belongs to someone else.
    pub async fn mark_read(
        pool: &Pool<Sqlite>,
        id: i64,
        user_id: &str,
    ) -> Result<Option<Notification>, AppError> {
        let notification = sqlx::query_as::<_, Notification>(
            r#"
UPDATE notifications
SET updated_at = CASE WHEN is_read = 0 THEN ? ELSE updated_at END,
    is_read = 1
WHERE id = ? AND user_id = ?
RETURNING *
            "#,
        )
        .bind(now_millis())
        .bind(id)
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

        Ok(notification)
    }

    pub async fn mark_all_read(pool: &Pool<Sqlite>, user_id: &str) -> Result<u64, AppError> {
        let result = sqlx::query(
            "UPDATE notifications SET is_read = 1, updated_at = ? WHERE user_id = ? AND is_read = 0",
        )
        .bind(now_millis())
        .bind(user_id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected())
    }

    pub async fn count_unread(pool: &Pool<Sqlite>, user_id: &str) -> Result<i64, AppError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM notifications WHERE user_id = ? AND is_read = 0",
        )
        .bind(user_id)
        .fetch_one(pool)
        .await?;

        Ok(count)
    }
}
