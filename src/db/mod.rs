pub mod messages;
pub mod models;
pub mod notifications;

pub use messages::MessageRepository;
pub use models::{ChatMessage, MessageKind, NewChatMessage, NewNotification, Notification};
pub use notifications::NotificationRepository;

use sqlx::{sqlite::SqlitePoolOptions, Pool, Sqlite};

use crate::error::AppError;

/// Current time in unix milliseconds, the unit every timestamp column uses.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Single-connection in-memory database with migrations applied.
pub async fn memory_pool() -> Result<Pool<Sqlite>, AppError> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    Ok(pool)
}
