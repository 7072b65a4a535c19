use sqlx::{Pool, Sqlite};

use crate::db::{NewNotification, Notification, NotificationRepository};
use crate::error::AppError;
use crate::realtime::NotificationHub;

const MAX_KIND_CHARS: usize = 64;
const MAX_MESSAGE_CHARS: usize = 2000;

/// Persists notifications and pushes them to any open streams of the
/// recipient. The row is written first; the push is best-effort.
#[derive(Clone)]
pub struct NotificationPublisher {
    db: Pool<Sqlite>,
    hub: NotificationHub,
}

impl NotificationPublisher {
    pub fn new(db: Pool<Sqlite>, hub: NotificationHub) -> Self {
        Self { db, hub }
    }

    pub fn hub(&self) -> &NotificationHub {
        &self.hub
    }

    pub async fn publish(&self, new: NewNotification) -> Result<Notification, AppError> {
        let new = validate(new)?;
        let notification = NotificationRepository::create(&self.db, &new).await?;

        let delivered = self.hub.publish(&notification.user_id, notification.clone());
        tracing::debug!(
            notification_id = notification.id,
            recipient = %notification.user_id,
            delivered,
            "notification published"
        );

        Ok(notification)
    }
}

fn validate(new: NewNotification) -> Result<NewNotification, AppError> {
    let user_id = new.user_id.trim().to_string();
    let kind = new.kind.trim().to_string();
    let message = new.message.trim().to_string();

    if user_id.is_empty() {
        return Err(AppError::Validation("user_id is required".to_string()));
    }
    if kind.is_empty() || kind.chars().count() > MAX_KIND_CHARS {
        return Err(AppError::Validation(format!(
            "type must be 1-{} characters",
            MAX_KIND_CHARS
        )));
    }
    if message.is_empty() || message.chars().count() > MAX_MESSAGE_CHARS {
        return Err(AppError::Validation(format!(
            "message must be 1-{} characters",
            MAX_MESSAGE_CHARS
        )));
    }

    Ok(NewNotification {
        user_id,
        kind,
        message,
    })
}
