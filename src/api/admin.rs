use axum::{extract::rejection::JsonRejection, extract::State, http::StatusCode, Extension, Json};

use crate::api::state::AppState;
use crate::api::{ok, Envelope};
use crate::auth::AuthUser;
use crate::db::{NewNotification, Notification};
use crate::error::AppError;

/// POST /api/admin/notifications (admin only)
pub async fn publish_notification(
    State(state): State<AppState>,
    Extension(admin): Extension<AuthUser>,
    body: Result<Json<NewNotification>, JsonRejection>,
) -> Result<(StatusCode, Json<Envelope<Notification>>), AppError> {
    let Json(new) = body.map_err(|e| AppError::Validation(e.body_text()))?;

    let notification = state.publisher.publish(new).await?;
    tracing::info!(
        admin_id = %admin.user_id,
        notification_id = notification.id,
        recipient = %notification.user_id,
        "notification created"
    );

    Ok((StatusCode::CREATED, ok(notification)))
}
