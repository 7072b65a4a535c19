use std::convert::Infallible;

use axum::{
    body::Body,
    extract::{
        rejection::{PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::{header, StatusCode},
    response::Response,
    Extension, Json,
};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::Instrument;

use crate::api::state::AppState;
use crate::api::{ok, Envelope};
use crate::auth::AuthUser;
use crate::config::MAX_PAGE_SIZE;
use crate::context::CorrelationId;
use crate::db::{Notification, NotificationRepository};
use crate::error::AppError;
use crate::realtime::sse::{StreamSession, OUTBOUND_BUFFER};

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    20
}

#[derive(Debug, Serialize)]
pub struct UnreadCount {
    pub unread: i64,
}

#[derive(Debug, Serialize)]
pub struct MarkedRead {
    pub updated: u64,
}

/// GET /api/notifications
pub async fn list(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<Json<Envelope<Vec<Notification>>>, AppError> {
    let Query(query) = query.map_err(|e| AppError::Validation(e.body_text()))?;

    if !(1..=MAX_PAGE_SIZE).contains(&query.limit) {
        return Err(AppError::Validation(format!(
            "limit must be between 1 and {}",
            MAX_PAGE_SIZE
        )));
    }
    if query.offset < 0 {
        return Err(AppError::Validation("offset must not be negative".to_string()));
    }

    let notifications =
        NotificationRepository::list_by_recipient(&state.db, &user.user_id, query.limit, query.offset)
            .await?;

    Ok(ok(notifications))
}

/// GET /api/notifications/unread-count
pub async fn unread_count(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Envelope<UnreadCount>>, AppError> {
    let unread = NotificationRepository::count_unread(&state.db, &user.user_id).await?;
    Ok(ok(UnreadCount { unread }))
}

/// PATCH /api/notifications/:id/read
pub async fn mark_read(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<Envelope<Notification>>, AppError> {
    let Path(id) = id.map_err(|e| AppError::Validation(e.body_text()))?;
    let notification = NotificationRepository::mark_read(&state.db, id, &user.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Notification not found".to_string()))?;

    Ok(ok(notification))
}

/// PATCH /api/notifications/read-all
pub async fn mark_all_read(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Envelope<MarkedRead>>, AppError> {
    let updated = NotificationRepository::mark_all_read(&state.db, &user.user_id).await?;
    Ok(ok(MarkedRead { updated }))
}

/// GET /api/notifications/stream
///
/// Registers the caller, spawns the session loop and hands its output to the
/// response body. Dropping the body (client disconnect) ends the loop.
pub async fn stream(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Extension(correlation_id): Extension<CorrelationId>,
) -> Result<Response, AppError> {
    let (notifications, unsubscribe) = state.publisher.hub().subscribe(&user.user_id);
    let (out, frames) = mpsc::channel(OUTBOUND_BUFFER);

    let session = StreamSession {
        recipient: user.user_id.clone(),
        correlation_id: correlation_id.clone(),
        notifications,
        unsubscribe,
        keep_alive: state.config.keep_alive_interval(),
        cancel: state.shutdown.child_token(),
    };

    let span = tracing::info_span!(
        "notification_stream",
        correlation_id = %correlation_id,
        recipient = %user.user_id,
    );
    tokio::spawn(session.run(out).instrument(span));

    let body = Body::from_stream(ReceiverStream::new(frames).map(Ok::<_, Infallible>));

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::CONNECTION, "keep-alive")
        .header("x-accel-buffering", "no")
        .body(body)
        .map_err(|e| AppError::Internal(format!("Failed to build stream response: {}", e)))
}
