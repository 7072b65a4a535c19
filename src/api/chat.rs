use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        ws::WebSocketUpgrade,
        Path, Query, State,
    },
    http::StatusCode,
    response::Response,
    Extension, Json,
};
use chrono::DateTime;
use serde::Deserialize;
use tracing::Instrument;

use crate::api::state::AppState;
use crate::api::{ok, Envelope};
use crate::auth::AuthUser;
use crate::config::MAX_PAGE_SIZE;
use crate::context::CorrelationId;
use crate::db::{ChatMessage, MessageRepository};
use crate::error::AppError;
use crate::realtime::chat::{admit, post_message, reject, validate_room_id, ChatSession, OutgoingMessage};

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    /// RFC3339 timestamp; only strictly older messages are returned.
    pub before: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub room_id: Option<String>,
}

/// Parse an RFC3339 cursor into unix milliseconds. Sub-millisecond cursors
/// round up so a message stored in the cursor's own millisecond still counts
/// as older.
pub fn parse_cursor(raw: &str) -> Result<i64, AppError> {
    let ts = DateTime::parse_from_rfc3339(raw.trim())
        .map_err(|e| AppError::Validation(format!("Invalid before cursor: {}", e)))?;

    let millis = ts.timestamp_millis();
    if ts.timestamp_subsec_nanos() % 1_000_000 == 0 {
        Ok(millis)
    } else {
        Ok(millis + 1)
    }
}

/// GET /api/chat/rooms/:room_id/messages
pub async fn history(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(room_id): Path<String>,
    query: Result<Query<HistoryQuery>, QueryRejection>,
) -> Result<Json<Envelope<Vec<ChatMessage>>>, AppError> {
    let Query(query) = query.map_err(|e| AppError::Validation(e.body_text()))?;
    validate_room_id(&room_id)?;

    let before = query.before.as_deref().map(parse_cursor).transpose()?;
    let limit = match query.limit {
        None => state.config.history_default_limit,
        Some(limit) if (1..=MAX_PAGE_SIZE).contains(&limit) => limit,
        Some(_) => {
            return Err(AppError::Validation(format!(
                "limit must be between 1 and {}",
                MAX_PAGE_SIZE
            )))
        }
    };

    let messages =
        MessageRepository::list_by_room(&state.db, &room_id, &user.user_id, before, limit)
            .await?;
    Ok(ok(messages))
}

/// POST /api/chat/rooms/:room_id/messages
pub async fn send_message(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(room_id): Path<String>,
    body: Result<Json<OutgoingMessage>, JsonRejection>,
) -> Result<(StatusCode, Json<Envelope<ChatMessage>>), AppError> {
    let Json(outgoing) = body.map_err(|e| AppError::Validation(e.body_text()))?;

    let message = post_message(&state.db, &state.rooms, &room_id, &user.user_id, outgoing).await?;
    Ok((StatusCode::CREATED, ok(message)))
}

/// GET /api/chat/ws?room_id=...
///
/// Always upgrades; connections without identity or room are closed with
/// 4401 / 4400 before any message is exchanged.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    user: Option<Extension<AuthUser>>,
    Extension(correlation_id): Extension<CorrelationId>,
    query: Result<Query<WsQuery>, QueryRejection>,
) -> Response {
    let room_id = query.ok().and_then(|Query(q)| q.room_id);
    let admission = admit(
        user.map(|Extension(user)| user),
        room_id,
        correlation_id.clone(),
        state.shutdown.child_token(),
    );

    let span = tracing::info_span!("chat_session", correlation_id = %correlation_id);
    ws.on_upgrade(move |socket| {
        async move {
            match admission {
                Ok(context) => {
                    let session = ChatSession {
                        context,
                        db: state.db.clone(),
                        rooms: state.rooms.clone(),
                    };
                    session.run(socket).await;
                }
                Err(rejection) => reject(socket, rejection, &correlation_id).await,
            }
        }
        .instrument(span)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cursor() {
        assert_eq!(parse_cursor("1970-01-01T00:00:01Z").unwrap(), 1_000);
        assert_eq!(parse_cursor("1970-01-01T01:00:01+01:00").unwrap(), 1_000);
        assert!(matches!(parse_cursor("yesterday"), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_parse_cursor_rounds_sub_millisecond_up() {
        assert_eq!(parse_cursor("1970-01-01T00:00:02.9995Z").unwrap(), 3_000);
        assert_eq!(parse_cursor("1970-01-01T00:00:02.999000Z").unwrap(), 2_999);
        assert_eq!(parse_cursor("1970-01-01T00:00:02.998000001Z").unwrap(), 2_999);
    }
}
