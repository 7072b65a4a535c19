//! Room-scoped chat over a WebSocket.
//!
//! A connection is admitted by [`admit`], which either yields a
//! [`ChatContext`] or a close code. [`ChatSession::run`] then moves it from
//! `Active` to `Closed`.

use std::borrow::Cow;

use axum::extract::ws::{close_code, CloseFrame, Message as WsMessage, WebSocket};
use serde::{Deserialize, Serialize};
use sqlx::{Pool, Sqlite};
use tokio_util::sync::CancellationToken;

use crate::auth::{AuthUser, Role};
use crate::context::CorrelationId;
use crate::db::{ChatMessage, MessageKind, MessageRepository, NewChatMessage};
use crate::error::AppError;
use crate::realtime::RoomHub;

pub const CLOSE_UNAUTHORIZED: u16 = 4401;
pub const CLOSE_BAD_REQUEST: u16 = 4400;

pub const MAX_CONTENT_CHARS: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatState {
    Active,
    Closed,
}

/// Room ids are 3 to 128 characters.
pub fn validate_room_id(room_id: &str) -> Result<(), AppError> {
    let len = room_id.chars().count();
    if !(3..=128).contains(&len) || room_id.trim().is_empty() {
        return Err(AppError::Validation(
            "room_id must be 3-128 characters".to_string(),
        ));
    }
    Ok(())
}

/// Everything a live session needs from the upgrade request.
#[derive(Debug, Clone)]
pub struct ChatContext {
    pub user_id: String,
    pub role: Role,
    pub room_id: String,
    pub correlation_id: CorrelationId,
    pub cancel: CancellationToken,
}

/// Close code and reason sent when a connection fails admission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub code: u16,
    pub reason: &'static str,
}

/// Admission check run before the upgrade completes. Identity is checked
/// before the room.
pub fn admit(
    user: Option<AuthUser>,
    room_id: Option<String>,
    correlation_id: CorrelationId,
    cancel: CancellationToken,
) -> Result<ChatContext, Rejection> {
    let Some(user) = user else {
        return Err(Rejection {
            code: CLOSE_UNAUTHORIZED,
            reason: "unauthorized",
        });
    };
    let Some(room_id) = room_id.filter(|r| validate_room_id(r).is_ok()) else {
        return Err(Rejection {
            code: CLOSE_BAD_REQUEST,
            reason: "room_id is required",
        });
    };

    Ok(ChatContext {
        user_id: user.user_id,
        role: user.role,
        room_id,
        correlation_id,
        cancel,
    })
}

/// Frame a client sends to post into the room.
#[derive(Debug, Clone, Deserialize)]
pub struct OutgoingMessage {
    pub content: String,
    #[serde(rename = "type", default)]
    pub kind: MessageKind,
    #[serde(default)]
    pub receiver_id: Option<String>,
}

/// Frames the server writes to a chat socket.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ServerFrame<'a> {
    Message { data: &'a ChatMessage },
    Error { message: String },
}

/// Validate, persist, then fan a message out to the room. Shared by the
/// socket loop and the HTTP send endpoint.
pub async fn post_message(
    db: &Pool<Sqlite>,
    rooms: &RoomHub,
    room_id: &str,
    sender_id: &str,
    outgoing: OutgoingMessage,
) -> Result<ChatMessage, AppError> {
    validate_room_id(room_id)?;

    let content = outgoing.content.trim();
    if content.is_empty() || content.chars().count() > MAX_CONTENT_CHARS {
        return Err(AppError::Validation(format!(
            "Message must be 1-{} characters",
            MAX_CONTENT_CHARS
        )));
    }
    if outgoing.kind == MessageKind::System {
        return Err(AppError::Validation(
            "system messages cannot be sent by clients".to_string(),
        ));
    }
    let receiver_id = match outgoing.receiver_id {
        Some(r) if r.trim().is_empty() => {
            return Err(AppError::Validation("receiver_id must not be empty".to_string()))
        }
        other => other,
    };

    let message = MessageRepository::create(
        db,
        &NewChatMessage {
            room_id: room_id.to_string(),
            sender_id: sender_id.to_string(),
            receiver_id,
            content: content.to_string(),
            kind: outgoing.kind,
        },
    )
    .await?;

    let delivered = rooms.publish(room_id, message.clone());
    tracing::debug!(
        room_id,
        message_id = message.id,
        delivered,
        "chat message published"
    );

    Ok(message)
}

pub struct ChatSession {
    pub context: ChatContext,
    pub db: Pool<Sqlite>,
    pub rooms: RoomHub,
}

impl ChatSession {
    /// `Active → Closed`.
    pub async fn run(self, mut socket: WebSocket) -> ChatState {
        let ChatSession { context, db, rooms } = self;
        let ChatContext {
            user_id,
            role,
            room_id,
            correlation_id,
            cancel,
        } = context;

        let (mut inbox, unsubscribe) = rooms.subscribe(&room_id);
        let mut state = ChatState::Active;
        tracing::info!(
            correlation_id = %correlation_id,
            user_id = %user_id,
            %role,
            room_id = %room_id,
            "chat session active"
        );

        while state == ChatState::Active {
            tokio::select! {
                _ = cancel.cancelled() => {
                    let _ = socket
                        .send(WsMessage::Close(Some(CloseFrame {
                            code: close_code::AWAY,
                            reason: Cow::Borrowed("server shutting down"),
                        })))
                        .await;
                    state = ChatState::Closed;
                }
                delivered = inbox.recv() => match delivered {
                    Some(message) if message.visible_to(&user_id) => {
                        if let Err(e) = send_frame(&mut socket, &ServerFrame::Message { data: &message }).await {
                            tracing::debug!(correlation_id = %correlation_id, "chat write failed: {}", e);
                            state = ChatState::Closed;
                        }
                    }
                    Some(_) => {}
                    None => state = ChatState::Closed,
                },
                incoming = socket.recv() => match incoming {
                    Some(Ok(WsMessage::Text(text))) => {
                        let reply = match serde_json::from_str::<OutgoingMessage>(&text) {
                            Ok(outgoing) => post_message(&db, &rooms, &room_id, &user_id, outgoing)
                                .await
                                .err()
                                .map(|e| client_error(&e)),
                            Err(e) => Some(format!("malformed message: {}", e)),
                        };
                        if let Some(message) = reply {
                            if let Err(e) = send_frame(&mut socket, &ServerFrame::Error { message }).await {
                                tracing::debug!(correlation_id = %correlation_id, "chat write failed: {}", e);
                                state = ChatState::Closed;
                            }
                        }
                    }
                    Some(Ok(WsMessage::Ping(payload))) => {
                        if socket.send(WsMessage::Pong(payload)).await.is_err() {
                            state = ChatState::Closed;
                        }
                    }
                    Some(Ok(WsMessage::Close(_))) | None => state = ChatState::Closed,
                    Some(Err(e)) => {
                        tracing::debug!(correlation_id = %correlation_id, "chat read failed: {}", e);
                        state = ChatState::Closed;
                    }
                    Some(Ok(_)) => {}
                },
            }
        }

        unsubscribe.unsubscribe();
        tracing::info!(
            correlation_id = %correlation_id,
            user_id = %user_id,
            room_id = %room_id,
            "chat session closed"
        );
        state
    }
}

/// Close a connection that failed admission, before any exchange.
pub async fn reject(mut socket: WebSocket, rejection: Rejection, correlation_id: &CorrelationId) {
    tracing::info!(
        correlation_id = %correlation_id,
        code = rejection.code,
        reason = rejection.reason,
        "chat connection rejected"
    );
    let _ = socket
        .send(WsMessage::Close(Some(CloseFrame {
            code: rejection.code,
            reason: Cow::Borrowed(rejection.reason),
        })))
        .await;
}

async fn send_frame(socket: &mut WebSocket, frame: &ServerFrame<'_>) -> Result<(), axum::Error> {
    let text = serde_json::to_string(frame).map_err(axum::Error::new)?;
    socket.send(WsMessage::Text(text)).await
}

fn client_error(err: &AppError) -> String {
    match err {
        AppError::Validation(msg) => msg.clone(),
        other => {
            tracing::error!("chat message failed: {}", other);
            "message could not be delivered".to_string()
        }
    }
}
