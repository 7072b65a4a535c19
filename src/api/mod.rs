pub mod admin;
pub mod chat;
pub mod middleware;
pub mod notifications;
pub mod state;

pub use state::AppState;

use axum::{
    extract::Request,
    middleware::{self as axum_middleware, Next},
    routing::{get, patch, post},
    Json, Router,
};
use serde::Serialize;
use std::time::Duration;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::auth::Role;

/// Success envelope shared by every JSON endpoint.
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub success: bool,
    pub data: T,
}

pub fn ok<T: Serialize>(data: T) -> Json<Envelope<T>> {
    Json(Envelope {
        success: true,
        data,
    })
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

pub fn create_router(state: AppState) -> Router {
    let admin = Router::new()
        .route("/api/admin/notifications", post(admin::publish_notification))
        .route_layer(axum_middleware::from_fn(|req: Request, next: Next| {
            middleware::require_role(Role::Admin, req, next)
        }));

    let authenticated = Router::new()
        // Notifications
        .route("/api/notifications", get(notifications::list))
        .route("/api/notifications/stream", get(notifications::stream))
        .route("/api/notifications/unread-count", get(notifications::unread_count))
        .route("/api/notifications/read-all", patch(notifications::mark_all_read))
        .route("/api/notifications/:id/read", patch(notifications::mark_read))
        // Chat history and HTTP send
        .route(
            "/api/chat/rooms/:room_id/messages",
            get(chat::history).post(chat::send_message),
        )
        .merge(admin)
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth_middleware,
        ));

    // The socket handler closes unauthenticated connections itself
    let websocket = Router::new()
        .route("/api/chat/ws", get(chat::ws_handler))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::optional_auth_middleware,
        ));

    let timeout = Duration::from_secs(state.config.request_timeout_secs);

    Router::new()
        // Health check
        .route("/api/health", get(health))
        .merge(authenticated)
        .merge(websocket)
        .layer(TimeoutLayer::new(timeout))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .layer(axum_middleware::from_fn(middleware::correlation_middleware))
        .with_state(state)
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
