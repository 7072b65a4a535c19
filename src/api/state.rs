use std::sync::Arc;

use sqlx::{Pool, Sqlite};
use tokio_util::sync::CancellationToken;

use crate::auth::TokenService;
use crate::config::Config;
use crate::realtime::{NotificationHub, NotificationPublisher, RoomHub};

#[derive(Clone)]
pub struct AppState {
    pub db: Pool<Sqlite>,
    pub config: Arc<Config>,
    pub tokens: Arc<TokenService>,
    pub publisher: NotificationPublisher,
    pub rooms: RoomHub,
    /// Cancelled on graceful shutdown; every live session holds a child token.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(db: Pool<Sqlite>, config: Arc<Config>, shutdown: CancellationToken) -> Self {
        let hub = NotificationHub::new(config.delivery_channel_capacity);
        Self {
            publisher: NotificationPublisher::new(db.clone(), hub),
            rooms: RoomHub::new(config.room_channel_capacity),
            tokens: Arc::new(TokenService::new(&config.jwt_secret)),
            db,
            config,
            shutdown,
        }
    }
}
