use std::sync::Arc;
use std::time::Duration;
use sqlx::sqlite::SqlitePoolOptions;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use classroom_realtime::{
    api::{create_router, AppState},
    config::Config,
    error::AppError,
};

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,classroom_realtime=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting classroom-realtime v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = Arc::new(Config::from_env()?);
    tracing::info!(
        keep_alive_secs = config.keep_alive_interval().as_secs(),
        delivery_capacity = config.delivery_channel_capacity,
        "Configuration loaded"
    );

    // Setup database with proper connection pooling
    let db = SqlitePoolOptions::new()
        .max_connections(config.db_max_connections)
        .min_connections(config.db_min_connections)
        .acquire_timeout(Duration::from_secs(30))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(&config.database_url)
        .await?;

    tracing::info!("Database connected: {}", config.database_url);

    sqlx::migrate!("./migrations").run(&db).await?;
    tracing::info!("Database migrations completed");

    // Cancelled on Ctrl-C; every stream and chat session listens on a child
    let shutdown = CancellationToken::new();
    let state = AppState::new(db, config.clone(), shutdown.clone());

    let app = create_router(state);

    let addr = config.server_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to bind to {}: {}", addr, e)))?;

    tracing::info!("Server listening on http://{}", addr);
    tracing::info!("  GET   /api/health");
    tracing::info!("  GET   /api/notifications/stream        (SSE, requires auth)");
    tracing::info!("  GET   /api/notifications               (requires auth)");
    tracing::info!("  PATCH /api/notifications/:id/read      (requires auth)");
    tracing::info!("  POST  /api/admin/notifications         (admin)");
    tracing::info!("  GET   /api/chat/rooms/:room_id/messages (requires auth)");
    tracing::info!("  GET   /api/chat/ws?room_id=...         (WebSocket)");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await
        .map_err(|e| AppError::Internal(format!("Server error: {}", e)))?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("Shutdown requested, closing live sessions");
    shutdown.cancel();
}
