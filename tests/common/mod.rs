#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use classroom_realtime::api::{create_router, AppState};
use classroom_realtime::auth::Role;
use classroom_realtime::config::Config;
use classroom_realtime::db::memory_pool;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

pub struct TestServer {
    pub base_url: String,
    pub ws_url: String,
    pub state: AppState,
    _shutdown: oneshot::Sender<()>,
}

impl TestServer {
    pub fn token(&self, user_id: &str, role: Role) -> String {
        self.state
            .tokens
            .issue(user_id, role, 3600)
            .expect("issue token")
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

pub fn test_config() -> Config {
    Config {
        server_host: "127.0.0.1".to_string(),
        server_port: 0,
        database_url: "sqlite::memory:".to_string(),
        db_max_connections: 1,
        db_min_connections: 1,
        request_timeout_secs: 30,
        jwt_secret: "integration-secret".to_string(),
        stream_idle_timeout_secs: 30,
        delivery_channel_capacity: 1,
        room_channel_capacity: 64,
        history_default_limit: 50,
    }
}

pub async fn start_server() -> TestServer {
    let db = memory_pool().await.expect("memory db");
    let state = AppState::new(db, Arc::new(test_config()), CancellationToken::new());
    let app = create_router(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind server");
    let addr = listener.local_addr().expect("server addr");
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    let server = axum::serve(listener, app).with_graceful_shutdown(async {
        let _ = shutdown_rx.await;
    });
    tokio::spawn(async move {
        let _ = server.await;
    });

    TestServer {
        base_url: format!("http://{}", addr),
        ws_url: format!("ws://{}", addr),
        state,
        _shutdown: shutdown_tx,
    }
}

/// Poll `check` until it holds or two seconds pass.
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
