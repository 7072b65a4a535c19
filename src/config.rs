use std::time::Duration;

use crate::error::AppError;

/// Shortest keep-alive interval the SSE loop will run with.
pub const MIN_KEEP_ALIVE: Duration = Duration::from_secs(1);

/// Upper bound for any page size accepted from clients.
pub const MAX_PAGE_SIZE: i64 = 100;

#[derive(Clone, Debug)]
pub struct Config {
    pub server_host: String,
    pub server_port: u16,
    pub database_url: String,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub request_timeout_secs: u64,
    pub jwt_secret: String,
    pub stream_idle_timeout_secs: u64,
    pub delivery_channel_capacity: usize,
    pub room_channel_capacity: usize,
    pub history_default_limit: i64,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let jwt_secret = std::env::var("JWT_SECRET")
            .map_err(|_| AppError::Config("JWT_SECRET must be set".to_string()))?;
        if jwt_secret.is_empty() {
            return Err(AppError::Config("JWT_SECRET must not be empty".to_string()));
        }

        let history_default_limit: i64 = parse_var("HISTORY_DEFAULT_LIMIT", "50")?;

        Ok(Config {
            server_host: std::env::var("SERVER_HOST")
                .unwrap_or_else(|_| "127.0.0.1".to_string()),
            server_port: parse_var("SERVER_PORT", "8080")?,
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://classroom_realtime.db?mode=rwc".to_string()),
            db_max_connections: parse_var("DB_MAX_CONNECTIONS", "20")?,
            db_min_connections: parse_var("DB_MIN_CONNECTIONS", "5")?,
            request_timeout_secs: parse_var("REQUEST_TIMEOUT_SECS", "30")?,
            jwt_secret,
            stream_idle_timeout_secs: parse_var("STREAM_IDLE_TIMEOUT_SECS", "30")?,
            delivery_channel_capacity: parse_var::<usize>("DELIVERY_CHANNEL_CAPACITY", "1")?
                .max(1),
            room_channel_capacity: parse_var::<usize>("ROOM_CHANNEL_CAPACITY", "64")?.max(1),
            history_default_limit: history_default_limit.clamp(1, MAX_PAGE_SIZE),
        })
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }

    /// Keep-alive cadence for SSE streams: half the idle timeout, never below
    /// [`MIN_KEEP_ALIVE`].
    pub fn keep_alive_interval(&self) -> Duration {
        keep_alive_for(Duration::from_secs(self.stream_idle_timeout_secs))
    }
}

pub fn keep_alive_for(idle_timeout: Duration) -> Duration {
    (idle_timeout / 2).max(MIN_KEEP_ALIVE)
}

fn parse_var<T>(name: &str, default: &str) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    std::env::var(name)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .map_err(|e| AppError::Config(format!("Invalid {}: {}", name, e)))
}
