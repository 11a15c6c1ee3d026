pub mod api;
pub mod auth;
pub mod cli;
pub mod db;
pub mod jwt;
pub mod rate_limit;
pub mod scheduler;
pub mod sweep;

use api::create_api_router;
use axum::Router;
use db::Database;
use jwt::{TokenCodec, TokenSettings};
use rate_limit::RateLimitConfig;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use sweep::{SESSION_RETENTION, SWEEP_INTERVAL, SessionSweeper, cleanup_scheduler};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

pub struct ServerConfig {
    /// Database connection (cloneable, uses connection pool internally)
    pub db: Database,
    /// JWT secret for signing tokens
    pub jwt_secret: Vec<u8>,
    /// Access and refresh token lifetimes
    pub tokens: TokenSettings,
    /// Whether new user signups are disabled
    pub no_signup: bool,
    /// Login attempts allowed per username per minute
    pub login_attempts_per_minute: u32,
    /// Interval between scheduled session sweeps
    pub sweep_interval: Duration,
    /// Session sweep shared by the scheduler and the admin trigger
    pub sweeper: SessionSweeper,
}

impl ServerConfig {
    /// Config with default lifetimes, retention and limits.
    pub fn new(db: Database, jwt_secret: impl Into<Vec<u8>>) -> Self {
        let sweeper = SessionSweeper::new(db.clone(), SESSION_RETENTION);
        Self {
            db,
            jwt_secret: jwt_secret.into(),
            tokens: TokenSettings::default(),
            no_signup: false,
            login_attempts_per_minute: rate_limit::LOGIN_ATTEMPTS_PER_MINUTE,
            sweep_interval: SWEEP_INTERVAL,
            sweeper,
        }
    }
}

/// Create the application router with the given configuration.
pub fn create_app(config: &ServerConfig) -> Router {
    let codec = Arc::new(TokenCodec::new(&config.jwt_secret));

    let api_router = create_api_router(
        config.db.clone(),
        codec,
        config.tokens,
        config.no_signup,
        RateLimitConfig::new(config.login_attempts_per_minute),
        config.sweeper.clone(),
    );

    Router::new().nest("/api", api_router)
}

/// Spawn the background scheduler (session sweep and refresh token cleanup).
/// Both jobs run once immediately. Abort the handle to stop scheduling.
pub fn init_scheduler(config: &ServerConfig) -> JoinHandle<()> {
    cleanup_scheduler(
        config.db.clone(),
        config.sweeper.clone(),
        config.sweep_interval,
    )
    .spawn()
}

/// Run the server on the given listener. This function blocks until the server exits.
/// Call `init_scheduler` before this to start background cleanup.
pub async fn run_server(config: ServerConfig, listener: TcpListener) -> Result<(), std::io::Error> {
    let app = create_app(&config);
    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, make_service).await
}

/// Start the server on the given port in a background task. Use port 0 to let the OS choose a random port.
/// Returns the actual address the server is listening on.
pub async fn start_server(
    config: ServerConfig,
    port: u16,
) -> Result<(JoinHandle<()>, SocketAddr), std::io::Error> {
    let scheduler = init_scheduler(&config);

    let listener = TcpListener::bind(("127.0.0.1", port)).await?;
    let local_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = run_server(config, listener).await {
            tracing::error!(error = %e, "Server error");
        }
        scheduler.abort();
    });

    Ok((handle, local_addr))
}
