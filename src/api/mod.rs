mod admin;
mod auth;
mod error;

use axum::{Router, routing::get};
use std::sync::Arc;

use crate::db::Database;
use crate::jwt::{TokenCodec, TokenSettings};
use crate::rate_limit::RateLimitConfig;
use crate::sweep::SessionSweeper;

pub use admin::AdminState;
pub use auth::AuthState;
pub use error::{validate_password, validate_username};

/// Create the API router.
pub fn create_api_router(
    db: Database,
    codec: Arc<TokenCodec>,
    tokens: TokenSettings,
    no_signup: bool,
    rate_limit: RateLimitConfig,
    sweeper: SessionSweeper,
) -> Router {
    let auth_state = auth::AuthState {
        db: db.clone(),
        codec: codec.clone(),
        tokens,
        no_signup,
        rate_limit,
    };

    let admin_state = admin::AdminState {
        db,
        codec,
        tokens,
        sweeper,
    };

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .nest("/auth", auth::router(auth_state))
        .nest("/admin", admin::router(admin_state))
}
