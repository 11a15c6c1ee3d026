//! Admin API endpoints.
//!
//! All endpoints pass the gateway and then the admin guard.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post},
};
use std::sync::Arc;
use tracing::info;

use super::error::{ApiError, ResultExt};
use crate::auth::{AdminGuard, CurrentUser, require_admin, require_auth};
use crate::db::{Database, UserStatus};
use crate::impl_has_auth_backend;
use crate::jwt::{TokenCodec, TokenSettings};
use crate::sweep::{SessionSweeper, SweepError};

/// State for admin endpoints.
#[derive(Clone)]
pub struct AdminState {
    pub db: Database,
    pub codec: Arc<TokenCodec>,
    pub tokens: TokenSettings,
    pub sweeper: SessionSweeper,
}

impl_has_auth_backend!(AdminState);

pub fn router(state: AdminState) -> Router {
    let users = Router::new()
        .route("/users", get(list_users))
        .route("/users/{id}/ban", post(ban_user))
        .route("/users/{id}/unban", post(unban_user))
        .route_layer(middleware::from_fn_with_state(
            Arc::new(AdminGuard::new()),
            require_admin,
        ));

    let sessions = Router::new()
        .route("/sessions/sweep", post(sweep_sessions))
        .route_layer(middleware::from_fn_with_state(
            Arc::new(AdminGuard::with_roles(["operator"])),
            require_admin,
        ));

    // Gateway runs first, so the guard sees a populated context
    users
        .merge(sessions)
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_auth::<AdminState>,
        ))
        .with_state(state)
}

/// List all users.
async fn list_users(State(state): State<AdminState>) -> Result<impl IntoResponse, ApiError> {
    let users = state.db.users().list().await.db_err("Failed to list users")?;
    Ok(Json(users))
}

/// Disable an account and revoke its session.
async fn ban_user(
    State(state): State<AdminState>,
    CurrentUser(admin): CurrentUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    if id == admin.user_id {
        return Err(ApiError::bad_request("Cannot ban yourself"));
    }

    let updated = state
        .db
        .users()
        .set_status(id, UserStatus::Disabled)
        .await
        .db_err("Failed to disable user")?;
    if !updated {
        return Err(ApiError::not_found("User not found"));
    }

    // Deleting the refresh entry is what revokes the live session, so a
    // failure here must surface.
    state
        .db
        .refresh_tokens()
        .delete(id)
        .await
        .db_err("Failed to delete refresh token")?;

    state
        .db
        .sessions()
        .deactivate_by_user(id)
        .await
        .db_err("Failed to deactivate sessions")?;

    info!(user_id = id, admin_id = admin.user_id, "User banned");

    Ok(StatusCode::NO_CONTENT)
}

/// Re-enable a disabled account.
async fn unban_user(
    State(state): State<AdminState>,
    CurrentUser(admin): CurrentUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let updated = state
        .db
        .users()
        .set_status(id, UserStatus::Active)
        .await
        .db_err("Failed to enable user")?;
    if !updated {
        return Err(ApiError::not_found("User not found"));
    }

    info!(user_id = id, admin_id = admin.user_id, "User unbanned");

    Ok(StatusCode::NO_CONTENT)
}

/// Run a session sweep now.
async fn sweep_sessions(State(state): State<AdminState>) -> Result<impl IntoResponse, ApiError> {
    match state.sweeper.run().await {
        Ok(report) => Ok(Json(report)),
        Err(SweepError::AlreadyRunning) => {
            Err(ApiError::conflict("A session sweep is already running"))
        }
        Err(SweepError::Database(e)) => Err(ApiError::db_error("Failed to sweep sessions", e)),
    }
}
