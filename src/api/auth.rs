//! Account endpoints: register, login, current identity, logout.

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use super::error::{ApiError, ResultExt, validate_password, validate_username};
use crate::auth::{CurrentUser, dummy_hash, hash_password, require_auth, verify_password};
use crate::db::{Database, UserStatus, UserType, unix_now};
use crate::impl_has_auth_backend;
use crate::jwt::{TokenCodec, TokenSettings, UserIdentity};
use crate::rate_limit::RateLimitConfig;

#[derive(Clone)]
pub struct AuthState {
    pub db: Database,
    pub codec: Arc<TokenCodec>,
    pub tokens: TokenSettings,
    pub no_signup: bool,
    pub rate_limit: RateLimitConfig,
}

impl_has_auth_backend!(AuthState);

pub fn router(state: AuthState) -> Router {
    let protected = Router::new()
        .route("/me", get(me))
        .route("/logout", post(logout))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_auth::<AuthState>,
        ));

    let public = if state.no_signup {
        Router::new().route("/login", post(login))
    } else {
        Router::new()
            .route("/register", post(register))
            .route("/login", post(login))
    };

    public.merge(protected).with_state(state)
}

#[derive(Deserialize)]
struct Credentials {
    username: String,
    password: String,
}

#[derive(Serialize)]
struct RegisterResponse {
    user_id: i64,
    username: String,
}

async fn register(
    State(state): State<AuthState>,
    Json(payload): Json<Credentials>,
) -> Result<impl IntoResponse, ApiError> {
    let username = payload.username.trim();
    validate_username(username)?;
    validate_password(&payload.password)?;

    let existing = state
        .db
        .users()
        .get_by_username(username)
        .await
        .db_err("Failed to check username availability")?;
    if existing.is_some() {
        return Err(ApiError::conflict("Username is already taken"));
    }

    let password = payload.password;
    let hash = tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .internal_err("Password hashing task failed")?
        .internal_err("Failed to hash password")?;

    let user_id = match state.db.users().create(username, &hash, UserType::User).await {
        Ok(id) => id,
        // Lost a race with a concurrent registration
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
            return Err(ApiError::conflict("Username is already taken"));
        }
        Err(e) => return Err(ApiError::db_error("Failed to create user", e)),
    };

    info!(user_id, username = %username, "User registered");

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            user_id,
            username: username.to_string(),
        }),
    ))
}

#[derive(Serialize)]
struct LoginResponse {
    access_token: String,
    token_type: &'static str,
    expires_in: u64,
    user_id: i64,
    user_type: UserType,
}

async fn login(
    State(state): State<AuthState>,
    Json(payload): Json<Credentials>,
) -> Result<impl IntoResponse, ApiError> {
    let username = payload.username.trim();

    if !state.rate_limit.check_login(username) {
        warn!(username = %username, "Login rate limit exceeded");
        return Err(ApiError::too_many_requests(
            "Too many login attempts, try again later",
        ));
    }

    let user = state
        .db
        .users()
        .get_by_username(username)
        .await
        .db_err("Failed to get user")?;

    // Unknown usernames still pay for a bcrypt check
    let password = payload.password;
    let hash = match &user {
        Some(user) => user.password_hash.clone(),
        None => dummy_hash().to_string(),
    };
    let verified = tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .internal_err("Password verification task failed")?;

    let Some(user) = user else {
        return Err(ApiError::unauthorized("Invalid username or password"));
    };
    if !verified.internal_err("Failed to verify password")? {
        return Err(ApiError::unauthorized("Invalid username or password"));
    }

    if user.status == UserStatus::Disabled {
        return Err(ApiError::forbidden("Account is disabled"));
    }

    let identity = UserIdentity {
        user_id: user.id,
        status: user.status,
        user_type: user.user_type,
    };

    let access = state
        .codec
        .issue_access_token(&identity, state.tokens.access_ttl)
        .internal_err("Failed to issue access token")?;
    let refresh = state
        .codec
        .issue_refresh_token(&identity, state.tokens.refresh_ttl)
        .internal_err("Failed to issue refresh token")?;

    state
        .db
        .refresh_tokens()
        .put(user.id, &refresh.token, state.tokens.refresh_ttl)
        .await
        .db_err("Failed to store refresh token")?;

    state
        .db
        .sessions()
        .create(user.id, unix_now())
        .await
        .db_err("Failed to create session")?;

    info!(user_id = user.id, "User logged in");

    Ok(Json(LoginResponse {
        access_token: access.token,
        token_type: "Bearer",
        expires_in: access.expires_at.saturating_sub(access.issued_at),
        user_id: user.id,
        user_type: user.user_type,
    }))
}

#[derive(Serialize)]
struct MeResponse {
    user_id: i64,
    username: String,
    user_type: UserType,
}

async fn me(
    State(state): State<AuthState>,
    CurrentUser(identity): CurrentUser,
) -> Result<impl IntoResponse, ApiError> {
    let user = state
        .db
        .users()
        .get_by_id(identity.user_id)
        .await
        .db_err("Failed to get user")?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    Ok(Json(MeResponse {
        user_id: user.id,
        username: user.username,
        user_type: identity.user_type,
    }))
}

async fn logout(
    State(state): State<AuthState>,
    CurrentUser(identity): CurrentUser,
) -> Result<impl IntoResponse, ApiError> {
    state
        .db
        .refresh_tokens()
        .delete(identity.user_id)
        .await
        .db_err("Failed to delete refresh token")?;

    state
        .db
        .sessions()
        .deactivate_by_user(identity.user_id)
        .await
        .db_err("Failed to deactivate sessions")?;

    info!(user_id = identity.user_id, "User logged out");

    Ok(StatusCode::NO_CONTENT)
}
