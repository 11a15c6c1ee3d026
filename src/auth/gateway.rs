//! Request authentication gateway.
//!
//! Every protected request passes through [`require_auth`]:
//!
//! - no bearer token: `NEED_TOKEN`
//! - forged or malformed token: `INVALID_TOKEN`
//! - valid token, disabled account: `ACCOUNT_DISABLED`
//! - valid token, no refresh entry: `USER_NOT_EXIST_OR_BANNED`
//! - expired token, no refresh entry: `TOKEN_EXPIRED`
//! - expired token with a live refresh entry: a new access token is issued,
//!   returned in the `New-Access-Token` response header, and the request
//!   proceeds as if the original token had been valid.

use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{debug, error, warn};

use super::bearer::{NEW_ACCESS_TOKEN_HEADER, get_bearer_token};
use super::context::{RequestContext, STATUS_CODE, USER_ID, USER_TYPE};
use super::errors::{AuthErrorKind, AuthRejection};
use super::state::HasAuthBackend;
use crate::db::{UserStatus, unix_now};
use crate::jwt::{IssuedToken, Parsed, UserIdentity};

/// Outcome of a successful authentication.
#[derive(Debug, Clone)]
pub struct Authenticated {
    pub identity: UserIdentity,
    /// Set when an expired access token was silently renewed.
    pub renewed: Option<IssuedToken>,
}

/// Run the authentication state machine against the request headers.
pub async fn authenticate<S>(headers: &HeaderMap, state: &S) -> Result<Authenticated, AuthErrorKind>
where
    S: HasAuthBackend + Send + Sync,
{
    let token = get_bearer_token(headers).ok_or(AuthErrorKind::MissingToken)?;

    let parsed = state.codec().parse_access_token(token).map_err(|e| {
        debug!(error = %e, "Rejected access token");
        AuthErrorKind::MalformedOrForgedToken
    })?;

    let expired = parsed.is_expired();
    let identity = parsed
        .into_claims()
        .identity()
        .map_err(|_| AuthErrorKind::MalformedOrForgedToken)?;

    if !expired {
        if identity.status == UserStatus::Disabled {
            return Err(AuthErrorKind::AccountDisabled);
        }

        if load_refresh_token(state, identity.user_id).await?.is_none() {
            return Err(AuthErrorKind::SessionRevoked);
        }

        return Ok(Authenticated {
            identity,
            renewed: None,
        });
    }

    let stored = load_refresh_token(state, identity.user_id)
        .await?
        .ok_or(AuthErrorKind::ExpiredNoRefresh)?;

    renew(state, identity.user_id, &stored).await
}

async fn load_refresh_token<S>(state: &S, user_id: i64) -> Result<Option<String>, AuthErrorKind>
where
    S: HasAuthBackend + Send + Sync,
{
    state
        .db()
        .refresh_tokens()
        .get(user_id)
        .await
        .map_err(|e| {
            error!(user_id, error = %e, "Failed to look up refresh token");
            AuthErrorKind::Internal
        })
}

/// Issue a new access token from the stored refresh token.
async fn renew<S>(state: &S, user_id: i64, stored: &str) -> Result<Authenticated, AuthErrorKind>
where
    S: HasAuthBackend + Send + Sync,
{
    match state.codec().parse_refresh_token(stored) {
        Ok(Parsed::Valid(claims)) if claims.user_id().ok() == Some(user_id) => {}
        _ => {
            warn!(user_id, "Stored refresh token failed verification");
            return Err(AuthErrorKind::MalformedOrForgedToken);
        }
    }

    // Renewal is an issuance, so the account is re-read here.
    let user = state
        .db()
        .users()
        .get_by_id(user_id)
        .await
        .map_err(|e| {
            error!(user_id, error = %e, "Failed to get user");
            AuthErrorKind::Internal
        })?
        .ok_or(AuthErrorKind::UserNotFound)?;

    if user.status == UserStatus::Disabled {
        return Err(AuthErrorKind::AccountDisabled);
    }

    let identity = UserIdentity {
        user_id: user.id,
        status: user.status,
        user_type: user.user_type,
    };

    let renewed = state
        .codec()
        .issue_access_token(&identity, state.token_settings().access_ttl)
        .map_err(|e| {
            error!(user_id, error = %e, "Failed to issue access token");
            AuthErrorKind::Internal
        })?;

    if let Err(e) = state.db().sessions().touch_active(user_id, unix_now()).await {
        warn!(user_id, error = %e, "Failed to refresh session update time");
    }

    debug!(user_id, "Renewed expired access token");

    Ok(Authenticated {
        identity,
        renewed: Some(renewed),
    })
}

/// Middleware guarding protected routes.
///
/// Opens the request context, authenticates, populates the context and runs
/// the rest of the stack inside it. The context is gone once this returns.
pub async fn require_auth<S>(State(state): State<S>, request: Request, next: Next) -> Response
where
    S: HasAuthBackend + Clone + Send + Sync + 'static,
{
    RequestContext::scope(async move {
        let auth = match authenticate(request.headers(), &state).await {
            Ok(auth) => auth,
            Err(kind) => {
                debug!(code = kind.code(), "Rejected request");
                return AuthRejection::new(kind).into_response();
            }
        };

        let identity = auth.identity;
        RequestContext::set(USER_ID, identity.user_id.to_string());
        RequestContext::set(USER_TYPE, identity.user_type.as_str());
        RequestContext::set(STATUS_CODE, identity.status.as_str());

        let mut response = next.run(request).await;

        if let Some(renewed) = auth.renewed {
            match HeaderValue::from_str(&renewed.token) {
                Ok(value) => {
                    response.headers_mut().insert(NEW_ACCESS_TOKEN_HEADER, value);
                }
                Err(e) => error!(error = %e, "Renewed token is not a valid header value"),
            }
        }

        response
    })
    .await
}
