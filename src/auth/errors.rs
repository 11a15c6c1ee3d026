//! Authentication and authorization error types.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

/// Internal auth error kind used by the gateway and the admin guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthErrorKind {
    /// No bearer token on the request.
    MissingToken,
    /// Bad signature, malformed token, or a stored refresh token that no longer verifies.
    MalformedOrForgedToken,
    /// Access token expired and there is no refresh entry to renew from.
    ExpiredNoRefresh,
    /// Account is disabled.
    AccountDisabled,
    /// Access token is fine but the refresh entry is gone (logout or ban).
    SessionRevoked,
    /// Renewal found no user behind the token.
    UserNotFound,
    /// Authenticated, but not an administrator.
    InsufficientPrivilege,
    /// Store failure while authenticating.
    Internal,
}

impl AuthErrorKind {
    /// Plain-text code sent as the response body.
    pub fn code(&self) -> &'static str {
        match self {
            AuthErrorKind::MissingToken => "NEED_TOKEN",
            AuthErrorKind::MalformedOrForgedToken => "INVALID_TOKEN",
            AuthErrorKind::ExpiredNoRefresh => "TOKEN_EXPIRED",
            AuthErrorKind::AccountDisabled => "ACCOUNT_DISABLED",
            AuthErrorKind::SessionRevoked | AuthErrorKind::UserNotFound => {
                "USER_NOT_EXIST_OR_BANNED"
            }
            AuthErrorKind::InsufficientPrivilege => "REQUIRE_ADMIN_PERMISSION",
            AuthErrorKind::Internal => "INTERNAL_ERROR",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthErrorKind::InsufficientPrivilege => StatusCode::FORBIDDEN,
            AuthErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::UNAUTHORIZED,
        }
    }
}

/// Rejection returned by the gateway, guard and identity extractor.
#[derive(Debug)]
pub struct AuthRejection {
    pub kind: AuthErrorKind,
}

impl AuthRejection {
    pub fn new(kind: AuthErrorKind) -> Self {
        Self { kind }
    }
}

impl From<AuthErrorKind> for AuthRejection {
    fn from(kind: AuthErrorKind) -> Self {
        Self::new(kind)
    }
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        (self.kind.status_code(), self.kind.code()).into_response()
    }
}
