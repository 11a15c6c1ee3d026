//! Admin capability guard.
//!
//! Layer this inside [`require_auth`](super::require_auth) on routes that
//! need an administrator. A guard may declare a set of permitted roles; the
//! set is recorded and logged but any administrator is admitted.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::debug;

use super::context::{RequestContext, USER_TYPE};
use super::errors::{AuthErrorKind, AuthRejection};
use crate::db::UserType;

#[derive(Debug, Clone, Default)]
pub struct AdminGuard {
    permitted_roles: Vec<String>,
}

impl AdminGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Guard declaring a subset of permitted roles (advisory).
    pub fn with_roles<I, R>(roles: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<String>,
    {
        Self {
            permitted_roles: roles.into_iter().map(Into::into).collect(),
        }
    }

    pub fn permitted_roles(&self) -> &[String] {
        &self.permitted_roles
    }

    /// Check the current request context for an administrator.
    pub fn check(&self) -> Result<(), AuthRejection> {
        let user_type = RequestContext::get(USER_TYPE).map(|t| UserType::from_str(&t));
        if user_type != Some(UserType::Admin) {
            return Err(AuthRejection::new(AuthErrorKind::InsufficientPrivilege));
        }

        if !self.permitted_roles.is_empty() {
            debug!(roles = ?self.permitted_roles, "Declared roles are not enforced");
        }

        Ok(())
    }
}

/// Middleware rejecting non-administrators with `REQUIRE_ADMIN_PERMISSION`.
pub async fn require_admin(
    State(guard): State<Arc<AdminGuard>>,
    request: Request,
    next: Next,
) -> Response {
    match guard.check() {
        Ok(()) => next.run(request).await,
        Err(rejection) => rejection.into_response(),
    }
}
