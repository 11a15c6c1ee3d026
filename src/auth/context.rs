//! Per-request identity context.
//!
//! The context lives in a task-local owned by the future passed to
//! [`RequestContext::scope`]. It is dropped when that future finishes, fails,
//! panics or is cancelled, so nothing set during one request can be seen by
//! another request that later runs on the same worker thread.

use std::cell::RefCell;
use std::collections::HashMap;
use std::future::Future;

use axum::{extract::FromRequestParts, http::request::Parts};

use super::errors::{AuthErrorKind, AuthRejection};
use crate::db::UserType;

/// Context key for the authenticated user ID.
pub const USER_ID: &str = "userId";
/// Context key for the authenticated user's class.
pub const USER_TYPE: &str = "userType";
/// Context key for the account status embedded in the token.
pub const STATUS_CODE: &str = "statusCode";

tokio::task_local! {
    static REQUEST_CONTEXT: RefCell<HashMap<String, String>>;
}

/// Accessors for the current request's context.
pub struct RequestContext;

impl RequestContext {
    /// Run `fut` with a fresh, empty context.
    pub async fn scope<F: Future>(fut: F) -> F::Output {
        REQUEST_CONTEXT.scope(RefCell::new(HashMap::new()), fut).await
    }

    /// Set a value. Returns false when called outside a request scope.
    pub fn set(key: &str, value: impl Into<String>) -> bool {
        let value = value.into();
        REQUEST_CONTEXT
            .try_with(|ctx| {
                ctx.borrow_mut().insert(key.to_string(), value);
            })
            .is_ok()
    }

    pub fn get(key: &str) -> Option<String> {
        REQUEST_CONTEXT
            .try_with(|ctx| ctx.borrow().get(key).cloned())
            .ok()
            .flatten()
    }

    /// Remove every value from the current context.
    pub fn clear() {
        let _ = REQUEST_CONTEXT.try_with(|ctx| ctx.borrow_mut().clear());
    }

    pub fn user_id() -> Option<i64> {
        Self::get(USER_ID)?.parse().ok()
    }

    /// The identity populated by the gateway, if any.
    pub fn identity() -> Option<ContextIdentity> {
        Some(ContextIdentity {
            user_id: Self::user_id()?,
            user_type: UserType::from_str(&Self::get(USER_TYPE)?),
        })
    }
}

/// Identity facts handlers read from the context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextIdentity {
    pub user_id: i64,
    pub user_type: UserType,
}

/// Extractor for handlers behind the gateway.
/// Reads the identity the gateway placed in the request context.
pub struct CurrentUser(pub ContextIdentity);

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(_parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        RequestContext::identity()
            .map(CurrentUser)
            .ok_or(AuthRejection::new(AuthErrorKind::MissingToken))
    }
}
