//! Bearer-token authentication with silent renewal.
//!
//! Dual-token system: short-lived access tokens (stateless) and long-lived
//! refresh tokens held server-side, one per user. An expired access token is
//! renewed transparently while the user's refresh entry is still live.

mod bearer;
mod context;
mod errors;
mod gateway;
mod guard;
mod password;
mod state;

pub use bearer::{NEW_ACCESS_TOKEN_HEADER, get_bearer_token};
pub use context::{
    ContextIdentity, CurrentUser, RequestContext, STATUS_CODE, USER_ID, USER_TYPE,
};
pub use errors::{AuthErrorKind, AuthRejection};
pub use gateway::{Authenticated, authenticate, require_auth};
pub use guard::{AdminGuard, require_admin};
pub use password::{dummy_hash, hash_password, verify_password};
pub use state::HasAuthBackend;
