//! Rate limiting for the login endpoint.
//!
//! Uses a token bucket keyed by lowercased username, so password guessing
//! against one account is throttled no matter where it comes from.

use governor::{Quota, RateLimiter, clock::DefaultClock, state::keyed::DefaultKeyedStateStore};
use std::num::NonZeroU32;
use std::sync::Arc;

/// Per-key rate limiter.
pub type KeyedLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

/// Default login attempts allowed per username per minute.
pub const LOGIN_ATTEMPTS_PER_MINUTE: u32 = 10;

#[derive(Clone)]
pub struct RateLimitConfig {
    login: Arc<KeyedLimiter>,
}

impl RateLimitConfig {
    /// Allow `per_minute` login attempts per username (at least one).
    pub fn new(per_minute: u32) -> Self {
        let per_minute = NonZeroU32::new(per_minute).unwrap_or(NonZeroU32::MIN);
        Self {
            login: Arc::new(RateLimiter::keyed(Quota::per_minute(per_minute))),
        }
    }

    /// Record a login attempt. Returns false if the username is over its limit.
    pub fn check_login(&self, username: &str) -> bool {
        self.login.check_key(&username.to_lowercase()).is_ok()
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::new(LOGIN_ATTEMPTS_PER_MINUTE)
    }
}
