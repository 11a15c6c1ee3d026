//! Bearer token header handling.

use axum::http::{HeaderMap, header};

/// Response header carrying a renewed access token.
pub const NEW_ACCESS_TOKEN_HEADER: &str = "new-access-token";

const BEARER_PREFIX: &str = "Bearer ";

/// Extract the bearer token from the Authorization header.
/// Returns None if the header is missing, not valid UTF-8, not bearer-prefixed,
/// or carries an empty token.
pub fn get_bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix(BEARER_PREFIX)?.trim();
    if token.is_empty() { None } else { Some(token) }
}
