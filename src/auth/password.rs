//! Password hashing via bcrypt.

use std::sync::LazyLock;

/// bcrypt cost factor.
const BCRYPT_COST: u32 = 10;

/// Hash checked when the username is unknown, so a miss costs as much as a
/// wrong password.
static DUMMY_HASH: LazyLock<String> =
    LazyLock::new(|| hash_password("tourgate-dummy-password").unwrap_or_default());

/// Hash a password with bcrypt.
pub fn hash_password(password: &str) -> Result<String, bcrypt::BcryptError> {
    bcrypt::hash(password, BCRYPT_COST)
}

/// Verify a password against a bcrypt hash.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, bcrypt::BcryptError> {
    bcrypt::verify(password, hash)
}

/// A bcrypt hash of the same cost that no submitted password matches in practice.
pub fn dummy_hash() -> &'static str {
    &DUMMY_HASH
}
