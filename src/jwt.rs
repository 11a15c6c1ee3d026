//! JWT token issuing and parsing.
//!
//! Parsing separates tokens that are authentic but past their expiry from
//! tokens that are forged or malformed: the former still yield their claims
//! so the gateway can attempt a silent renewal, the latter never do.

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::db::{UserStatus, UserType};

/// Token type for distinguishing access vs refresh tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    /// Short-lived access token - stateless, no JTI
    Access,
    /// Long-lived refresh token - held server-side, has a JTI
    Refresh,
}

/// Identity facts embedded in tokens at issuance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserIdentity {
    pub user_id: i64,
    pub status: UserStatus,
    pub user_type: UserType,
}

/// JWT claims for access tokens (stateless, no JTI).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Subject (user ID)
    pub sub: String,
    /// Account status at issuance
    pub status: UserStatus,
    /// User class at issuance
    pub user_type: UserType,
    /// Token type
    #[serde(rename = "typ")]
    pub token_type: TokenType,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
}

/// JWT claims for refresh tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshClaims {
    /// JWT ID
    pub jti: String,
    /// Subject (user ID)
    pub sub: String,
    pub status: UserStatus,
    pub user_type: UserType,
    #[serde(rename = "typ")]
    pub token_type: TokenType,
    pub iat: u64,
    pub exp: u64,
}

impl AccessClaims {
    /// The identity carried by this token.
    pub fn identity(&self) -> Result<UserIdentity, JwtError> {
        Ok(UserIdentity {
            user_id: parse_subject(&self.sub)?,
            status: self.status,
            user_type: self.user_type,
        })
    }
}

impl RefreshClaims {
    pub fn user_id(&self) -> Result<i64, JwtError> {
        parse_subject(&self.sub)
    }
}

fn parse_subject(sub: &str) -> Result<i64, JwtError> {
    sub.parse().map_err(|_| JwtError::InvalidSubject)
}

trait TypedClaims: DeserializeOwned {
    const TOKEN_TYPE: TokenType;
    fn token_type(&self) -> TokenType;
    fn exp(&self) -> u64;
}

impl TypedClaims for AccessClaims {
    const TOKEN_TYPE: TokenType = TokenType::Access;
    fn token_type(&self) -> TokenType {
        self.token_type
    }
    fn exp(&self) -> u64 {
        self.exp
    }
}

impl TypedClaims for RefreshClaims {
    const TOKEN_TYPE: TokenType = TokenType::Refresh;
    fn token_type(&self) -> TokenType {
        self.token_type
    }
    fn exp(&self) -> u64 {
        self.exp
    }
}

/// Outcome of parsing an authentic token.
#[derive(Debug, Clone)]
pub enum Parsed<C> {
    /// Signature correct and not yet expired.
    Valid(C),
    /// Signature correct but past its expiry. Claims are trustworthy.
    Expired(C),
}

impl<C> Parsed<C> {
    pub fn claims(&self) -> &C {
        match self {
            Parsed::Valid(c) | Parsed::Expired(c) => c,
        }
    }

    pub fn into_claims(self) -> C {
        match self {
            Parsed::Valid(c) | Parsed::Expired(c) => c,
        }
    }

    pub fn is_expired(&self) -> bool {
        matches!(self, Parsed::Expired(_))
    }
}

/// Access token duration: 5 minutes
pub const ACCESS_TOKEN_DURATION: Duration = Duration::from_secs(5 * 60);

/// Refresh token duration: 2 weeks
pub const REFRESH_TOKEN_DURATION: Duration = Duration::from_secs(14 * 24 * 60 * 60);

/// Token lifetimes used when issuing at login and renewal.
#[derive(Debug, Clone, Copy)]
pub struct TokenSettings {
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
}

impl Default for TokenSettings {
    fn default() -> Self {
        Self {
            access_ttl: ACCESS_TOKEN_DURATION,
            refresh_ttl: REFRESH_TOKEN_DURATION,
        }
    }
}

/// A freshly signed token.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    /// The JWT token string
    pub token: String,
    /// Issued at timestamp (Unix seconds)
    pub issued_at: u64,
    /// Expiration timestamp (Unix seconds)
    pub expires_at: u64,
}

/// Signs and parses bearer tokens with a shared secret.
#[derive(Clone)]
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

fn now_secs() -> Result<u64, JwtError> {
    Ok(SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|_| JwtError::TimeError)?
        .as_secs())
}

impl TokenCodec {
    /// Create a new codec with the given secret.
    pub fn new(secret: &[u8]) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
        }
    }

    /// Issue an access token for an identity, valid for `ttl`.
    pub fn issue_access_token(
        &self,
        identity: &UserIdentity,
        ttl: Duration,
    ) -> Result<IssuedToken, JwtError> {
        let now = now_secs()?;
        let exp = now.checked_add(ttl.as_secs()).ok_or(JwtError::TimeError)?;

        let claims = AccessClaims {
            sub: identity.user_id.to_string(),
            status: identity.status,
            user_type: identity.user_type,
            token_type: TokenType::Access,
            iat: now,
            exp,
        };

        let token = jsonwebtoken::encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(JwtError::Encoding)?;

        Ok(IssuedToken {
            token,
            issued_at: now,
            expires_at: exp,
        })
    }

    /// Issue a refresh token for an identity, valid for `ttl`.
    /// Every refresh token carries a fresh JTI, so two logins never produce
    /// the same token string.
    pub fn issue_refresh_token(
        &self,
        identity: &UserIdentity,
        ttl: Duration,
    ) -> Result<IssuedToken, JwtError> {
        let now = now_secs()?;
        let exp = now.checked_add(ttl.as_secs()).ok_or(JwtError::TimeError)?;

        let claims = RefreshClaims {
            jti: uuid::Uuid::new_v4().to_string(),
            sub: identity.user_id.to_string(),
            status: identity.status,
            user_type: identity.user_type,
            token_type: TokenType::Refresh,
            iat: now,
            exp,
        };

        let token = jsonwebtoken::encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(JwtError::Encoding)?;

        Ok(IssuedToken {
            token,
            issued_at: now,
            expires_at: exp,
        })
    }

    /// Parse an access token.
    pub fn parse_access_token(&self, token: &str) -> Result<Parsed<AccessClaims>, JwtError> {
        let parsed = self.parse::<AccessClaims>(token)?;
        parsed.claims().identity()?;
        Ok(parsed)
    }

    /// Parse a refresh token.
    pub fn parse_refresh_token(&self, token: &str) -> Result<Parsed<RefreshClaims>, JwtError> {
        let parsed = self.parse::<RefreshClaims>(token)?;
        parsed.claims().user_id()?;
        Ok(parsed)
    }

    fn parse<C: TypedClaims>(&self, token: &str) -> Result<Parsed<C>, JwtError> {
        // Expiry is checked here rather than by jsonwebtoken so that an
        // expired token still hands back its claims.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_exp = false;

        let token_data = jsonwebtoken::decode::<C>(token, &self.decoding_key, &validation)
            .map_err(JwtError::Decoding)?;
        let claims = token_data.claims;

        if claims.token_type() != C::TOKEN_TYPE {
            return Err(JwtError::WrongTokenType);
        }

        if claims.exp() <= now_secs()? {
            Ok(Parsed::Expired(claims))
        } else {
            Ok(Parsed::Valid(claims))
        }
    }
}

/// Errors that can occur during JWT operations.
#[derive(Debug)]
pub enum JwtError {
    /// Error encoding the token
    Encoding(jsonwebtoken::errors::Error),
    /// Bad signature, malformed token or missing claims
    Decoding(jsonwebtoken::errors::Error),
    /// System time error
    TimeError,
    /// Wrong token type (e.g., using refresh token as access token)
    WrongTokenType,
    /// Subject is not a user ID
    InvalidSubject,
}

impl std::fmt::Display for JwtError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JwtError::Encoding(e) => write!(f, "Failed to encode token: {}", e),
            JwtError::Decoding(e) => write!(f, "Failed to decode token: {}", e),
            JwtError::TimeError => write!(f, "System time error or lifetime out of range"),
            JwtError::WrongTokenType => write!(f, "Wrong token type"),
            JwtError::InvalidSubject => write!(f, "Token subject is not a user ID"),
        }
    }
}

impl std::error::Error for JwtError {}
