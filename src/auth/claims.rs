/// JWT Claims structure
///
/// One record type for both access and refresh tokens. Only refresh tokens
/// carry a family; access tokens leave it out of the payload.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, AuthError};
use crate::users::User;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct TokenClaims {
    /// Subject (user ID as UUID string)
    pub sub: String,
    pub username: String,
    pub is_admin: bool,
    /// Unique token id
    pub jti: String,
    /// Refresh-token family; `None` for access tokens
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family: Option<String>,
    pub iss: String,
    /// Issued at (Unix timestamp, seconds)
    pub iat: i64,
    /// Expiration time (Unix timestamp, seconds)
    pub exp: i64,
}

impl TokenClaims {
    /// Create new claims for a user, valid for `expiry_seconds` from `now`
    pub fn new(
        user: &User,
        family: Option<String>,
        now: i64,
        expiry_seconds: i64,
        issuer: &str,
    ) -> Self {
        Self {
            sub: user.id.to_string(),
            username: user.username.clone(),
            is_admin: user.is_admin,
            jti: Uuid::new_v4().to_string(),
            family,
            iss: issuer.to_string(),
            iat: now,
            exp: now + expiry_seconds,
        }
    }

    /// Extract user ID from claims
    ///
    /// A signed token with a non-UUID subject is treated as an invalid token.
    pub fn user_id(&self) -> Result<Uuid, AppError> {
        Uuid::parse_str(&self.sub).map_err(|_| AppError::Auth(AuthError::TokenInvalid))
    }

    /// Valid strictly before the expiry instant
    pub fn is_expired_at(&self, now: i64) -> bool {
        now >= self.exp
    }
}

/// Identity of the caller on a protected request, derived from a verified
/// access token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    pub username: String,
    pub is_admin: bool,
}

impl AuthenticatedUser {
    pub fn from_claims(claims: &TokenClaims) -> Result<Self, AppError> {
        Ok(Self {
            user_id: claims.user_id()?,
            username: claims.username.clone(),
            is_admin: claims.is_admin,
        })
    }
}
