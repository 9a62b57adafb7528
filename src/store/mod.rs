/// Refresh Token Store
///
/// Persists one record per issued refresh token. Records are grouped into
/// families: every token descended by rotation from one login shares the
/// family id. A family has at most one unused record at any time.
///
/// `mark_used` is the synchronization point for concurrent rotations: it is
/// a single conditional update, so exactly one caller sees `1` for a given
/// token and every other caller sees `0`.

mod memory;
mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::auth::TokenClaims;
use crate::error::AppError;

pub use memory::InMemoryTokenStore;
pub use postgres::PgTokenStore;

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct RefreshTokenRecord {
    pub jti: String,
    pub user_id: Uuid,
    pub family: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub used: bool,
}

impl RefreshTokenRecord {
    /// Builds the record for freshly issued refresh-token claims
    pub fn from_claims(claims: &TokenClaims) -> Result<Self, AppError> {
        let family = claims
            .family
            .clone()
            .ok_or_else(|| AppError::internal("Refresh token claims carry no family"))?;

        Ok(Self {
            jti: claims.jti.clone(),
            user_id: claims.user_id()?,
            family,
            issued_at: timestamp(claims.iat)?,
            expires_at: timestamp(claims.exp)?,
            used: false,
        })
    }

    /// A record is live strictly before its expiry instant
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

fn timestamp(seconds: i64) -> Result<DateTime<Utc>, AppError> {
    DateTime::<Utc>::from_timestamp(seconds, 0)
        .ok_or_else(|| AppError::internal(format!("Timestamp {} out of range", seconds)))
}

#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn get_by_token_id(&self, jti: &str) -> Result<Option<RefreshTokenRecord>, AppError>;

    /// Fails with an internal error when the jti already exists
    async fn create(&self, record: &RefreshTokenRecord) -> Result<(), AppError>;

    /// Sets `used = true` only if it was false. Returns rows affected.
    async fn mark_used(&self, jti: &str) -> Result<u64, AppError>;

    async fn delete_by_token_id(&self, jti: &str) -> Result<u64, AppError>;

    async fn delete_family(&self, family: &str) -> Result<u64, AppError>;

    async fn delete_for_user_except_family(
        &self,
        user_id: Uuid,
        family: &str,
    ) -> Result<u64, AppError>;
}
