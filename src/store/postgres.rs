use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::{RefreshTokenRecord, TokenStore};
use crate::error::AppError;

pub struct PgTokenStore {
    pool: PgPool,
}

impl PgTokenStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TokenStore for PgTokenStore {
    async fn get_by_token_id(&self, jti: &str) -> Result<Option<RefreshTokenRecord>, AppError> {
        let record = sqlx::query_as::<_, RefreshTokenRecord>(
            r#"
            SELECT jti, user_id, family, issued_at, expires_at, used
            FROM refresh_tokens
            WHERE jti = $1
            "#,
        )
        .bind(jti)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn create(&self, record: &RefreshTokenRecord) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (jti, user_id, family, issued_at, expires_at, used)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(&record.jti)
        .bind(record.user_id)
        .bind(&record.family)
        .bind(record.issued_at)
        .bind(record.expires_at)
        .bind(record.used)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn mark_used(&self, jti: &str) -> Result<u64, AppError> {
        // Single conditional update; never split into read-then-write.
        let result = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET used = true
            WHERE jti = $1 AND used = false
            "#,
        )
        .bind(jti)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn delete_by_token_id(&self, jti: &str) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE jti = $1")
            .bind(jti)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn delete_family(&self, family: &str) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE family = $1")
            .bind(family)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn delete_for_user_except_family(
        &self,
        user_id: Uuid,
        family: &str,
    ) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            DELETE FROM refresh_tokens
            WHERE user_id = $1 AND family <> $2
            "#,
        )
        .bind(user_id)
        .bind(family)
        .execute(&self.pool)
        .await?;

        tracing::info!(
            user_id = %user_id,
            kept_family = %family,
            deleted = result.rows_affected(),
            "Revoked other sessions for user"
        );
        Ok(result.rows_affected())
    }
}
