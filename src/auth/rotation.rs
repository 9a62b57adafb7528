/// Refresh-token rotation with reuse detection
///
/// Each refresh exchanges a live refresh token for a new access/refresh pair
/// in the same family and marks the presented token used. Presenting a used
/// token again means someone kept a copy of it: the whole family is deleted,
/// which also revokes the newest token the legitimate client holds.

use std::sync::Arc;

use chrono::Utc;

use crate::audit::{
    log_session_event, log_token_event, log_token_pair_created, SessionEventType, TokenEventType,
    TokenKind,
};
use crate::auth::claims::TokenClaims;
use crate::auth::jwt::{IssuedTokens, TokenCodec};
use crate::error::{AppError, AuthError};
use crate::security::{log_security_event, SecurityEvent};
use crate::store::{RefreshTokenRecord, TokenStore};
use crate::users::UserStore;

pub struct RotationEngine {
    codec: Arc<TokenCodec>,
    tokens: Arc<dyn TokenStore>,
    users: Arc<dyn UserStore>,
}

impl RotationEngine {
    pub fn new(
        codec: Arc<TokenCodec>,
        tokens: Arc<dyn TokenStore>,
        users: Arc<dyn UserStore>,
    ) -> Self {
        Self {
            codec,
            tokens,
            users,
        }
    }

    /// Rotate a presented refresh token.
    ///
    /// Returns the new pair only once the old record is marked used and the
    /// new record is stored.
    pub async fn rotate(&self, presented: &str) -> Result<IssuedTokens, AppError> {
        let claims = match self.codec.decode_refresh(presented) {
            Ok(claims) => claims,
            Err(e) => {
                log_token_event(false, TokenEventType::Use, TokenKind::Refresh, e.claims.as_ref());
                return Err(e.into_app_error(TokenKind::Refresh));
            }
        };

        let result = self.rotate_decoded(&claims).await;
        log_token_event(
            result.is_ok(),
            TokenEventType::Use,
            TokenKind::Refresh,
            Some(&claims),
        );
        log_session_event(result.is_ok(), SessionEventType::Refresh, &claims.username);
        result
    }

    async fn rotate_decoded(&self, claims: &TokenClaims) -> Result<IssuedTokens, AppError> {
        let record = match self.tokens.get_by_token_id(&claims.jti).await? {
            Some(record) => record,
            None => {
                // Signed by us but unknown: deleted by a reuse event or a logout
                log_security_event(
                    SecurityEvent::JwtUnknown,
                    &format!("value={},type=jwt", claims.jti),
                );
                return Err(AuthError::TokenInvalid.into());
            }
        };

        if record.used {
            return Err(self.revoke_reused_family(&record).await);
        }

        if record.is_expired_at(Utc::now()) {
            return Err(AuthError::Expired.into());
        }

        let user = match self.users.get_by_id(record.user_id).await? {
            Some(user) => user,
            None => {
                log_security_event(
                    SecurityEvent::JwtUnknownSubject,
                    &format!("value={},type=jwt", record.user_id),
                );
                return Err(AuthError::TokenInvalid.into());
            }
        };

        let issued = self.codec.issue_pair(&user, Some(&record.family))?;

        // The new record lands before the old one is consumed, so a replay's
        // family delete always runs after it and takes it along.
        let new_record = RefreshTokenRecord::from_claims(&issued.refresh_claims)?;
        self.tokens.create(&new_record).await?;

        // Exactly one concurrent rotation of this token gets a row back.
        // Losing to another rotation is a replay; losing to a logout is not.
        match self.tokens.mark_used(&record.jti).await {
            Ok(0) => {
                return match self.tokens.get_by_token_id(&record.jti).await? {
                    Some(_) => Err(self.revoke_reused_family(&record).await),
                    None => {
                        self.discard_orphan(&new_record).await;
                        log_security_event(
                            SecurityEvent::JwtUnknown,
                            &format!("value={},type=jwt", record.jti),
                        );
                        Err(AuthError::TokenInvalid.into())
                    }
                };
            }
            Ok(_) => {}
            Err(e) => {
                self.discard_orphan(&new_record).await;
                return Err(e);
            }
        }

        log_token_pair_created(&issued.access_claims, &issued.refresh_claims);
        tracing::info!(
            user_id = %user.id,
            family = %record.family,
            "Token refreshed successfully"
        );

        Ok(issued)
    }

    /// Removes a new record whose predecessor could not be marked used
    async fn discard_orphan(&self, orphan: &RefreshTokenRecord) {
        if let Err(e) = self.tokens.delete_by_token_id(&orphan.jti).await {
            tracing::error!(
                jti = %orphan.jti,
                family = %orphan.family,
                error = %e,
                "Failed to delete orphaned refresh token record"
            );
        }
    }

    /// Deletes every record in the family of a replayed token.
    ///
    /// Returns `token-reuse` once the family is gone; if the deletion itself
    /// fails the store error is returned instead.
    async fn revoke_reused_family(&self, record: &RefreshTokenRecord) -> AppError {
        log_security_event(
            SecurityEvent::JwtReuse,
            &format!("value={},type=jwt", record.jti),
        );

        match self.tokens.delete_family(&record.family).await {
            Ok(deleted) => {
                tracing::warn!(
                    user_id = %record.user_id,
                    family = %record.family,
                    deleted,
                    "Refresh token reuse detected - token family revoked"
                );
                AuthError::TokenReuse.into()
            }
            Err(e) => {
                tracing::error!(
                    family = %record.family,
                    error = %e,
                    "Failed to delete token family after reuse"
                );
                e
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configuration::JwtSettings;
    use crate::store::InMemoryTokenStore;
    use crate::users::{InMemoryUserStore, User};
    use uuid::Uuid;

    struct Fixture {
        engine: RotationEngine,
        codec: Arc<TokenCodec>,
        tokens: Arc<InMemoryTokenStore>,
        users: Arc<InMemoryUserStore>,
        user: User,
    }

    fn fixture() -> Fixture {
        let codec = Arc::new(TokenCodec::new(&JwtSettings {
            access_secret: "rotation-test-access-secret-0123456789".to_string(),
            refresh_secret: "rotation-test-refresh-secret-0123456789".to_string(),
            access_token_expiry: 60,
            refresh_token_expiry: 600,
            issuer: "test".to_string(),
        }));
        let tokens = Arc::new(InMemoryTokenStore::new());
        let users = Arc::new(InMemoryUserStore::new());
        let user = User {
            id: Uuid::new_v4(),
            username: "alice".to_string(),
            password_hash: String::new(),
            is_admin: false,
        };
        users.insert(user.clone()).unwrap();

        let engine = RotationEngine::new(codec.clone(), tokens.clone(), users.clone());
        Fixture {
            engine,
            codec,
            tokens,
            users,
            user,
        }
    }

    async fn login(fx: &Fixture) -> IssuedTokens {
        let issued = fx.codec.issue_pair(&fx.user, None).unwrap();
        fx.tokens
            .create(&RefreshTokenRecord::from_claims(&issued.refresh_claims).unwrap())
            .await
            .unwrap();
        issued
    }

    #[tokio::test]
    async fn test_rotation_preserves_family() {
        let fx = fixture();
        let first = login(&fx).await;

        let second = fx.engine.rotate(&first.refresh_token).await.unwrap();

        assert_eq!(second.refresh_claims.family, first.refresh_claims.family);
        assert_ne!(second.refresh_claims.jti, first.refresh_claims.jti);

        let family = first.refresh_claims.family.unwrap();
        assert_eq!(fx.tokens.live_count(&family).unwrap(), 1);
        let old = fx
            .tokens
            .get_by_token_id(&first.refresh_claims.jti)
            .await
            .unwrap()
            .unwrap();
        assert!(old.used);
    }

    #[tokio::test]
    async fn test_reuse_revokes_whole_family() {
        let fx = fixture();
        let first = login(&fx).await;
        let second = fx.engine.rotate(&first.refresh_token).await.unwrap();

        let err = fx.engine.rotate(&first.refresh_token).await.unwrap_err();
        assert_eq!(err.auth_reason(), Some(AuthError::TokenReuse));

        let family = first.refresh_claims.family.unwrap();
        assert!(fx.tokens.family_records(&family).unwrap().is_empty());

        let err = fx.engine.rotate(&second.refresh_token).await.unwrap_err();
        assert_eq!(err.auth_reason(), Some(AuthError::TokenInvalid));
    }

    #[tokio::test]
    async fn test_unknown_record_is_token_invalid() {
        let fx = fixture();
        // Signed but never stored
        let issued = fx.codec.issue_pair(&fx.user, None).unwrap();

        let err = fx.engine.rotate(&issued.refresh_token).await.unwrap_err();
        assert_eq!(err.auth_reason(), Some(AuthError::TokenInvalid));
    }

    #[tokio::test]
    async fn test_decode_failure_never_touches_store() {
        let fx = fixture();
        let err = fx.engine.rotate("garbage").await.unwrap_err();
        assert_eq!(err.auth_reason(), Some(AuthError::TokenInvalid));

        let first = login(&fx).await;
        let err = fx.engine.rotate(&first.access_token).await.unwrap_err();
        assert_eq!(err.auth_reason(), Some(AuthError::InvalidSignature));
        let family = first.refresh_claims.family.unwrap();
        assert_eq!(fx.tokens.live_count(&family).unwrap(), 1);
    }

    #[tokio::test]
    async fn test_deleted_user_is_token_invalid() {
        let fx = fixture();
        let first = login(&fx).await;
        let other_users = Arc::new(InMemoryUserStore::new());
        let engine = RotationEngine::new(fx.codec.clone(), fx.tokens.clone(), other_users);

        let err = engine.rotate(&first.refresh_token).await.unwrap_err();
        assert_eq!(err.auth_reason(), Some(AuthError::TokenInvalid));
        // The presented token was not consumed
        let family = first.refresh_claims.family.unwrap();
        assert_eq!(fx.tokens.live_count(&family).unwrap(), 1);
        assert!(fx.users.get_by_id(fx.user.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_expired_record_is_rejected_and_left_unused() {
        let fx = fixture();
        let issued = fx.codec.issue_pair(&fx.user, None).unwrap();
        // The token itself is still within its lifetime; only the record has run out
        let mut record = RefreshTokenRecord::from_claims(&issued.refresh_claims).unwrap();
        record.expires_at = Utc::now() - chrono::Duration::seconds(5);
        fx.tokens.create(&record).await.unwrap();

        let err = fx.engine.rotate(&issued.refresh_token).await.unwrap_err();

        assert_eq!(err.auth_reason(), Some(AuthError::Expired));
        let stored = fx.tokens.get_by_token_id(&record.jti).await.unwrap().unwrap();
        assert!(!stored.used);
        assert_eq!(fx.tokens.family_records(&record.family).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_expired_token_is_rejected_before_lookup() {
        let fx = fixture();
        let expired_codec = TokenCodec::new(&JwtSettings {
            access_secret: "rotation-test-access-secret-0123456789".to_string(),
            refresh_secret: "rotation-test-refresh-secret-0123456789".to_string(),
            access_token_expiry: 60,
            refresh_token_expiry: -5,
            issuer: "test".to_string(),
        });
        // Never stored: a lookup would answer token-invalid instead
        let issued = expired_codec.issue_pair(&fx.user, None).unwrap();

        let err = fx.engine.rotate(&issued.refresh_token).await.unwrap_err();

        let reason = err.auth_reason().unwrap();
        assert_eq!(reason, AuthError::Expired);
        assert!(reason.is_retryable());
    }

    enum MarkUsedHook {
        Fail,
        RevokeFamilyFirst,
    }

    /// Token store that interferes with `mark_used`
    struct HookedStore {
        inner: InMemoryTokenStore,
        hook: MarkUsedHook,
    }

    #[async_trait::async_trait]
    impl TokenStore for HookedStore {
        async fn get_by_token_id(&self, jti: &str) -> Result<Option<RefreshTokenRecord>, AppError> {
            self.inner.get_by_token_id(jti).await
        }

        async fn create(&self, record: &RefreshTokenRecord) -> Result<(), AppError> {
            self.inner.create(record).await
        }

        async fn mark_used(&self, jti: &str) -> Result<u64, AppError> {
            match self.hook {
                MarkUsedHook::Fail => Err(AppError::internal("connection reset")),
                MarkUsedHook::RevokeFamilyFirst => {
                    if let Some(record) = self.inner.get_by_token_id(jti).await? {
                        self.inner.delete_family(&record.family).await?;
                    }
                    self.inner.mark_used(jti).await
                }
            }
        }

        async fn delete_by_token_id(&self, jti: &str) -> Result<u64, AppError> {
            self.inner.delete_by_token_id(jti).await
        }

        async fn delete_family(&self, family: &str) -> Result<u64, AppError> {
            self.inner.delete_family(family).await
        }

        async fn delete_for_user_except_family(
            &self,
            user_id: Uuid,
            family: &str,
        ) -> Result<u64, AppError> {
            self.inner.delete_for_user_except_family(user_id, family).await
        }
    }

    async fn rotate_with_hook(
        hook: MarkUsedHook,
    ) -> (Result<IssuedTokens, AppError>, Arc<HookedStore>, String) {
        let fx = fixture();
        let store = Arc::new(HookedStore {
            inner: InMemoryTokenStore::new(),
            hook,
        });
        let issued = fx.codec.issue_pair(&fx.user, None).unwrap();
        store
            .create(&RefreshTokenRecord::from_claims(&issued.refresh_claims).unwrap())
            .await
            .unwrap();
        let engine = RotationEngine::new(fx.codec.clone(), store.clone(), fx.users.clone());

        let result = engine.rotate(&issued.refresh_token).await;
        (result, store, issued.refresh_claims.family.unwrap())
    }

    #[tokio::test]
    async fn test_failed_mark_used_leaves_no_orphan() {
        let (result, store, family) = rotate_with_hook(MarkUsedHook::Fail).await;

        let err = result.unwrap_err();
        assert_eq!(err.class(), crate::error::ErrorClass::Internal);
        // Only the presented record remains, still live
        let records = store.inner.family_records(&family).unwrap();
        assert_eq!(records.len(), 1);
        assert!(!records[0].used);
    }

    #[tokio::test]
    async fn test_family_revoked_mid_rotation_is_not_reuse() {
        let (result, store, family) = rotate_with_hook(MarkUsedHook::RevokeFamilyFirst).await;

        let err = result.unwrap_err();
        assert_eq!(err.auth_reason(), Some(AuthError::TokenInvalid));
        assert!(store.inner.family_records(&family).unwrap().is_empty());
    }
}
