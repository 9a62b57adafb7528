/// Authentication service
///
/// The operations exposed to the HTTP layer: login, refresh, logout and
/// password update. Each call is one request's worth of work; the stores are
/// the only shared state.

use std::sync::Arc;

use crate::audit::{log_session_event, log_token_pair_created, SessionEventType, TokenKind};
use crate::auth::claims::AuthenticatedUser;
use crate::auth::credentials::CredentialVerifier;
use crate::auth::jwt::{IssuedTokens, TokenCodec};
use crate::auth::password::{hash_password_blocking, verify_password_blocking};
use crate::auth::rotation::RotationEngine;
use crate::error::{AppError, AuthError, ValidationError};
use crate::security::{log_security_event, SecurityEvent};
use crate::store::{RefreshTokenRecord, TokenStore};
use crate::users::{User, UserStore};
use crate::validators::validate_password;

pub struct AuthService {
    codec: Arc<TokenCodec>,
    tokens: Arc<dyn TokenStore>,
    users: Arc<dyn UserStore>,
    verifier: CredentialVerifier,
    rotation: RotationEngine,
    bcrypt_cost: u32,
}

impl AuthService {
    pub fn new(
        codec: Arc<TokenCodec>,
        tokens: Arc<dyn TokenStore>,
        users: Arc<dyn UserStore>,
        bcrypt_cost: u32,
    ) -> Result<Self, AppError> {
        let verifier = CredentialVerifier::new(users.clone(), bcrypt_cost)?;
        let rotation = RotationEngine::new(codec.clone(), tokens.clone(), users.clone());

        Ok(Self {
            codec,
            tokens,
            users,
            verifier,
            rotation,
            bcrypt_cost,
        })
    }

    /// Verify credentials and start a new token family
    pub async fn login(&self, username: &str, password: &str) -> Result<IssuedTokens, AppError> {
        let user = match self.verifier.verify(username, password).await {
            Ok(user) => user,
            Err(e) => {
                log_session_event(false, SessionEventType::Login, username);
                return Err(e);
            }
        };

        let issued = self.start_family(&user).await?;

        log_session_event(true, SessionEventType::Login, &user.username);
        tracing::info!(user_id = %user.id, "User logged in successfully");
        Ok(issued)
    }

    /// Exchange a live refresh token for a new pair in the same family
    pub async fn refresh(&self, refresh_token: &str) -> Result<IssuedTokens, AppError> {
        self.rotation.rotate(refresh_token).await
    }

    /// Revoke the family of the presented refresh token.
    ///
    /// The refresh token must belong to the caller identified by the access
    /// token; access tokens themselves stay valid until they expire.
    pub async fn logout(
        &self,
        identity: &AuthenticatedUser,
        refresh_token: &str,
    ) -> Result<(), AppError> {
        let claims = self
            .codec
            .decode_refresh(refresh_token)
            .map_err(|e| e.into_app_error(TokenKind::Refresh))?;

        if claims.sub != identity.user_id.to_string() {
            log_security_event(
                SecurityEvent::LogoutSubjectMismatch,
                &format!("value={},type=jwt", claims.jti),
            );
            log_session_event(false, SessionEventType::Logout, &identity.username);
            return Err(AuthError::TokenInvalid.into());
        }

        let family = claims.family.as_deref().unwrap_or_default();
        let deleted = self.tokens.delete_family(family).await?;
        if deleted == 0 {
            // Already revoked by an earlier logout or a reuse event
            log_session_event(false, SessionEventType::Logout, &identity.username);
            return Err(AuthError::TokenInvalid.into());
        }

        log_session_event(true, SessionEventType::Logout, &identity.username);
        tracing::info!(
            user_id = %identity.user_id,
            family = %family,
            deleted,
            "User logged out"
        );
        Ok(())
    }

    /// Change the caller's password, start a new family and revoke every
    /// other session of the user.
    pub async fn update_password(
        &self,
        identity: &AuthenticatedUser,
        old_password: &str,
        new_password: &str,
    ) -> Result<IssuedTokens, AppError> {
        if let Err(e) = validate_password(new_password) {
            tracing::debug!(error = %e, "New password rejected by policy");
            return Err(ValidationError::PasswordCriteriaUnmet.into());
        }

        let user = match self.users.get_by_id(identity.user_id).await? {
            Some(user) => user,
            None => {
                log_security_event(
                    SecurityEvent::JwtUnknownSubject,
                    &format!("value={},type=jwt-access", identity.user_id),
                );
                return Err(AuthError::TokenInvalid.into());
            }
        };

        let old_matches =
            verify_password_blocking(old_password.to_string(), user.password_hash.clone()).await?;
        if !old_matches {
            log_security_event(
                SecurityEvent::FailedPasswordUpdate,
                &format!("value={},type=password", user.username),
            );
            log_session_event(false, SessionEventType::PasswordUpdate, &user.username);
            return Err(AuthError::InvalidPassword.into());
        }

        let new_hash = hash_password_blocking(new_password.to_string(), self.bcrypt_cost).await?;
        if self.users.update_password_hash(user.id, &new_hash).await? == 0 {
            return Err(AppError::internal(format!(
                "User '{}' disappeared during password update",
                user.id
            )));
        }

        let issued = self.start_family(&user).await?;
        let family = issued.refresh_claims.family.as_deref().unwrap_or_default();
        let revoked = self
            .tokens
            .delete_for_user_except_family(user.id, family)
            .await?;

        log_session_event(true, SessionEventType::PasswordUpdate, &user.username);
        tracing::info!(
            user_id = %user.id,
            revoked_sessions = revoked,
            "Password updated"
        );
        Ok(issued)
    }

    /// Issue a pair in a brand new family and persist the refresh record
    async fn start_family(&self, user: &User) -> Result<IssuedTokens, AppError> {
        let issued = self.codec.issue_pair(user, None)?;
        let record = RefreshTokenRecord::from_claims(&issued.refresh_claims)?;
        self.tokens.create(&record).await?;
        log_token_pair_created(&issued.access_claims, &issued.refresh_claims);
        Ok(issued)
    }
}
