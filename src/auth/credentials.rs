/// Credential verification
///
/// Format checks run first and never touch the store. An unknown username
/// and a wrong password produce the same `invalid-credentials` outcome and
/// cost the same bcrypt work; only the security log tells them apart.

use std::sync::Arc;

use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};

use crate::auth::password::{hash_password, verify_password_blocking};
use crate::error::{AppError, AuthError};
use crate::security::{log_security_event, SecurityEvent};
use crate::users::{User, UserStore};
use crate::validators::{validate_login_password, validate_username};

pub struct CredentialVerifier {
    users: Arc<dyn UserStore>,
    /// Hash of a random password, compared against when the username is
    /// unknown so both failure paths do the same work.
    dummy_hash: String,
}

impl CredentialVerifier {
    pub fn new(users: Arc<dyn UserStore>, bcrypt_cost: u32) -> Result<Self, AppError> {
        let dummy_password: String = thread_rng()
            .sample_iter(&Alphanumeric)
            .take(32)
            .map(char::from)
            .collect();
        let dummy_hash = hash_password(&dummy_password, bcrypt_cost)?;

        Ok(Self { users, dummy_hash })
    }

    pub async fn verify(&self, username: &str, password: &str) -> Result<User, AppError> {
        if let Err(e) = validate_username(username) {
            tracing::debug!(error = %e, "Login with malformed username");
            log_security_event(SecurityEvent::LoginInvalidUsername, "type=login");
            return Err(AuthError::UsernameInvalid.into());
        }

        // Outside the length bounds a password can never match a stored hash
        if validate_login_password(password).is_err() {
            log_security_event(
                SecurityEvent::FailedLogin,
                &format!("value={},type=login", username),
            );
            return Err(AuthError::InvalidCredentials.into());
        }

        let user = self.users.get_by_username(username).await?;

        match user {
            None => {
                verify_password_blocking(password.to_string(), self.dummy_hash.clone()).await?;
                log_security_event(
                    SecurityEvent::LoginToUnknownUsername,
                    &format!("value={},type=login", username),
                );
                Err(AuthError::InvalidCredentials.into())
            }
            Some(user) => {
                let matches =
                    verify_password_blocking(password.to_string(), user.password_hash.clone())
                        .await?;
                if !matches {
                    log_security_event(
                        SecurityEvent::FailedLogin,
                        &format!("value={},type=login", username),
                    );
                    return Err(AuthError::InvalidCredentials.into());
                }
                Ok(user)
            }
        }
    }
}
