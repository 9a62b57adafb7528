/// Access-token gate for protected requests
///
/// Access tokens are stateless: this only verifies the signature, issuer and
/// expiry, it never consults the token store.

use std::sync::Arc;

use crate::audit::{log_token_event, TokenEventType, TokenKind};
use crate::auth::claims::AuthenticatedUser;
use crate::auth::jwt::TokenCodec;
use crate::error::{AppError, AuthError};
use crate::security::{log_security_event, SecurityEvent};

pub struct SessionAuthenticator {
    codec: Arc<TokenCodec>,
}

impl SessionAuthenticator {
    pub fn new(codec: Arc<TokenCodec>) -> Self {
        Self { codec }
    }

    /// Authenticate from the raw `Authorization` header value
    pub fn authenticate(&self, authorization: Option<&str>) -> Result<AuthenticatedUser, AppError> {
        let token = authorization
            .and_then(|h| h.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                tracing::debug!("Missing or invalid Authorization header");
                AppError::Auth(AuthError::TokenInvalid)
            })?;

        let claims = match self.codec.decode_access(token) {
            Ok(claims) => claims,
            Err(e) => {
                log_token_event(false, TokenEventType::Use, TokenKind::Access, e.claims.as_ref());
                return Err(e.into_app_error(TokenKind::Access));
            }
        };

        let identity = AuthenticatedUser::from_claims(&claims).map_err(|e| {
            log_security_event(
                SecurityEvent::JwtUnknownSubject,
                &format!("value={},type=jwt-access", claims.jti),
            );
            e
        })?;

        log_token_event(true, TokenEventType::Use, TokenKind::Access, Some(&claims));
        tracing::debug!(
            user_id = %identity.user_id,
            username = %identity.username,
            "JWT validated successfully"
        );

        Ok(identity)
    }
}
