/// Token Codec
///
/// Mints and verifies signed access and refresh tokens (HS512). The two token
/// kinds use separate secrets and lifetimes, so one can never be accepted in
/// place of the other.

use chrono::Utc;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use thiserror::Error;
use uuid::Uuid;

use crate::audit::TokenKind;
use crate::auth::claims::TokenClaims;
use crate::configuration::JwtSettings;
use crate::error::{AppError, AuthError};
use crate::security::{log_security_event, SecurityEvent};
use crate::users::User;

const ALGORITHM: Algorithm = Algorithm::HS512;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeFailureReason {
    #[error("expired")]
    Expired,
    #[error("invalid-signature")]
    InvalidSignature,
    #[error("malformed")]
    Malformed,
    #[error("unhandled")]
    Unhandled,
}

/// Why a token failed to decode, plus whatever claims could be read from it
/// without verification (for logging the subject of a rejected token).
#[derive(Debug, Error)]
#[error("failed to decode token ({reason}): {message}")]
pub struct DecodeError {
    pub reason: DecodeFailureReason,
    pub claims: Option<TokenClaims>,
    message: String,
}

impl DecodeError {
    /// Map a decode failure onto the error taxonomy, emitting a security
    /// event for signature and format failures.
    #[track_caller]
    pub fn into_app_error(self, kind: TokenKind) -> AppError {
        let target = format!(
            "value={},type=jwt-{}",
            self.claims.as_ref().map_or("unknown", |c| c.jti.as_str()),
            kind.as_str()
        );
        match self.reason {
            DecodeFailureReason::Expired => AuthError::Expired.into(),
            DecodeFailureReason::InvalidSignature => {
                log_security_event(SecurityEvent::InvalidTokenSignature, &target);
                AuthError::InvalidSignature.into()
            }
            DecodeFailureReason::Malformed => {
                log_security_event(SecurityEvent::MalformedToken, &target);
                AuthError::TokenInvalid.into()
            }
            DecodeFailureReason::Unhandled => {
                AppError::internal(format!("Unhandled token decode failure: {}", self))
            }
        }
    }

    fn new(reason: DecodeFailureReason, claims: Option<TokenClaims>, message: impl Into<String>) -> Self {
        Self {
            reason,
            claims,
            message: message.into(),
        }
    }
}

/// A freshly minted access/refresh pair
#[derive(Debug, Clone)]
pub struct IssuedTokens {
    pub access_token: String,
    pub access_claims: TokenClaims,
    pub refresh_token: String,
    pub refresh_claims: TokenClaims,
}

pub struct TokenCodec {
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
    access_token_expiry: i64,
    refresh_token_expiry: i64,
    issuer: String,
    validation: Validation,
}

impl TokenCodec {
    pub fn new(config: &JwtSettings) -> Self {
        let mut validation = Validation::new(ALGORITHM);
        validation.set_issuer(&[&config.issuer]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);
        // Expiry is checked against `now < exp` after decoding
        validation.leeway = 0;

        Self {
            access_encoding: EncodingKey::from_secret(config.access_secret.as_bytes()),
            access_decoding: DecodingKey::from_secret(config.access_secret.as_bytes()),
            refresh_encoding: EncodingKey::from_secret(config.refresh_secret.as_bytes()),
            refresh_decoding: DecodingKey::from_secret(config.refresh_secret.as_bytes()),
            access_token_expiry: config.access_token_expiry,
            refresh_token_expiry: config.refresh_token_expiry,
            issuer: config.issuer.clone(),
            validation,
        }
    }

    /// Generate a new access token for a user
    pub fn issue_access(&self, user: &User) -> Result<(String, TokenClaims), AppError> {
        let claims = TokenClaims::new(
            user,
            None,
            Utc::now().timestamp(),
            self.access_token_expiry,
            &self.issuer,
        );
        let token = encode(&Header::new(ALGORITHM), &claims, &self.access_encoding)?;
        Ok((token, claims))
    }

    /// Generate a new refresh token for a user.
    ///
    /// With no family (a login) a fresh random family id is created; otherwise
    /// the token joins the given family (a rotation). The jti is always new.
    pub fn issue_refresh(
        &self,
        user: &User,
        family: Option<&str>,
    ) -> Result<(String, TokenClaims), AppError> {
        let family = match family.filter(|f| !f.is_empty()) {
            Some(family) => family.to_string(),
            None => Uuid::new_v4().to_string(),
        };
        let claims = TokenClaims::new(
            user,
            Some(family),
            Utc::now().timestamp(),
            self.refresh_token_expiry,
            &self.issuer,
        );
        let token = encode(&Header::new(ALGORITHM), &claims, &self.refresh_encoding)?;
        Ok((token, claims))
    }

    /// Issue an access token and a refresh token bound to `family`
    /// (or to a new family when `None`)
    pub fn issue_pair(&self, user: &User, family: Option<&str>) -> Result<IssuedTokens, AppError> {
        let (refresh_token, refresh_claims) = self.issue_refresh(user, family)?;
        let (access_token, access_claims) = self.issue_access(user)?;
        Ok(IssuedTokens {
            access_token,
            access_claims,
            refresh_token,
            refresh_claims,
        })
    }

    pub fn decode_access(&self, token: &str) -> Result<TokenClaims, DecodeError> {
        self.decode_with(token, &self.access_decoding)
    }

    pub fn decode_refresh(&self, token: &str) -> Result<TokenClaims, DecodeError> {
        let claims = self.decode_with(token, &self.refresh_decoding)?;
        if claims.family.as_deref().map_or(true, str::is_empty) {
            return Err(DecodeError::new(
                DecodeFailureReason::Malformed,
                Some(claims),
                "refresh token carries no family",
            ));
        }
        Ok(claims)
    }

    fn decode_with(&self, token: &str, key: &DecodingKey) -> Result<TokenClaims, DecodeError> {
        let claims = decode::<TokenClaims>(token, key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                let reason = classify(e.kind());
                DecodeError::new(reason, peek_claims(token), e.to_string())
            })?;

        if claims.is_expired_at(Utc::now().timestamp()) {
            return Err(DecodeError::new(
                DecodeFailureReason::Expired,
                Some(claims),
                "token reached its expiry instant",
            ));
        }

        Ok(claims)
    }
}

fn classify(kind: &ErrorKind) -> DecodeFailureReason {
    match kind {
        ErrorKind::ExpiredSignature => DecodeFailureReason::Expired,
        ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => {
            DecodeFailureReason::InvalidSignature
        }
        ErrorKind::InvalidToken
        | ErrorKind::Base64(_)
        | ErrorKind::Json(_)
        | ErrorKind::Utf8(_)
        | ErrorKind::InvalidIssuer
        | ErrorKind::InvalidAudience
        | ErrorKind::InvalidSubject
        | ErrorKind::ImmatureSignature
        | ErrorKind::MissingRequiredClaim(_) => DecodeFailureReason::Malformed,
        _ => DecodeFailureReason::Unhandled,
    }
}

/// Reads the payload without verifying anything. Only for logging.
fn peek_claims(token: &str) -> Option<TokenClaims> {
    let mut validation = Validation::new(ALGORITHM);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.required_spec_claims.clear();

    decode::<TokenClaims>(token, &DecodingKey::from_secret(&[]), &validation)
        .ok()
        .map(|data| data.claims)
}
