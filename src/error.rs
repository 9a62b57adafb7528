/// Error Handling Module
///
/// Every failure in the service ends up as one of three kinds:
/// 1. `ValidationError` - malformed input, safe to echo back to the caller
/// 2. `AuthError` - an authentication outcome with a stable reason tag
/// 3. `Internal` - store/codec/config failures, logged with cause and call site,
///    surfaced to the caller only as a generic failure
///
/// Classification into HTTP responses happens exactly once, in the
/// `ResponseError` implementation at the bottom of this file.

use std::panic::Location;

use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use thiserror::Error;

/// ============================================================================
/// 1. DOMAIN-SPECIFIC ERROR TYPES
/// ============================================================================

/// Validation errors for request input
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{0}")]
    MalformedBody(String),
    #[error("{0} is empty")]
    EmptyField(&'static str),
    #[error("{0} is too short (minimum {1} characters)")]
    TooShort(&'static str, usize),
    #[error("{0} is too long (maximum {1} characters)")]
    TooLong(&'static str, usize),
    #[error("{0} contains characters that are not allowed")]
    InvalidCharacters(&'static str),
    #[error("password must contain a letter, a digit and a punctuation or symbol character")]
    PasswordCriteriaUnmet,
}

impl ValidationError {
    /// Machine-readable status string returned to the caller
    pub fn status_tag(&self) -> &'static str {
        match self {
            ValidationError::MalformedBody(_) => "malformed-body",
            ValidationError::PasswordCriteriaUnmet => "password-criteria-unmet",
            ValidationError::EmptyField(_)
            | ValidationError::TooShort(..)
            | ValidationError::TooLong(..)
            | ValidationError::InvalidCharacters(_) => "validation-failed",
        }
    }
}

/// Authentication outcomes. The reason tag is always safe to reveal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("Token has expired")]
    Expired,
    #[error("Token signature is invalid")]
    InvalidSignature,
    #[error("Token is invalid")]
    TokenInvalid,
    #[error("Refresh token has already been used")]
    TokenReuse,
    #[error("Invalid username or password")]
    InvalidCredentials,
    #[error("Username does not meet the username criteria")]
    UsernameInvalid,
    #[error("Old password does not match")]
    InvalidPassword,
}

impl AuthError {
    pub fn reason(&self) -> &'static str {
        match self {
            AuthError::Expired => "expired",
            AuthError::InvalidSignature => "invalid-signature",
            AuthError::TokenInvalid => "token-invalid",
            AuthError::TokenReuse => "token-reuse",
            AuthError::InvalidCredentials => "invalid-credentials",
            AuthError::UsernameInvalid => "username-invalid",
            AuthError::InvalidPassword => "invalid-password",
        }
    }

    /// Whether the client can recover without re-authenticating
    /// (an expired access token is fixed by calling refresh).
    pub fn is_retryable(&self) -> bool {
        matches!(self, AuthError::Expired)
    }
}

/// ============================================================================
/// 2. UNIFIED APPLICATION ERROR TYPE
/// ============================================================================

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("Internal error at {location}: {message}")]
    Internal {
        message: String,
        location: &'static Location<'static>,
    },
}

/// Closed classification consumed by the HTTP boundary
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorClass {
    Validation,
    Auth(AuthError),
    Internal,
}

impl AppError {
    /// Build an internal error, recording the caller's file and line.
    #[track_caller]
    pub fn internal(message: impl Into<String>) -> Self {
        AppError::Internal {
            message: message.into(),
            location: Location::caller(),
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            AppError::Validation(_) => ErrorClass::Validation,
            AppError::Auth(reason) => ErrorClass::Auth(*reason),
            AppError::Internal { .. } => ErrorClass::Internal,
        }
    }

    /// Returns the auth reason if this is an authentication failure
    pub fn auth_reason(&self) -> Option<AuthError> {
        match self {
            AppError::Auth(reason) => Some(*reason),
            _ => None,
        }
    }
}

// ============================================================================
// FROM IMPLEMENTATIONS
// ============================================================================

impl From<sqlx::Error> for AppError {
    #[track_caller]
    fn from(err: sqlx::Error) -> Self {
        let is_unique_violation = err
            .as_database_error()
            .and_then(|db_err| db_err.code())
            .map(|code| code == "23505")
            .unwrap_or(false);

        if is_unique_violation {
            AppError::internal(format!("Duplicate key on insert: {}", err))
        } else {
            AppError::internal(format!("Database error: {}", err))
        }
    }
}

impl From<jsonwebtoken::errors::Error> for AppError {
    #[track_caller]
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        AppError::internal(format!("Token encoding failed: {}", err))
    }
}

impl From<bcrypt::BcryptError> for AppError {
    #[track_caller]
    fn from(err: bcrypt::BcryptError) -> Self {
        AppError::internal(format!("Password hashing failed: {}", err))
    }
}

impl From<tokio::task::JoinError> for AppError {
    #[track_caller]
    fn from(err: tokio::task::JoinError) -> Self {
        AppError::internal(format!("Blocking task failed: {}", err))
    }
}

// ============================================================================
// 3. HTTP RESPONSE MAPPING
// ============================================================================

/// Error body: a short status string plus, for validation and auth failures,
/// a human-readable detail.
#[derive(Debug, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct ErrorResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ErrorResponse {
    pub fn new(status: impl Into<String>, detail: Option<String>) -> Self {
        Self {
            status: status.into(),
            detail,
        }
    }
}

/// Converts errors to HTTP responses with proper logging
pub trait ErrorHandler {
    fn error_response(&self) -> (StatusCode, ErrorResponse);
    fn log_error(&self);
}

impl ErrorHandler for AppError {
    fn error_response(&self) -> (StatusCode, ErrorResponse) {
        match self {
            AppError::Validation(e) => (
                StatusCode::BAD_REQUEST,
                ErrorResponse::new(e.status_tag(), Some(e.to_string())),
            ),
            AppError::Auth(reason) => (
                StatusCode::UNAUTHORIZED,
                ErrorResponse::new(reason.reason(), Some(reason.to_string())),
            ),
            AppError::Internal { .. } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorResponse::new("internal-server-error", None),
            ),
        }
    }

    fn log_error(&self) {
        match self {
            AppError::Validation(e) => {
                tracing::debug!(error = %e, "Validation error");
            }
            AppError::Auth(reason) => {
                tracing::info!(
                    reason = reason.reason(),
                    retryable = reason.is_retryable(),
                    "Authentication failed"
                );
            }
            AppError::Internal { message, location } => {
                tracing::error!(
                    error = %message,
                    call_site = %location,
                    "Internal error"
                );
            }
        }
    }
}

impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        self.log_error();
        let (status, body) = <Self as ErrorHandler>::error_response(self);
        HttpResponse::build(status).json(body)
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Auth(_) => StatusCode::UNAUTHORIZED,
            AppError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
