/// Audit trail for tokens and sessions
///
/// Records token creation and use, and session login/logout/refresh/password
/// changes, under the `audit` tracing target. Request path and client address
/// come from the enclosing request span opened by `LoggerMiddleware`.

use crate::auth::TokenClaims;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenEventType {
    Create,
    Use,
}

impl TokenEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenEventType::Create => "token:create",
            TokenEventType::Use => "token:use",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEventType {
    Login,
    Logout,
    Refresh,
    PasswordUpdate,
}

impl SessionEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionEventType::Login => "session:login",
            SessionEventType::Logout => "session:logout",
            SessionEventType::Refresh => "session:refresh",
            SessionEventType::PasswordUpdate => "session:password-update",
        }
    }
}

/// Which kind of token a `token:*` event is about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::Access => "access",
            TokenKind::Refresh => "refresh",
        }
    }
}

pub fn log_token_event(
    success: bool,
    event: TokenEventType,
    kind: TokenKind,
    claims: Option<&TokenClaims>,
) {
    match claims {
        Some(token) => {
            tracing::info!(
                target: "audit",
                event = event.as_str(),
                success,
                token.kind = kind.as_str(),
                token.sub = %token.sub,
                token.is_admin = token.is_admin,
                token.jti = %token.jti,
                token.issuer = %token.iss,
                token.issued_at = token.iat,
                token.expires_at = token.exp,
                token.family = token.family.as_deref().unwrap_or(""),
                "Token event"
            );
        }
        None => {
            tracing::info!(
                target: "audit",
                event = event.as_str(),
                success,
                token.kind = kind.as_str(),
                token = "nil",
                "Token event"
            );
        }
    }
}

/// Logs creation of a freshly issued access/refresh pair
pub fn log_token_pair_created(access: &TokenClaims, refresh: &TokenClaims) {
    log_token_event(true, TokenEventType::Create, TokenKind::Refresh, Some(refresh));
    log_token_event(true, TokenEventType::Create, TokenKind::Access, Some(access));
}

pub fn log_session_event(success: bool, event: SessionEventType, username: &str) {
    tracing::info!(
        target: "audit",
        event = event.as_str(),
        success,
        target_user = username,
        "Session event"
    );
}
