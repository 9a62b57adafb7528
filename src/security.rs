/// Security events
///
/// Structured events for outcomes that may indicate an attack: refresh-token
/// reuse, tokens with bad signatures, logins to unknown usernames and so on.
/// They are emitted under the `security` tracing target with a numeric score,
/// independently of the HTTP response the caller receives.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SecurityScore {
    Low = 1,
    Medium = 5,
    High = 10,
    Critical = 15,
}

impl SecurityScore {
    pub fn value(self) -> u8 {
        self as u8
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityEvent {
    /// An already-rotated refresh token was presented again
    JwtReuse,
    /// A correctly signed refresh token with no matching record
    JwtUnknown,
    /// A correctly signed token whose subject does not resolve to a user
    JwtUnknownSubject,
    InvalidTokenSignature,
    MalformedToken,
    LoginToUnknownUsername,
    LoginInvalidUsername,
    FailedLogin,
    FailedPasswordUpdate,
    /// Logout with a refresh token that belongs to someone else
    LogoutSubjectMismatch,
}

impl SecurityEvent {
    pub fn name(&self) -> &'static str {
        match self {
            SecurityEvent::JwtReuse => "jwt-reuse",
            SecurityEvent::JwtUnknown => "jwt-unknown",
            SecurityEvent::JwtUnknownSubject => "jwt-unknown-subject",
            SecurityEvent::InvalidTokenSignature => "invalid-signature-token-use",
            SecurityEvent::MalformedToken => "malformed-token-use",
            SecurityEvent::LoginToUnknownUsername => "login-to-unknown-username",
            SecurityEvent::LoginInvalidUsername => "login-invalid-username",
            SecurityEvent::FailedLogin => "failed-login",
            SecurityEvent::FailedPasswordUpdate => "failed-password-update",
            SecurityEvent::LogoutSubjectMismatch => "logout-subject-mismatch",
        }
    }

    /// Default severity for the event
    pub fn score(&self) -> SecurityScore {
        match self {
            SecurityEvent::JwtReuse => SecurityScore::Critical,
            SecurityEvent::JwtUnknownSubject | SecurityEvent::LogoutSubjectMismatch => {
                SecurityScore::High
            }
            SecurityEvent::JwtUnknown | SecurityEvent::FailedPasswordUpdate => {
                SecurityScore::Medium
            }
            SecurityEvent::InvalidTokenSignature
            | SecurityEvent::MalformedToken
            | SecurityEvent::LoginToUnknownUsername
            | SecurityEvent::LoginInvalidUsername
            | SecurityEvent::FailedLogin => SecurityScore::Low,
        }
    }
}

impl fmt::Display for SecurityEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Emit a security event. `target` names what was attacked, e.g.
/// `value=<jti>,type=jwt` or `value=<username>,type=login`.
pub fn log_security_event(event: SecurityEvent, target: &str) {
    let score = event.score();
    match score {
        SecurityScore::Critical | SecurityScore::High => {
            tracing::error!(
                target: "security",
                score = score.value(),
                event.name = event.name(),
                event.target = target,
                "Security event has happened"
            );
        }
        SecurityScore::Medium | SecurityScore::Low => {
            tracing::warn!(
                target: "security",
                score = score.value(),
                event.name = event.name(),
                event.target = target,
                "Security event has happened"
            );
        }
    }
}
