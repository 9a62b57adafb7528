/// Authentication module
///
/// Credential verification, token issuance and decoding, refresh-token
/// rotation with reuse detection, and the access-token gate.

mod claims;
mod credentials;
mod jwt;
mod password;
mod rotation;
mod service;
mod session;

pub use claims::{AuthenticatedUser, TokenClaims};
pub use credentials::CredentialVerifier;
pub use jwt::{DecodeError, DecodeFailureReason, IssuedTokens, TokenCodec};
pub use password::{hash_password, verify_password};
pub use rotation::RotationEngine;
pub use service::AuthService;
pub use session::SessionAuthenticator;
