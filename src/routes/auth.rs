/// Authentication Routes
///
/// Login, token refresh, logout and password update. Handlers only move data
/// between JSON and `AuthService`; failures are rendered by `AppError`.

use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};

use crate::auth::{AuthService, AuthenticatedUser, IssuedTokens};
use crate::error::AppError;

#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Deserialize)]
pub struct UpdatePasswordRequest {
    pub old_password: String,
    pub new_password: String,
}

/// Body of every successful call that hands out a token pair
#[derive(Serialize)]
pub struct TokenPairResponse {
    pub status: &'static str,
    pub access_token: String,
    pub refresh_token: String,
    /// Access-token lifetime in seconds
    pub expires_in: i64,
}

impl From<IssuedTokens> for TokenPairResponse {
    fn from(issued: IssuedTokens) -> Self {
        Self {
            status: "ok",
            expires_in: issued.access_claims.exp - issued.access_claims.iat,
            access_token: issued.access_token,
            refresh_token: issued.refresh_token,
        }
    }
}

/// POST /auth/login
///
/// # Errors
/// - 400: malformed body
/// - 401: `invalid-credentials`, `username-invalid`
pub async fn login(
    form: web::Json<LoginRequest>,
    service: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let issued = service.login(&form.username, &form.password).await?;
    Ok(HttpResponse::Ok().json(TokenPairResponse::from(issued)))
}

/// POST /auth/refresh
///
/// # Errors
/// - 400: malformed body
/// - 401: `expired` (retry by logging in), `invalid-signature`,
///   `token-invalid`, `token-reuse`
pub async fn refresh(
    form: web::Json<RefreshRequest>,
    service: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let issued = service.refresh(&form.refresh_token).await?;
    Ok(HttpResponse::Ok().json(TokenPairResponse::from(issued)))
}

/// POST /auth/logout (bearer)
pub async fn logout(
    identity: AuthenticatedUser,
    form: web::Json<RefreshRequest>,
    service: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    service.logout(&identity, &form.refresh_token).await?;
    Ok(HttpResponse::NoContent().finish())
}

/// POST /auth/update-password (bearer)
///
/// Returns a fresh pair; every other session of the user is revoked.
///
/// # Errors
/// - 400: `password-criteria-unmet`
/// - 401: `invalid-password`
pub async fn update_password(
    identity: AuthenticatedUser,
    form: web::Json<UpdatePasswordRequest>,
    service: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let issued = service
        .update_password(&identity, &form.old_password, &form.new_password)
        .await?;
    Ok(HttpResponse::Ok().json(TokenPairResponse::from(issued)))
}
