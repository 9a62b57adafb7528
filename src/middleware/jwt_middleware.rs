/// JWT Authentication Middleware
///
/// Validates the bearer access token from the Authorization header and
/// injects the caller's identity into request extensions. Handlers receive it
/// as an `AuthenticatedUser` argument.

use actix_web::{
    dev::{forward_ready, Payload, Service, ServiceRequest, ServiceResponse, Transform},
    http::header::AUTHORIZATION,
    Error, FromRequest, HttpMessage, HttpRequest,
};
use futures::future::LocalBoxFuture;
use std::future::{ready, Ready};
use std::rc::Rc;
use std::sync::Arc;

use crate::auth::{AuthenticatedUser, SessionAuthenticator};
use crate::error::{AppError, AuthError};

/// JWT middleware for protecting routes
pub struct JwtMiddleware {
    authenticator: Arc<SessionAuthenticator>,
}

impl JwtMiddleware {
    pub fn new(authenticator: Arc<SessionAuthenticator>) -> Self {
        Self { authenticator }
    }
}

impl<S, B> Transform<S, ServiceRequest> for JwtMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = JwtMiddlewareService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(JwtMiddlewareService {
            service: Rc::new(service),
            authenticator: self.authenticator.clone(),
        }))
    }
}

pub struct JwtMiddlewareService<S> {
    service: Rc<S>,
    authenticator: Arc<SessionAuthenticator>,
}

impl<S, B> Service<ServiceRequest> for JwtMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let authorization = req
            .headers()
            .get(AUTHORIZATION)
            .and_then(|h| h.to_str().ok());

        match self.authenticator.authenticate(authorization) {
            Ok(identity) => {
                req.extensions_mut().insert(identity);
                let service = self.service.clone();
                Box::pin(async move { service.call(req).await })
            }
            Err(e) => Box::pin(async move { Err(Error::from(e)) }),
        }
    }
}

/// Reads the identity placed by `JwtMiddleware`. On a route without the
/// middleware there is none, and the request is rejected as `token-invalid`.
impl FromRequest for AuthenticatedUser {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(
            req.extensions()
                .get::<AuthenticatedUser>()
                .cloned()
                .ok_or(AppError::Auth(AuthError::TokenInvalid)),
        )
    }
}
