/// Middleware module
///
/// Bearer-token authentication for the protected `/auth` resources.

mod jwt_middleware;

pub use jwt_middleware::JwtMiddleware;
