use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::header::USER_AGENT,
    Error,
};
use futures::future::LocalBoxFuture;
use std::rc::Rc;
use std::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

/// Request logger middleware
///
/// Opens a span per request carrying a request id, method, path, client IP
/// and user agent. Everything logged while handling the request, audit and
/// security events included, is recorded inside that span.
pub struct LoggerMiddleware;

impl<S, B> Transform<S, ServiceRequest> for LoggerMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = LoggerMiddlewareService<S>;
    type Future = std::future::Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        std::future::ready(Ok(LoggerMiddlewareService {
            service: Rc::new(service),
        }))
    }
}

pub struct LoggerMiddlewareService<S> {
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for LoggerMiddlewareService<S>
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
        let start_time = Instant::now();
        let client_ip = req
            .connection_info()
            .realip_remote_addr()
            .unwrap_or("unknown")
            .to_string();
        let user_agent = req
            .headers()
            .get(USER_AGENT)
            .and_then(|h| h.to_str().ok())
            .unwrap_or("")
            .to_string();

        let span = tracing::info_span!(
            "http_request",
            request_id = %Uuid::new_v4(),
            method = %req.method(),
            path = %req.path(),
            client_ip = %client_ip,
            user_agent = %user_agent,
        );

        let service = self.service.clone();

        Box::pin(
            async move {
                tracing::debug!("Request started");

                let result = service.call(req).await;
                let elapsed_ms = start_time.elapsed().as_millis() as u64;

                match &result {
                    Ok(res) => tracing::info!(
                        status = res.status().as_u16(),
                        elapsed_ms,
                        "Request completed"
                    ),
                    Err(e) => tracing::info!(
                        status = e.as_response_error().status_code().as_u16(),
                        elapsed_ms,
                        "Request rejected"
                    ),
                }

                result
            }
            .instrument(span),
        )
    }
}
