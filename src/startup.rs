use actix_web::dev::Server;
use actix_web::{web, App, HttpServer};
use std::net::TcpListener;
use std::sync::Arc;

use crate::auth::{AuthService, SessionAuthenticator};
use crate::error::{AppError, ValidationError};
use crate::logger::LoggerMiddleware;
use crate::middleware::JwtMiddleware;
use crate::routes::{health_check, login, logout, refresh, update_password};

pub fn run(
    listener: TcpListener,
    service: Arc<AuthService>,
    authenticator: Arc<SessionAuthenticator>,
) -> Result<Server, std::io::Error> {
    let service = web::Data::from(service);

    let server = HttpServer::new(move || {
        // Unparseable or incomplete JSON bodies become `malformed-body`
        let json_config = web::JsonConfig::default().error_handler(|err, _req| {
            AppError::from(ValidationError::MalformedBody(err.to_string())).into()
        });

        App::new()
            .wrap(LoggerMiddleware)
            .app_data(service.clone())
            .app_data(json_config)
            .route("/health_check", web::get().to(health_check))
            .service(
                web::scope("/auth")
                    .route("/login", web::post().to(login))
                    .route("/refresh", web::post().to(refresh))
                    .service(
                        web::resource("/logout")
                            .wrap(JwtMiddleware::new(authenticator.clone()))
                            .route(web::post().to(logout)),
                    )
                    .service(
                        web::resource("/update-password")
                            .wrap(JwtMiddleware::new(authenticator.clone()))
                            .route(web::post().to(update_password)),
                    ),
            )
    })
    .listen(listener)?
    .run();

    Ok(server)
}
