use session_guard::auth::{AuthService, SessionAuthenticator, TokenCodec};
use session_guard::configuration::get_configuration;
use session_guard::startup::run;
use session_guard::store::PgTokenStore;
use session_guard::telemetry::init_telemetry;
use session_guard::users::PgUserStore;
use sqlx::postgres::PgPoolOptions;
use std::net::TcpListener;
use std::sync::Arc;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let configuration = match get_configuration() {
        Ok(config) => config,
        Err(e) => {
            init_telemetry("info");
            tracing::error!("Failed to read configuration: {}", e);
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "Configuration error",
            ));
        }
    };

    init_telemetry(&configuration.log.filter);
    tracing::info!("Configuration loaded successfully");

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&configuration.database.connection_string())
        .await
        .map_err(|e| {
            tracing::error!("Failed to create connection pool: {}", e);
            std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "Database connection error",
            )
        })?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to run migrations: {}", e);
            std::io::Error::new(std::io::ErrorKind::Other, "Migration error")
        })?;

    let codec = Arc::new(TokenCodec::new(&configuration.jwt));
    let service = AuthService::new(
        codec.clone(),
        Arc::new(PgTokenStore::new(pool.clone())),
        Arc::new(PgUserStore::new(pool)),
        configuration.auth.bcrypt_cost,
    )
    .map_err(|e| {
        tracing::error!("Failed to build auth service: {}", e);
        std::io::Error::new(std::io::ErrorKind::Other, "Startup error")
    })?;
    let authenticator = Arc::new(SessionAuthenticator::new(codec));

    let address = format!(
        "{}:{}",
        configuration.application.host, configuration.application.port
    );
    let listener = TcpListener::bind(&address)?;
    tracing::info!("Server listening on: {}", address);

    run(listener, Arc::new(service), authenticator)?.await
}
