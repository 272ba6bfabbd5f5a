use sqlx::postgres::PgPoolOptions;
use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;

use tokenward::auth::{AuthService, BcryptHasher, GoogleIdTokenValidator, TokenIssuer};
use tokenward::configuration::get_configuration;
use tokenward::db::{PgRevocationLedger, PgUserStore};
use tokenward::startup::run;
use tokenward::telemetry::init_telemetry;

const REVOCATION_PURGE_INTERVAL: Duration = Duration::from_secs(60 * 60);
const IDENTITY_PROVIDER_TIMEOUT: Duration = Duration::from_secs(10);

fn startup_error(
    kind: std::io::ErrorKind,
    message: &'static str,
    detail: impl std::fmt::Display,
) -> std::io::Error {
    tracing::error!(error = %detail, "{}", message);
    std::io::Error::new(kind, message)
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let configuration = match get_configuration() {
        Ok(config) => config,
        Err(e) => {
            // Logging is not configured yet.
            eprintln!("Failed to read configuration: {}", e);
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "Configuration error",
            ));
        }
    };

    init_telemetry(&configuration.log.level);
    tracing::info!(settings = ?configuration, "Configuration loaded");

    let pool = PgPoolOptions::new()
        .max_connections(configuration.database.max_connections)
        .connect(&configuration.database.connection_string())
        .await
        .map_err(|e| {
            startup_error(
                std::io::ErrorKind::ConnectionRefused,
                "Failed to create connection pool",
                e,
            )
        })?;
    tracing::info!("Database connection pool created");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|e| startup_error(std::io::ErrorKind::Other, "Failed to run migrations", e))?;

    let tokens = TokenIssuer::new(&configuration.jwt)
        .map_err(|e| startup_error(std::io::ErrorKind::InvalidInput, "Invalid JWT settings", e))?;

    let http_client = reqwest::Client::builder()
        .timeout(IDENTITY_PROVIDER_TIMEOUT)
        .build()
        .map_err(|e| startup_error(std::io::ErrorKind::Other, "Failed to build HTTP client", e))?;

    let auth = AuthService::new(
        Arc::new(PgUserStore::new(pool.clone())),
        Arc::new(PgRevocationLedger::new(pool)),
        Arc::new(BcryptHasher::new(configuration.auth.bcrypt_cost)),
        tokens,
        Arc::new(GoogleIdTokenValidator::new(
            configuration.google.tokeninfo_url.clone(),
            http_client,
        )),
        configuration.google.client_id.clone(),
    )
    .map_err(|e| startup_error(std::io::ErrorKind::Other, "Failed to build auth service", e))?;

    spawn_revocation_purge(auth.clone());

    let address = configuration.application.address();
    let listener = TcpListener::bind(&address)?;
    tracing::info!(address = %address, "Server listening");

    run(listener, auth)?.await
}

fn spawn_revocation_purge(auth: AuthService) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(REVOCATION_PURGE_INTERVAL);
        loop {
            interval.tick().await;
            match auth.purge_expired_revocations().await {
                Ok(purged) => tracing::debug!(purged, "Revocation ledger purged"),
                Err(e) => tracing::warn!(error = %e, "Revocation ledger purge failed"),
            }
        }
    });
}
