use std::sync::Arc;

use keycloak_auth::{Authenticator, ConfiguredValidator, SettingsLoader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod routes;

const DEFAULT_BIND: &str = "0.0.0.0:8000";

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let settings = SettingsLoader::new().load()?;
    info!(
        issuer = %settings.issuer(),
        mode = ?settings.validation_mode,
        audience_check = settings.audience_check_enabled(),
        "Keycloak settings loaded"
    );

    let authenticator = Arc::new(Authenticator::from_settings(&settings)?);

    // Prime the key cache; a failure here is not fatal, lookups retry.
    if let ConfiguredValidator::Jwks(validator) = authenticator.validator() {
        if let Some(jwks) = validator.jwks() {
            if let Err(e) = jwks.warm_up().await {
                warn!(error = %e, "Could not prefetch JWKS");
            }
        }
    }

    let app = routes::router(authenticator);

    let bind = std::env::var("DEMO_BIND").unwrap_or_else(|_| DEFAULT_BIND.to_string());
    let listener = tokio::net::TcpListener::bind(&bind).await?;
    info!(addr = %listener.local_addr()?, "Listening");
    axum::serve(listener, app).await?;

    Ok(())
}
