use serde_json::Value;
use tracing::{debug, warn};

use crate::claims::TokenClaims;
use crate::config::{ConfigError, KeycloakSettings};
use crate::error::AuthError;
use crate::validator::TokenValidator;

/// Online validator: asks the realm's introspection endpoint about every token.
///
/// Sees revocations immediately, at the price of one round-trip per request
/// and a hard dependency on the provider being up.
pub struct IntrospectionTokenValidator {
    client: reqwest::Client,
    introspection_uri: String,
    client_id: String,
    client_secret: String,
}

impl IntrospectionTokenValidator {
    /// Create a validator for the configured realm.
    ///
    /// Fails with [`ConfigError::MissingClientSecret`] when the settings carry
    /// no client secret.
    pub fn new(settings: &KeycloakSettings) -> Result<Self, ConfigError> {
        let client = settings.http_client()?;
        Self::with_client(settings, client)
    }

    /// Same as [`new`](Self::new) but reuses an existing HTTP client.
    pub fn with_client(
        settings: &KeycloakSettings,
        client: reqwest::Client,
    ) -> Result<Self, ConfigError> {
        let client_secret = settings
            .client_secret
            .clone()
            .filter(|secret| !secret.is_empty())
            .ok_or(ConfigError::MissingClientSecret)?;

        Ok(Self {
            client,
            introspection_uri: settings.introspection_uri(),
            client_id: settings.client_id.clone(),
            client_secret,
        })
    }

    pub fn introspection_uri(&self) -> &str {
        &self.introspection_uri
    }
}

impl TokenValidator for IntrospectionTokenValidator {
    async fn validate(&self, token: &str) -> Result<TokenClaims, AuthError> {
        let form = [
            ("token", token),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
        ];

        let response = self
            .client
            .post(&self.introspection_uri)
            .form(&form)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "Introspection request failed");
                AuthError::unavailable(format!("Introspection request failed: {e}"))
            })?;

        let response = response.error_for_status().map_err(|e| {
            warn!(error = %e, "Introspection endpoint returned an error");
            AuthError::unavailable(format!("Introspection request failed: {e}"))
        })?;

        let payload: Value = response.json().await.map_err(|e| {
            AuthError::unavailable(format!("Failed to parse introspection response: {e}"))
        })?;

        if !payload.get("active").and_then(Value::as_bool).unwrap_or(false) {
            debug!("Introspection reports an inactive token");
            return Err(AuthError::invalid("Token is not active"));
        }

        let claims = TokenClaims::from_payload(payload)?;
        debug!(sub = %claims.sub(), "Token introspected");
        Ok(claims)
    }
}
