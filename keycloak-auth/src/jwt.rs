use std::sync::Arc;

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, decode_header, DecodingKey, Validation};
use tracing::{debug, warn};

use crate::claims::TokenClaims;
use crate::config::{ConfigError, KeycloakSettings};
use crate::error::AuthError;
use crate::jwks::JwksCache;
use crate::validator::TokenValidator;

/// Source of decoding keys: either a JWKS cache or a static key for testing.
enum KeySource {
    Jwks(Arc<JwksCache>),
    Static(DecodingKey),
}

/// Offline validator: verifies the token signature locally with the realm's
/// published keys.
///
/// Checks performed:
/// 1. Header decoding and algorithm allow-list
/// 2. Key lookup by `kid` (JWKS cache) or the static key
/// 3. Signature, `exp` and `nbf`
/// 4. `iss` equals the realm issuer
/// 5. `aud` contains the configured audience, only when one is configured
///
/// Revocation is not observed: a revoked token stays valid until `exp`.
/// Use [`IntrospectionTokenValidator`](crate::IntrospectionTokenValidator)
/// when that window matters.
pub struct JwksTokenValidator {
    key_source: KeySource,
    settings: KeycloakSettings,
    issuer: String,
}

impl JwksTokenValidator {
    /// Create a validator with its own JWKS cache for the configured realm.
    pub fn new(settings: &KeycloakSettings) -> Result<Self, ConfigError> {
        let jwks = Arc::new(JwksCache::new(settings)?);
        Ok(Self::with_cache(jwks, settings.clone()))
    }

    /// Create a validator backed by a shared JWKS cache.
    pub fn with_cache(jwks: Arc<JwksCache>, settings: KeycloakSettings) -> Self {
        Self::build(KeySource::Jwks(jwks), settings)
    }

    /// Create a validator with a static decoding key (useful for testing).
    pub fn new_with_static_key(key: DecodingKey, settings: KeycloakSettings) -> Self {
        Self::build(KeySource::Static(key), settings)
    }

    fn build(key_source: KeySource, settings: KeycloakSettings) -> Self {
        if !settings.audience_check_enabled() {
            warn!(
                realm = %settings.realm,
                "No audience configured: audience check disabled"
            );
        }
        Self {
            key_source,
            issuer: settings.issuer(),
            settings,
        }
    }

    pub fn settings(&self) -> &KeycloakSettings {
        &self.settings
    }

    /// The JWKS cache, when this validator uses one.
    pub fn jwks(&self) -> Option<&Arc<JwksCache>> {
        match &self.key_source {
            KeySource::Jwks(jwks) => Some(jwks),
            KeySource::Static(_) => None,
        }
    }

    fn validation(&self, algorithm: jsonwebtoken::Algorithm) -> Validation {
        // Only the token's own algorithm, already checked against the allow-list.
        let mut validation = Validation::new(algorithm);
        validation.leeway = self.settings.leeway_secs;
        validation.validate_exp = true;
        validation.validate_nbf = true;
        validation.set_required_spec_claims(&["exp", "sub"]);
        validation.set_issuer(&[&self.issuer]);
        match self.settings.audience.as_deref() {
            Some(audience) if !audience.is_empty() => validation.set_audience(&[audience]),
            _ => validation.validate_aud = false,
        }
        validation
    }
}

impl TokenValidator for JwksTokenValidator {
    async fn validate(&self, token: &str) -> Result<TokenClaims, AuthError> {
        let header = decode_header(token).map_err(|e| {
            debug!(error = %e, "Failed to decode JWT header");
            AuthError::invalid("Malformed token")
        })?;

        let algorithm = header.alg;
        if !self.settings.allowed_algorithms.contains(&algorithm) {
            warn!(?algorithm, "Rejected JWT with disallowed algorithm");
            return Err(AuthError::invalid("The specified alg value is not allowed"));
        }

        let decoding_key = match &self.key_source {
            KeySource::Static(key) => key.clone(),
            KeySource::Jwks(jwks) => jwks.key_for(header.kid.as_deref()).await?,
        };

        let token_data =
            decode::<serde_json::Value>(token, &decoding_key, &self.validation(algorithm))
                .map_err(|e| {
                    let err = map_jwt_error(e.kind());
                    warn!(error = %e, "JWT validation failed");
                    err
                })?;

        let claims = TokenClaims::from_payload(token_data.claims)?;
        debug!(sub = %claims.sub(), "JWT validated");
        Ok(claims)
    }
}

/// Map a `jsonwebtoken` failure to the taxonomy with a fixed, client-safe reason.
fn map_jwt_error(kind: &ErrorKind) -> AuthError {
    match kind {
        ErrorKind::ExpiredSignature => AuthError::TokenExpired,
        ErrorKind::InvalidIssuer => AuthError::invalid("Invalid issuer"),
        ErrorKind::InvalidAudience => AuthError::invalid("Invalid audience"),
        ErrorKind::InvalidSignature => AuthError::invalid("Signature verification failed"),
        ErrorKind::ImmatureSignature => AuthError::invalid("The token is not yet valid (nbf)"),
        ErrorKind::InvalidAlgorithm => {
            AuthError::invalid("The specified alg value is not allowed")
        }
        ErrorKind::MissingRequiredClaim(claim) => {
            AuthError::invalid(format!("Token is missing required claim '{claim}'"))
        }
        _ => AuthError::invalid("Malformed token"),
    }
}
