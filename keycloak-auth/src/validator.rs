use std::future::Future;

use crate::claims::TokenClaims;
use crate::config::{ConfigError, KeycloakSettings, ValidationMode};
use crate::error::AuthError;
use crate::introspection::IntrospectionTokenValidator;
use crate::jwt::JwksTokenValidator;

/// A strategy that turns a raw bearer token into trusted claims.
///
/// Implementations fail with [`AuthError::TokenExpired`],
/// [`AuthError::TokenInvalid`] or [`AuthError::ProviderUnavailable`].
///
/// # Example
///
/// ```ignore
/// struct AllowList(HashMap<String, serde_json::Value>);
///
/// impl TokenValidator for AllowList {
///     fn validate(&self, token: &str)
///         -> impl Future<Output = Result<TokenClaims, AuthError>> + Send
///     {
///         let result = match self.0.get(token) {
///             Some(payload) => TokenClaims::from_payload(payload.clone()),
///             None => Err(AuthError::TokenInvalid("Unknown token".into())),
///         };
///         std::future::ready(result)
///     }
/// }
/// ```
pub trait TokenValidator: Send + Sync {
    fn validate(
        &self,
        token: &str,
    ) -> impl Future<Output = Result<TokenClaims, AuthError>> + Send;
}

/// The validator selected by [`KeycloakSettings::validation_mode`].
pub enum ConfiguredValidator {
    Jwks(JwksTokenValidator),
    Introspection(IntrospectionTokenValidator),
}

impl ConfiguredValidator {
    /// Build the strategy named by the settings.
    ///
    /// Fails with [`ConfigError::MissingClientSecret`] when introspection is
    /// requested without a secret.
    pub fn from_settings(settings: &KeycloakSettings) -> Result<Self, ConfigError> {
        match settings.validation_mode {
            ValidationMode::Jwks => JwksTokenValidator::new(settings).map(Self::Jwks),
            ValidationMode::Introspection => {
                IntrospectionTokenValidator::new(settings).map(Self::Introspection)
            }
        }
    }
}

impl From<JwksTokenValidator> for ConfiguredValidator {
    fn from(validator: JwksTokenValidator) -> Self {
        Self::Jwks(validator)
    }
}

impl From<IntrospectionTokenValidator> for ConfiguredValidator {
    fn from(validator: IntrospectionTokenValidator) -> Self {
        Self::Introspection(validator)
    }
}

impl TokenValidator for ConfiguredValidator {
    async fn validate(&self, token: &str) -> Result<TokenClaims, AuthError> {
        match self {
            ConfiguredValidator::Jwks(v) => v.validate(token).await,
            ConfiguredValidator::Introspection(v) => v.validate(token).await,
        }
    }
}
