use std::collections::BTreeSet;

use tracing::debug;

use crate::claims::TokenClaims;
use crate::config::{ConfigError, KeycloakSettings};
use crate::error::AuthError;
use crate::validator::{ConfiguredValidator, TokenValidator};

/// Single entry point combining token validation with role and scope checks.
///
/// # Example
///
/// ```ignore
/// let authenticator = Authenticator::from_settings(&settings)?;
///
/// let claims = authenticator.authenticate(Some(token)).await?;
/// authenticator.require_roles(&claims, ["admin"], None)?;
/// authenticator.require_scopes(&claims, ["orders:write"])?;
/// ```
pub struct Authenticator<V: TokenValidator = ConfiguredValidator> {
    validator: V,
}

impl Authenticator {
    /// Build the authenticator with the strategy named by
    /// [`KeycloakSettings::validation_mode`].
    pub fn from_settings(settings: &KeycloakSettings) -> Result<Self, ConfigError> {
        Ok(Self::new(ConfiguredValidator::from_settings(settings)?))
    }
}

impl<V: TokenValidator> Authenticator<V> {
    pub fn new(validator: V) -> Self {
        Self { validator }
    }

    pub fn validator(&self) -> &V {
        &self.validator
    }

    /// Validate a bearer token and return its claims.
    ///
    /// An absent or empty token fails with [`AuthError::TokenMissing`] before
    /// any validator work; other failures come from the validator unchanged.
    pub async fn authenticate(&self, token: Option<&str>) -> Result<TokenClaims, AuthError> {
        match token {
            Some(token) if !token.is_empty() => self.validator.validate(token).await,
            _ => Err(AuthError::TokenMissing),
        }
    }

    /// Fail with [`AuthError::InsufficientPermissions`] unless the claims hold
    /// every role in `required`.
    ///
    /// With a non-empty `client_id`, only `resource_access.{client_id}.roles`
    /// counts; otherwise only realm roles do. The error lists the missing roles sorted.
    pub fn require_roles<I, R>(
        &self,
        claims: &TokenClaims,
        required: I,
        client_id: Option<&str>,
    ) -> Result<(), AuthError>
    where
        I: IntoIterator<Item = R>,
        R: AsRef<str>,
    {
        let missing = missing_from(claims.effective_roles(client_id), required);
        if missing.is_empty() {
            return Ok(());
        }
        debug!(sub = %claims.sub(), ?client_id, ?missing, "Missing required roles");
        Err(AuthError::InsufficientPermissions(format!(
            "Missing required roles: {}",
            join(&missing)
        )))
    }

    /// Fail with [`AuthError::InsufficientPermissions`] unless the claims hold
    /// every scope in `required`.
    pub fn require_scopes<I, S>(&self, claims: &TokenClaims, required: I) -> Result<(), AuthError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let missing = missing_from(claims.scopes(), required);
        if missing.is_empty() {
            return Ok(());
        }
        debug!(sub = %claims.sub(), ?missing, "Missing required scopes");
        Err(AuthError::InsufficientPermissions(format!(
            "Missing required scopes: {}",
            join(&missing)
        )))
    }
}

/// Required entries not present in `held`, sorted and deduplicated.
fn missing_from<I, R>(held: &BTreeSet<String>, required: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = R>,
    R: AsRef<str>,
{
    required
        .into_iter()
        .filter(|r| !held.contains(r.as_ref()))
        .map(|r| r.as_ref().to_owned())
        .collect()
}

fn join(items: &BTreeSet<String>) -> String {
    items
        .iter()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}
