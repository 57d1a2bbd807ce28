//! Keycloak bearer-token authentication and authorization.
//!
//! A token goes through the [`Authenticator`], which hands it to a
//! [`TokenValidator`] strategy (offline [`JwksTokenValidator`] or online
//! [`IntrospectionTokenValidator`]), receives [`TokenClaims`] and can then
//! enforce roles and scopes. Every failure is an [`AuthError`] carrying its
//! HTTP status and a client-safe message.

pub mod authenticator;
pub mod claims;
pub mod config;
pub mod error;
pub mod extractor;
pub mod guards;
pub mod introspection;
pub mod jwks;
pub mod jwt;
pub mod loader;
pub mod validator;

// Re-export primary public types for convenience.
pub use authenticator::Authenticator;
pub use claims::{Audience, TokenClaims};
pub use config::{ConfigError, KeycloakSettings, ValidationMode};
pub use error::AuthError;
pub use extractor::{authenticate_parts, bearer_token};
pub use guards::{require_access, AccessGuard};
pub use introspection::IntrospectionTokenValidator;
pub use jwks::JwksCache;
pub use jwt::JwksTokenValidator;
pub use loader::SettingsLoader;
pub use validator::{ConfiguredValidator, TokenValidator};

pub mod prelude {
    //! Re-exports of the most commonly used types.
    pub use crate::{
        require_access, AccessGuard, AuthError, Authenticator, KeycloakSettings, SettingsLoader,
        TokenClaims, TokenValidator,
    };
}
