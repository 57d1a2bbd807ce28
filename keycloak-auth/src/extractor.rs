use std::sync::Arc;

use axum::extract::{FromRef, FromRequestParts, OptionalFromRequestParts};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use tracing::{debug, warn};

use crate::authenticator::Authenticator;
use crate::claims::TokenClaims;
use crate::error::AuthError;
use crate::validator::TokenValidator;

/// Extract the credential from an `Authorization` header value.
///
/// Returns `None` unless the scheme is `Bearer` (case-insensitive) followed by
/// a non-empty credential.
fn bearer_credential(header_value: &str) -> Option<&str> {
    let (scheme, credential) = header_value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("Bearer") {
        return None;
    }
    let credential = credential.trim();
    (!credential.is_empty()).then_some(credential)
}

/// Extract the bearer token from request headers, without validating it.
pub fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(bearer_credential)
}

/// Authenticate a request.
///
/// Claims stored in the request extensions by an earlier
/// [`require_access`](crate::guards::require_access) are reused; otherwise
/// the bearer token is validated. A missing or non-`Bearer` header fails
/// with [`AuthError::TokenMissing`].
pub async fn authenticate_parts<V: TokenValidator>(
    parts: &Parts,
    authenticator: &Authenticator<V>,
) -> Result<TokenClaims, AuthError> {
    if let Some(claims) = parts.extensions.get::<TokenClaims>() {
        return Ok(claims.clone());
    }

    let claims = authenticator
        .authenticate(bearer_token(parts))
        .await
        .map_err(|e| {
            warn!(uri = %parts.uri, error = %e, "Authentication failed");
            e
        })?;

    debug!(uri = %parts.uri, sub = %claims.sub(), "Authenticated request");
    Ok(claims)
}

/// Axum extractor for `TokenClaims`.
///
/// The application state must provide an `Arc<Authenticator>` via `FromRef`.
///
/// # Example
///
/// ```ignore
/// async fn profile(claims: TokenClaims) -> impl IntoResponse {
///     format!("Hello, {}!", claims.sub())
/// }
/// ```
impl<S> FromRequestParts<S> for TokenClaims
where
    S: Send + Sync,
    Arc<Authenticator>: FromRef<S>,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let authenticator: Arc<Authenticator> = Arc::from_ref(state);
        authenticate_parts(parts, &authenticator).await
    }
}

/// Optional extractor for `TokenClaims`.
///
/// - No `Authorization` header → `Ok(None)`
/// - Valid token → `Ok(Some(claims))`
/// - Anything else → the `AuthError`
impl<S> OptionalFromRequestParts<S> for TokenClaims
where
    S: Send + Sync,
    Arc<Authenticator>: FromRef<S>,
{
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &S,
    ) -> Result<Option<Self>, Self::Rejection> {
        if !parts.headers.contains_key(AUTHORIZATION) {
            return Ok(None);
        }

        let authenticator: Arc<Authenticator> = Arc::from_ref(state);
        authenticate_parts(parts, &authenticator).await.map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::bearer_credential;

    #[test]
    fn bearer_scheme_is_case_insensitive() {
        assert_eq!(bearer_credential("Bearer abc"), Some("abc"));
        assert_eq!(bearer_credential("bearer abc"), Some("abc"));
    }

    #[test]
    fn other_schemes_are_rejected() {
        assert_eq!(bearer_credential("Basic dXNlcjpwYXNz"), None);
        assert_eq!(bearer_credential("Bearer"), None);
        assert_eq!(bearer_credential("Bearer   "), None);
    }
}
