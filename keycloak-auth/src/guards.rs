use std::sync::Arc;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;

use crate::authenticator::Authenticator;
use crate::error::AuthError;
use crate::extractor::authenticate_parts;

/// Route-level access requirements: roles (realm or client-scoped) and scopes.
///
/// Used with [`require_access`] through `axum::middleware::from_fn_with_state`.
/// A request passes only if it authenticates and holds every required role
/// and scope; the validated claims are then stored in the request extensions
/// so the `TokenClaims` extractor does not validate the token a second time.
///
/// # Example
///
/// ```ignore
/// let admin = AccessGuard::new(authenticator.clone()).with_roles(["admin"]);
///
/// let app = Router::new()
///     .route("/api/admin", get(admin_handler))
///     .route_layer(middleware::from_fn_with_state(admin, require_access))
///     .with_state(state);
/// ```
#[derive(Clone)]
pub struct AccessGuard {
    authenticator: Arc<Authenticator>,
    roles: Arc<[String]>,
    client_id: Option<Arc<str>>,
    scopes: Arc<[String]>,
}

impl AccessGuard {
    /// Guard that only requires a valid token.
    pub fn new(authenticator: Arc<Authenticator>) -> Self {
        Self {
            authenticator,
            roles: Arc::from([]),
            client_id: None,
            scopes: Arc::from([]),
        }
    }

    /// Require every role in `roles`.
    pub fn with_roles(mut self, roles: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.roles = roles.into_iter().map(Into::into).collect();
        self
    }

    /// Check roles of `resource_access.{client_id}` instead of realm roles.
    pub fn for_client(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(Arc::from(client_id.into()));
        self
    }

    /// Require every scope in `scopes`.
    pub fn with_scopes(mut self, scopes: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    pub fn required_roles(&self) -> &[String] {
        &self.roles
    }

    pub fn required_scopes(&self) -> &[String] {
        &self.scopes
    }

    pub fn client_id(&self) -> Option<&str> {
        self.client_id.as_deref()
    }
}

/// Middleware enforcing an [`AccessGuard`].
pub async fn require_access(
    State(guard): State<AccessGuard>,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let (mut parts, body) = request.into_parts();

    let claims = authenticate_parts(&parts, &guard.authenticator).await?;
    guard
        .authenticator
        .require_roles(&claims, guard.roles.iter(), guard.client_id())?;
    guard
        .authenticator
        .require_scopes(&claims, guard.scopes.iter())?;

    parts.extensions.insert(claims);
    Ok(next.run(Request::from_parts(parts, body)).await)
}
