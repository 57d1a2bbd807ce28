use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

/// Authentication and authorization failures.
///
/// Every fallible operation of the validators and of the
/// [`Authenticator`](crate::Authenticator) fails with exactly one of these
/// kinds. Each kind carries its protocol status ([`status_code`](Self::status_code))
/// and a message that is safe to show to clients ([`detail`](Self::detail)).
/// The `Display` output may contain internal causes and is meant for logs only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// No bearer token was presented.
    TokenMissing,

    /// The token's `exp` claim is in the past.
    TokenExpired,

    /// The token is malformed, badly signed, or carries mismatching claims.
    /// The payload is a safe, fixed reason chosen by this crate.
    TokenInvalid(String),

    /// The token is valid but lacks required roles or scopes.
    InsufficientPermissions(String),

    /// The identity provider could not be reached or answered garbage.
    /// The payload is the internal cause and is never sent to clients.
    ProviderUnavailable(String),
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::TokenMissing => write!(f, "Token missing"),
            AuthError::TokenExpired => write!(f, "Token expired"),
            AuthError::TokenInvalid(reason) => write!(f, "Invalid token: {reason}"),
            AuthError::InsufficientPermissions(msg) => {
                write!(f, "Insufficient permissions: {msg}")
            }
            AuthError::ProviderUnavailable(cause) => {
                write!(f, "Identity provider unavailable: {cause}")
            }
        }
    }
}

impl std::error::Error for AuthError {}

impl AuthError {
    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        AuthError::TokenInvalid(reason.into())
    }

    pub(crate) fn unavailable(cause: impl Into<String>) -> Self {
        AuthError::ProviderUnavailable(cause.into())
    }

    /// Protocol status associated with this failure.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::TokenMissing | AuthError::TokenExpired | AuthError::TokenInvalid(_) => {
                StatusCode::UNAUTHORIZED
            }
            AuthError::InsufficientPermissions(_) => StatusCode::FORBIDDEN,
            AuthError::ProviderUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Client-safe message.
    pub fn detail(&self) -> &str {
        match self {
            AuthError::TokenMissing => "Authorization header missing or invalid",
            AuthError::TokenExpired => "Token has expired",
            AuthError::TokenInvalid(reason) => reason,
            AuthError::InsufficientPermissions(msg) => msg,
            AuthError::ProviderUnavailable(_) => "Authentication service unavailable",
        }
    }

    /// Whether retrying the whole request later may succeed.
    ///
    /// Only a provider outage is transient; every other kind is a verdict on
    /// the credential itself.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AuthError::ProviderUnavailable(_))
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "detail": self.detail() });
        (self.status_code(), Json(body)).into_response()
    }
}
