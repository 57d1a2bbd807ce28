//! Validated token claims.
//!
//! Keycloak stores roles in two places:
//! - **Realm roles**: `realm_access.roles`
//! - **Client roles**: `resource_access.{client_id}.roles`
//!
//! ```json
//! {
//!   "sub": "user-uuid",
//!   "exp": 1735689600,
//!   "scope": "openid profile email",
//!   "realm_access": { "roles": ["admin", "user"] },
//!   "resource_access": {
//!     "my-api": { "roles": ["api-admin", "api-reader"] }
//!   }
//! }
//! ```
//!
//! [`TokenClaims`] computes the role and scope sets once, when it is built,
//! so queries never walk the payload again.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::AuthError;

static EMPTY: BTreeSet<String> = BTreeSet::new();

/// The `aud` claim: a single string or a list of strings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    One(String),
    Many(Vec<String>),
}

impl Audience {
    /// Whether `audience` is one of the token's audiences.
    pub fn contains(&self, audience: &str) -> bool {
        match self {
            Audience::One(aud) => aud == audience,
            Audience::Many(auds) => auds.iter().any(|a| a == audience),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        let slice = match self {
            Audience::One(aud) => std::slice::from_ref(aud),
            Audience::Many(auds) => auds.as_slice(),
        };
        slice.iter().map(String::as_str)
    }
}

/// Typed view of the payload fields we read. Everything else stays in `raw`.
#[derive(Deserialize)]
struct Payload {
    sub: String,
    exp: i64,
    #[serde(default)]
    iat: Option<i64>,
    #[serde(default)]
    iss: Option<String>,
    #[serde(default)]
    aud: Option<Audience>,
    #[serde(default)]
    azp: Option<String>,
    #[serde(default)]
    preferred_username: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    email_verified: Option<bool>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    given_name: Option<String>,
    #[serde(default)]
    family_name: Option<String>,
    #[serde(default)]
    scope: Option<String>,
}

/// Claims of a token that passed validation.
///
/// Built once at the end of a successful validation and immutable afterwards.
/// `sub` and `exp` are always present: a payload without them never becomes
/// a `TokenClaims`.
#[derive(Clone, Debug)]
pub struct TokenClaims {
    sub: String,
    exp: i64,
    iat: Option<i64>,
    iss: Option<String>,
    aud: Option<Audience>,
    azp: Option<String>,
    preferred_username: Option<String>,
    email: Option<String>,
    email_verified: Option<bool>,
    name: Option<String>,
    given_name: Option<String>,
    family_name: Option<String>,
    scope: Option<String>,
    realm_roles: BTreeSet<String>,
    client_roles: HashMap<String, BTreeSet<String>>,
    scopes: BTreeSet<String>,
    raw: Value,
}

impl TokenClaims {
    /// Build claims from a decoded token payload or an introspection response.
    ///
    /// Fails with [`AuthError::TokenInvalid`] when `sub` or `exp` is missing
    /// or when a modelled claim has the wrong type.
    pub fn from_payload(payload: Value) -> Result<Self, AuthError> {
        if !payload.is_object() {
            return Err(AuthError::invalid("Token payload is not a JSON object"));
        }
        for required in ["sub", "exp"] {
            if payload.get(required).map_or(true, Value::is_null) {
                return Err(AuthError::invalid(format!(
                    "Token is missing required claim '{required}'"
                )));
            }
        }

        let parsed = Payload::deserialize(&payload)
            .map_err(|_| AuthError::invalid("Token claims are malformed"))?;

        let realm_roles = extract_string_array(&payload, &["realm_access", "roles"])
            .into_iter()
            .collect();

        let client_roles = payload
            .get("resource_access")
            .and_then(Value::as_object)
            .map(|clients| {
                clients
                    .iter()
                    .map(|(client_id, access)| {
                        let roles = extract_string_array(access, &["roles"])
                            .into_iter()
                            .collect();
                        (client_id.clone(), roles)
                    })
                    .collect()
            })
            .unwrap_or_default();

        let scopes = parsed
            .scope
            .as_deref()
            .map(|s| s.split_whitespace().map(String::from).collect())
            .unwrap_or_default();

        Ok(Self {
            sub: parsed.sub,
            exp: parsed.exp,
            iat: parsed.iat,
            iss: parsed.iss,
            aud: parsed.aud,
            azp: parsed.azp,
            preferred_username: parsed.preferred_username,
            email: parsed.email,
            email_verified: parsed.email_verified,
            name: parsed.name,
            given_name: parsed.given_name,
            family_name: parsed.family_name,
            scope: parsed.scope,
            realm_roles,
            client_roles,
            scopes,
            raw: payload,
        })
    }

    /// Subject ("sub") - unique user identifier.
    pub fn sub(&self) -> &str {
        &self.sub
    }

    /// Expiration time, epoch seconds.
    pub fn exp(&self) -> i64 {
        self.exp
    }

    pub fn iat(&self) -> Option<i64> {
        self.iat
    }

    pub fn iss(&self) -> Option<&str> {
        self.iss.as_deref()
    }

    pub fn aud(&self) -> Option<&Audience> {
        self.aud.as_ref()
    }

    /// Authorized party: the client the token was issued to.
    pub fn azp(&self) -> Option<&str> {
        self.azp.as_deref()
    }

    pub fn preferred_username(&self) -> Option<&str> {
        self.preferred_username.as_deref()
    }

    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    pub fn email_verified(&self) -> Option<bool> {
        self.email_verified
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn given_name(&self) -> Option<&str> {
        self.given_name.as_deref()
    }

    pub fn family_name(&self) -> Option<&str> {
        self.family_name.as_deref()
    }

    /// Raw space-delimited `scope` claim.
    pub fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }

    /// Roles granted at the realm level (`realm_access.roles`).
    pub fn realm_roles(&self) -> &BTreeSet<String> {
        &self.realm_roles
    }

    /// Roles granted for `client_id` (`resource_access.{client_id}.roles`).
    /// Empty when the token carries nothing for that client.
    pub fn client_roles(&self, client_id: &str) -> &BTreeSet<String> {
        self.client_roles.get(client_id).unwrap_or(&EMPTY)
    }

    /// Client roles when a non-empty `client_id` is given, realm roles otherwise.
    pub fn effective_roles(&self, client_id: Option<&str>) -> &BTreeSet<String> {
        match client_id {
            Some(client_id) if !client_id.is_empty() => self.client_roles(client_id),
            _ => self.realm_roles(),
        }
    }

    /// OAuth2 scopes from the `scope` claim.
    pub fn scopes(&self) -> &BTreeSet<String> {
        &self.scopes
    }

    pub fn has_role(&self, role: &str, client_id: Option<&str>) -> bool {
        self.effective_roles(client_id).contains(role)
    }

    /// Whether the token holds at least one of `roles`.
    pub fn has_any_role<I, R>(&self, roles: I, client_id: Option<&str>) -> bool
    where
        I: IntoIterator<Item = R>,
        R: AsRef<str>,
    {
        let held = self.effective_roles(client_id);
        roles.into_iter().any(|role| held.contains(role.as_ref()))
    }

    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.contains(scope)
    }

    /// Look up any attribute of the original payload.
    pub fn claim(&self, name: &str) -> Option<&Value> {
        self.raw.get(name)
    }

    /// The complete original payload.
    pub fn raw(&self) -> &Value {
        &self.raw
    }

    pub fn into_raw(self) -> Value {
        self.raw
    }
}

/// Collect the strings of the array found at `path`; anything else yields
/// an empty list.
fn extract_string_array(value: &Value, path: &[&str]) -> Vec<String> {
    let mut current = value;

    for key in path {
        match current.get(*key) {
            Some(v) => current = v,
            None => return Vec::new(),
        }
    }

    current
        .as_array()
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default()
}
