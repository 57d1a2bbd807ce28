use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use jsonwebtoken::{encode, Algorithm, DecodingKey, EncodingKey, Header};
use rand::rngs::OsRng;
use rsa::pkcs8::EncodePrivateKey;
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde_json::{json, Map, Value};

pub const TEST_SERVER_URL: &str = "http://keycloak.test";
pub const TEST_REALM: &str = "test-realm";
pub const TEST_CLIENT_ID: &str = "test-client";
pub const TEST_KID: &str = "test-key-1";

/// RSA-2048 key pair that signs test tokens and publishes itself as a JWK.
pub struct TestKeyPair {
    kid: String,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    n: String,
    e: String,
}

impl TestKeyPair {
    /// Generate a fresh key pair. RSA generation is slow in debug builds;
    /// prefer [`shared`](Self::shared) unless the test needs a second key.
    pub fn generate(kid: &str) -> Self {
        let private_key =
            RsaPrivateKey::new(&mut OsRng, 2048).expect("failed to generate RSA-2048 key");
        let public_key = RsaPublicKey::from(&private_key);

        let pem = private_key
            .to_pkcs8_pem(rsa::pkcs8::LineEnding::LF)
            .expect("failed to export RSA key as PKCS8 PEM");
        let encoding_key =
            EncodingKey::from_rsa_pem(pem.as_bytes()).expect("invalid RSA PEM");

        let n = URL_SAFE_NO_PAD.encode(public_key.n().to_bytes_be());
        let e = URL_SAFE_NO_PAD.encode(public_key.e().to_bytes_be());
        let decoding_key =
            DecodingKey::from_rsa_components(&n, &e).expect("invalid RSA components");

        Self {
            kid: kid.to_string(),
            encoding_key,
            decoding_key,
            n,
            e,
        }
    }

    /// Process-wide key pair with kid [`TEST_KID`].
    pub fn shared() -> &'static TestKeyPair {
        static SHARED: OnceLock<TestKeyPair> = OnceLock::new();
        SHARED.get_or_init(|| TestKeyPair::generate(TEST_KID))
    }

    pub fn kid(&self) -> &str {
        &self.kid
    }

    pub fn encoding_key(&self) -> &EncodingKey {
        &self.encoding_key
    }

    pub fn decoding_key(&self) -> DecodingKey {
        self.decoding_key.clone()
    }

    /// The public key as a signing JWK, the way Keycloak's certs endpoint lists it.
    pub fn jwk(&self) -> Value {
        json!({
            "kid": self.kid,
            "kty": "RSA",
            "alg": "RS256",
            "use": "sig",
            "n": self.n,
            "e": self.e,
        })
    }

    /// A `{"keys": [...]}` document holding this key only.
    pub fn jwks_body(&self) -> Value {
        Self::jwks_of(&[self])
    }

    /// A `{"keys": [...]}` document holding several keys.
    pub fn jwks_of(pairs: &[&TestKeyPair]) -> Value {
        json!({ "keys": pairs.iter().map(|p| p.jwk()).collect::<Vec<_>>() })
    }
}

fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock before epoch")
        .as_secs() as i64
}

/// Builder for Keycloak-shaped access tokens.
///
/// Defaults: `sub = "user-123"`, issuer of the test realm, `exp` one hour
/// ahead, username `testuser`, realm role `user`, scopes
/// `openid profile email`.
///
/// ```ignore
/// let token = TokenBuilder::new()
///     .issuer(&settings.issuer())
///     .realm_roles(["admin"])
///     .sign(TestKeyPair::shared());
/// ```
#[derive(Clone)]
pub struct TokenBuilder {
    claims: Map<String, Value>,
    kid: Option<String>,
}

impl Default for TokenBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenBuilder {
    pub fn new() -> Self {
        let now = now();
        let claims = json!({
            "sub": "user-123",
            "iss": format!("{TEST_SERVER_URL}/realms/{TEST_REALM}"),
            "iat": now,
            "exp": now + 3600,
            "azp": TEST_CLIENT_ID,
            "preferred_username": "testuser",
            "email": "test@example.com",
            "name": "Test User",
            "realm_access": { "roles": ["user"] },
            "scope": "openid profile email",
        });
        let Value::Object(claims) = claims else {
            unreachable!()
        };
        Self {
            claims,
            kid: None,
        }
    }

    pub fn sub(self, sub: &str) -> Self {
        self.claim("sub", sub)
    }

    pub fn issuer(self, issuer: &str) -> Self {
        self.claim("iss", issuer)
    }

    pub fn audience(self, aud: impl Into<Value>) -> Self {
        self.claim("aud", aud)
    }

    pub fn realm_roles<I, S>(self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let roles: Vec<String> = roles.into_iter().map(Into::into).collect();
        self.claim("realm_access", json!({ "roles": roles }))
    }

    /// Set `resource_access.{client}.roles`, keeping other clients.
    pub fn client_roles<I, S>(mut self, client: &str, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let roles: Vec<String> = roles.into_iter().map(Into::into).collect();
        let access = self
            .claims
            .entry("resource_access")
            .or_insert_with(|| json!({}));
        if let Value::Object(map) = access {
            map.insert(client.to_string(), json!({ "roles": roles }));
        }
        self
    }

    pub fn scope(self, scope: &str) -> Self {
        self.claim("scope", scope)
    }

    /// Expire the token one hour ago.
    pub fn expired(self) -> Self {
        self.expires_in(-3600)
    }

    /// Set `exp` relative to now, in seconds.
    pub fn expires_in(self, secs: i64) -> Self {
        self.claim("exp", now() + secs)
    }

    /// Set `nbf` relative to now, in seconds.
    pub fn not_before(self, secs: i64) -> Self {
        self.claim("nbf", now() + secs)
    }

    /// Set an arbitrary claim.
    pub fn claim(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.claims.insert(name.to_string(), value.into());
        self
    }

    pub fn without_claim(mut self, name: &str) -> Self {
        self.claims.remove(name);
        self
    }

    /// Override the `kid` header. Defaults to the signing key's kid.
    pub fn kid(mut self, kid: &str) -> Self {
        self.kid = Some(kid.to_string());
        self
    }

    pub fn claims(&self) -> &Map<String, Value> {
        &self.claims
    }

    /// Sign with RS256 and the key pair's kid.
    pub fn sign(&self, keys: &TestKeyPair) -> String {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(self.kid.clone().unwrap_or_else(|| keys.kid.clone()));
        encode(&header, &self.claims, &keys.encoding_key).expect("failed to sign test token")
    }

    /// Sign with RS256 and no `kid` header.
    pub fn sign_without_kid(&self, keys: &TestKeyPair) -> String {
        let header = Header::new(Algorithm::RS256);
        encode(&header, &self.claims, &keys.encoding_key).expect("failed to sign test token")
    }

    /// Sign with HS256 and a shared secret, for algorithm-confusion cases.
    pub fn sign_hs256(&self, secret: &[u8]) -> String {
        let mut header = Header::new(Algorithm::HS256);
        header.kid = self.kid.clone();
        encode(&header, &self.claims, &EncodingKey::from_secret(secret))
            .expect("failed to sign test token")
    }
}
