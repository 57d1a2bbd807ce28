use std::time::Duration;

use jsonwebtoken::Algorithm;

/// Which validation strategy [`Authenticator::from_settings`](crate::Authenticator::from_settings)
/// should build.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ValidationMode {
    /// Verify signatures locally with keys from the realm's JWKS endpoint.
    #[default]
    Jwks,
    /// Ask the realm's introspection endpoint on every request.
    Introspection,
}

impl std::str::FromStr for ValidationMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "jwks" | "offline" => Ok(ValidationMode::Jwks),
            "introspection" | "online" => Ok(ValidationMode::Introspection),
            other => Err(ConfigError::Invalid {
                key: "validation_mode".into(),
                message: format!("unknown validation mode '{other}'"),
            }),
        }
    }
}

/// Configuration errors. These are raised while wiring the process up and
/// are never returned from a validation call.
#[derive(Debug)]
pub enum ConfigError {
    /// A configuration source could not be read or parsed.
    Load(String),
    /// A value is present but unusable.
    Invalid { key: String, message: String },
    /// Introspection was requested without a client secret.
    MissingClientSecret,
    /// The HTTP client could not be built.
    HttpClient(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Load(msg) => write!(f, "Config load error: {msg}"),
            ConfigError::Invalid { key, message } => {
                write!(f, "Invalid config value for '{key}': {message}")
            }
            ConfigError::MissingClientSecret => {
                write!(f, "client_secret is required for introspection validation")
            }
            ConfigError::HttpClient(msg) => write!(f, "Failed to build HTTP client: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Connection settings for one Keycloak realm.
///
/// Built once at startup (see [`SettingsLoader`](crate::loader::SettingsLoader))
/// and shared read-only afterwards.
#[derive(Clone)]
pub struct KeycloakSettings {
    /// Base URL of the Keycloak server, e.g. `https://sso.example.com`.
    pub server_url: String,

    /// Realm name.
    pub realm: String,

    /// Client identifier used for introspection and client-role lookups.
    pub client_id: String,

    /// Client secret, only needed for introspection.
    pub client_secret: Option<String>,

    /// Expected `aud` claim. `None` disables the audience check.
    pub audience: Option<String>,

    /// Verify the provider's TLS certificate (default: true).
    pub verify_tls: bool,

    /// JWKS cache TTL in seconds (default: 300)
    pub jwks_cache_ttl_secs: u64,

    /// Minimum interval between refreshes triggered by unknown key ids
    /// (default: 0, every miss refetches once)
    pub jwks_min_refresh_interval_secs: u64,

    /// Timeout for every call to the provider in seconds (default: 10)
    pub http_timeout_secs: u64,

    /// Clock skew tolerated on `exp`/`nbf` in seconds (default: 0)
    pub leeway_secs: u64,

    /// Accepted signature algorithms. Default: RS256 only.
    pub allowed_algorithms: Vec<Algorithm>,

    /// Strategy built by `Authenticator::from_settings`.
    pub validation_mode: ValidationMode,
}

impl Default for KeycloakSettings {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:8080".into(),
            realm: "master".into(),
            client_id: String::new(),
            client_secret: None,
            audience: None,
            verify_tls: true,
            jwks_cache_ttl_secs: 300,
            jwks_min_refresh_interval_secs: 0,
            http_timeout_secs: 10,
            leeway_secs: 0,
            allowed_algorithms: vec![Algorithm::RS256],
            validation_mode: ValidationMode::Jwks,
        }
    }
}

impl std::fmt::Debug for KeycloakSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeycloakSettings")
            .field("server_url", &self.server_url)
            .field("realm", &self.realm)
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "***"))
            .field("audience", &self.audience)
            .field("verify_tls", &self.verify_tls)
            .field("jwks_cache_ttl_secs", &self.jwks_cache_ttl_secs)
            .field(
                "jwks_min_refresh_interval_secs",
                &self.jwks_min_refresh_interval_secs,
            )
            .field("http_timeout_secs", &self.http_timeout_secs)
            .field("leeway_secs", &self.leeway_secs)
            .field("allowed_algorithms", &self.allowed_algorithms)
            .field("validation_mode", &self.validation_mode)
            .finish()
    }
}

impl KeycloakSettings {
    /// Create settings for the given server, realm and client with defaults elsewhere.
    pub fn new(
        server_url: impl Into<String>,
        realm: impl Into<String>,
        client_id: impl Into<String>,
    ) -> Self {
        Self {
            server_url: server_url.into(),
            realm: realm.into(),
            client_id: client_id.into(),
            ..Self::default()
        }
    }

    pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
        self.client_secret = Some(secret.into());
        self
    }

    /// Require `aud` to contain `audience`.
    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }

    pub fn with_verify_tls(mut self, verify: bool) -> Self {
        self.verify_tls = verify;
        self
    }

    /// Set the JWKS cache TTL in seconds.
    pub fn with_cache_ttl(mut self, ttl_secs: u64) -> Self {
        self.jwks_cache_ttl_secs = ttl_secs;
        self
    }

    /// Throttle JWKS refreshes caused by unknown key ids. Within the interval a
    /// miss fails without contacting the provider.
    pub fn with_min_refresh_interval(mut self, interval_secs: u64) -> Self {
        self.jwks_min_refresh_interval_secs = interval_secs;
        self
    }

    pub fn with_http_timeout(mut self, timeout_secs: u64) -> Self {
        self.http_timeout_secs = timeout_secs;
        self
    }

    pub fn with_leeway(mut self, leeway_secs: u64) -> Self {
        self.leeway_secs = leeway_secs;
        self
    }

    /// Set the accepted algorithms. An empty list rejects every token.
    pub fn with_allowed_algorithms(
        mut self,
        algorithms: impl IntoIterator<Item = Algorithm>,
    ) -> Self {
        self.allowed_algorithms = algorithms.into_iter().collect();
        self
    }

    pub fn with_allowed_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.allowed_algorithms = vec![algorithm];
        self
    }

    pub fn with_validation_mode(mut self, mode: ValidationMode) -> Self {
        self.validation_mode = mode;
        self
    }

    /// `{server_url}/realms/{realm}`
    pub fn issuer(&self) -> String {
        format!("{}/realms/{}", self.server_url.trim_end_matches('/'), self.realm)
    }

    /// `{issuer}/protocol/openid-connect/certs`
    pub fn jwks_uri(&self) -> String {
        format!("{}/protocol/openid-connect/certs", self.issuer())
    }

    /// `{issuer}/protocol/openid-connect/token/introspect`
    pub fn introspection_uri(&self) -> String {
        format!("{}/protocol/openid-connect/token/introspect", self.issuer())
    }

    /// Whether tokens must carry the configured audience.
    pub fn audience_check_enabled(&self) -> bool {
        self.audience.as_deref().is_some_and(|aud| !aud.is_empty())
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// Build the HTTP client used for every provider call.
    pub fn http_client(&self) -> Result<reqwest::Client, ConfigError> {
        reqwest::Client::builder()
            .timeout(self.http_timeout())
            .danger_accept_invalid_certs(!self.verify_tls)
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))
    }
}
