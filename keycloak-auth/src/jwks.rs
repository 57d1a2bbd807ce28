use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use jsonwebtoken::{decode_header, DecodingKey};
use serde::Deserialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::config::{ConfigError, KeycloakSettings};
use crate::error::AuthError;

/// Raw JWK as published by the realm's certs endpoint.
/// Unknown fields (x5c, x5t, ...) are ignored.
#[derive(Debug, Clone, Deserialize)]
struct Jwk {
    kid: Option<String>,
    kty: String,
    #[serde(default, rename = "use")]
    key_use: Option<String>,
    #[serde(default)]
    n: Option<String>,
    #[serde(default)]
    e: Option<String>,
    #[serde(default)]
    x: Option<String>,
    #[serde(default)]
    y: Option<String>,
}

impl Jwk {
    fn to_decoding_key(&self) -> Result<DecodingKey, String> {
        match self.kty.as_str() {
            "RSA" => {
                let n = self.n.as_deref().ok_or("RSA key missing 'n' component")?;
                let e = self.e.as_deref().ok_or("RSA key missing 'e' component")?;
                DecodingKey::from_rsa_components(n, e).map_err(|err| err.to_string())
            }
            "EC" => {
                let x = self.x.as_deref().ok_or("EC key missing 'x' component")?;
                let y = self.y.as_deref().ok_or("EC key missing 'y' component")?;
                DecodingKey::from_ec_components(x, y).map_err(|err| err.to_string())
            }
            other => Err(format!("Unsupported key type: {other}")),
        }
    }
}

#[derive(Debug, Deserialize)]
struct JwksResponse {
    keys: Vec<Jwk>,
}

/// Signature keys indexed by `kid`.
type KeySet = HashMap<String, DecodingKey>;

/// Cached state behind the lock. Replaced field-by-field only while the
/// write guard is held, so readers always see one consistent key set.
struct CacheInner {
    keys: Arc<KeySet>,
    fetched_at: Option<Instant>,
    last_attempt: Option<Instant>,
    /// Incremented after every completed fetch attempt, successful or not.
    attempts: u64,
    last_error: Option<String>,
}

/// Why a lookup wants a refetch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Refresh {
    /// Nothing cached yet, or the TTL elapsed.
    Expired,
    /// The key set is fresh but does not know the requested `kid`.
    UnknownKid,
}

/// In-memory cache of the realm's signing keys.
///
/// Lookups are answered from the cache while it is younger than the TTL.
/// An expired cache, or a `kid` the cached set does not know, triggers one
/// refetch before the lookup fails. A non-zero minimum refresh interval
/// throttles unknown-`kid` refetches.
///
/// At most one fetch is in flight per cache. It runs in its own task holding
/// the refresh lock, so concurrent lookups wait for its result and a caller
/// that gives up does not cancel it for the others.
pub struct JwksCache {
    inner: Arc<RwLock<CacheInner>>,
    refresh_lock: Arc<Mutex<()>>,
    jwks_uri: String,
    client: reqwest::Client,
    ttl: Duration,
    min_refresh_interval: Duration,
}

impl JwksCache {
    /// Create an empty cache for the realm's JWKS endpoint. Nothing is fetched
    /// until the first lookup or [`warm_up`](Self::warm_up).
    pub fn new(settings: &KeycloakSettings) -> Result<Self, ConfigError> {
        Ok(Self::with_client(settings, settings.http_client()?))
    }

    /// Create an empty cache that reuses an existing HTTP client.
    pub fn with_client(settings: &KeycloakSettings, client: reqwest::Client) -> Self {
        Self {
            inner: Arc::new(RwLock::new(CacheInner {
                keys: Arc::new(HashMap::new()),
                fetched_at: None,
                last_attempt: None,
                attempts: 0,
                last_error: None,
            })),
            refresh_lock: Arc::new(Mutex::new(())),
            jwks_uri: settings.jwks_uri(),
            client,
            ttl: Duration::from_secs(settings.jwks_cache_ttl_secs),
            min_refresh_interval: Duration::from_secs(settings.jwks_min_refresh_interval_secs),
        }
    }

    pub fn jwks_uri(&self) -> &str {
        &self.jwks_uri
    }

    /// Fetch the key set now, replacing whatever is cached.
    pub async fn warm_up(&self) -> Result<(), AuthError> {
        let observed = self.inner.read().await.attempts;
        self.refresh(observed, Refresh::Expired).await
    }

    /// Drop the cached key set; the next lookup refetches.
    pub async fn invalidate(&self) {
        let mut cache = self.inner.write().await;
        cache.keys = Arc::new(HashMap::new());
        cache.fetched_at = None;
    }

    /// Resolve the key that must verify `token`, using its `kid` header.
    ///
    /// A token whose header cannot be decoded fails with `TokenInvalid`;
    /// every other failure is `ProviderUnavailable`.
    pub async fn get_signing_key(&self, token: &str) -> Result<DecodingKey, AuthError> {
        let header =
            decode_header(token).map_err(|_| AuthError::invalid("Malformed token header"))?;
        self.key_for(header.kid.as_deref()).await
    }

    pub(crate) async fn key_for(&self, kid: Option<&str>) -> Result<DecodingKey, AuthError> {
        let kid = kid.ok_or_else(|| {
            AuthError::unavailable("Unable to find a signing key: token header has no 'kid'")
        })?;
        self.get_key(kid).await
    }

    /// Retrieve the decoding key for the given `kid`.
    pub async fn get_key(&self, kid: &str) -> Result<DecodingKey, AuthError> {
        let (observed, reason) = {
            let cache = self.inner.read().await;
            let stale = is_stale(cache.fetched_at, self.ttl);
            if !stale {
                if let Some(key) = cache.keys.get(kid) {
                    return Ok(key.clone());
                }
            }
            let reason = if stale {
                Refresh::Expired
            } else {
                Refresh::UnknownKid
            };
            (cache.attempts, reason)
        };

        debug!(kid, ?reason, "JWKS lookup needs a refresh");
        self.refresh(observed, reason).await?;

        let cache = self.inner.read().await;
        cache.keys.get(kid).cloned().ok_or_else(|| {
            warn!(kid, "No JWKS key matches the token's kid");
            AuthError::unavailable(format!("Unable to find a signing key that matches: {kid}"))
        })
    }

    /// Refetch unless another caller already completed an attempt since
    /// `observed` was read.
    async fn refresh(&self, observed: u64, reason: Refresh) -> Result<(), AuthError> {
        let guard = self.refresh_lock.clone().lock_owned().await;

        {
            let cache = self.inner.read().await;
            if cache.attempts != observed {
                // Another caller fetched while we waited for the lock.
                return match &cache.last_error {
                    Some(err) => Err(AuthError::unavailable(err.clone())),
                    None => Ok(()),
                };
            }
            if reason == Refresh::UnknownKid
                && !can_attempt(cache.last_attempt, self.min_refresh_interval)
            {
                debug!("JWKS refresh throttled");
                return Ok(());
            }
        }

        let inner = Arc::clone(&self.inner);
        let client = self.client.clone();
        let uri = self.jwks_uri.clone();

        let task = tokio::spawn(async move {
            let _guard = guard;
            let result = fetch_key_set(&client, &uri).await;

            let now = Instant::now();
            let mut cache = inner.write().await;
            cache.last_attempt = Some(now);
            cache.attempts += 1;
            match result {
                Ok(keys) => {
                    info!(uri = %uri, keys = keys.len(), "JWKS refreshed");
                    cache.keys = Arc::new(keys);
                    cache.fetched_at = Some(now);
                    cache.last_error = None;
                    Ok(())
                }
                Err(err) => {
                    warn!(uri = %uri, error = %err, "JWKS refresh failed");
                    cache.last_error = Some(err.to_string());
                    Err(err)
                }
            }
        });

        task.await
            .map_err(|e| AuthError::unavailable(format!("JWKS refresh task failed: {e}")))?
    }
}

async fn fetch_key_set(client: &reqwest::Client, uri: &str) -> Result<KeySet, AuthError> {
    let response = client
        .get(uri)
        .send()
        .await
        .map_err(|e| AuthError::unavailable(format!("JWKS request failed: {e}")))?;

    let response = response
        .error_for_status()
        .map_err(|e| AuthError::unavailable(format!("JWKS endpoint error: {e}")))?;

    let jwks: JwksResponse = response
        .json()
        .await
        .map_err(|e| AuthError::unavailable(format!("Failed to parse JWKS: {e}")))?;

    let mut keys = HashMap::new();
    for jwk in jwks.keys {
        if jwk.key_use.as_deref() == Some("enc") {
            continue;
        }
        let Some(kid) = jwk.kid.clone() else {
            continue;
        };
        match jwk.to_decoding_key() {
            Ok(key) => {
                keys.insert(kid, key);
            }
            Err(reason) => warn!(kid = %kid, %reason, "Skipping unusable JWK"),
        }
    }

    Ok(keys)
}

fn is_stale(fetched_at: Option<Instant>, ttl: Duration) -> bool {
    match fetched_at {
        None => true,
        Some(ts) => ts.elapsed() >= ttl,
    }
}

fn can_attempt(last_attempt: Option<Instant>, min_interval: Duration) -> bool {
    match last_attempt {
        None => true,
        Some(ts) => ts.elapsed() >= min_interval,
    }
}
