use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use jsonwebtoken::DecodingKey;
use serde::Deserialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};
use url::Url;

use super::{KeyError, KeyLocator};
use crate::deployment::DeploymentConfig;

/// Raw JWK structure as returned by a JWKS endpoint.
/// Only the fields needed to build RSA and EC verification keys are captured.
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

#[derive(Debug, Deserialize)]
struct JwksResponse {
    keys: Vec<Jwk>,
}

/// Cached key material. `DecodingKey` is rebuilt on demand from the raw
/// components.
#[derive(Debug, Clone)]
enum CachedJwk {
    Rsa { n: String, e: String },
    Ec { x: String, y: String },
}

impl CachedJwk {
    fn from_jwk(jwk: &Jwk) -> Option<Self> {
        match jwk.kty.as_str() {
            "RSA" => Some(CachedJwk::Rsa {
                n: jwk.n.clone()?,
                e: jwk.e.clone()?,
            }),
            "EC" => Some(CachedJwk::Ec {
                x: jwk.x.clone()?,
                y: jwk.y.clone()?,
            }),
            _ => None,
        }
    }

    fn to_decoding_key(&self) -> Result<DecodingKey, KeyError> {
        match self {
            CachedJwk::Rsa { n, e } => DecodingKey::from_rsa_components(n, e)
                .map_err(|err| KeyError::InvalidKey(format!("RSA key: {err}"))),
            CachedJwk::Ec { x, y } => DecodingKey::from_ec_components(x, y)
                .map_err(|err| KeyError::InvalidKey(format!("EC key: {err}"))),
        }
    }
}

struct CacheInner {
    keys: HashMap<String, CachedJwk>,
    last_refresh: Option<Instant>,
    last_refresh_attempt: Option<Instant>,
    /// Reset epoch the keys were fetched under.
    epoch: u64,
    /// Reset epoch of the last download attempt.
    attempt_epoch: u64,
}

struct Shared {
    cache: RwLock<CacheInner>,
    refresh_lock: Mutex<()>,
    /// Bumped by every reset; cached keys from an older epoch are invalid.
    epoch: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Refresh {
    /// Requested `kid` is not cached.
    Missing,
    /// Cached keys have outlived the TTL.
    IfStale,
    /// A reset happened since the last download.
    Invalidated,
}

/// Key locator that downloads the realm's JWKS document.
///
/// Keys are indexed by `kid` and refreshed from the deployment's JWKS URL with
/// the deployment's HTTP client. Downloads for unknown keys are throttled by
/// `min_time_between_jwks_requests`; cached keys expire after
/// `public_key_cache_ttl`. A reset bypasses both limits.
pub struct JwksKeyLocator {
    shared: Arc<Shared>,
}

impl JwksKeyLocator {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                cache: RwLock::new(CacheInner {
                    keys: HashMap::new(),
                    last_refresh: None,
                    last_refresh_attempt: None,
                    epoch: 0,
                    attempt_epoch: 0,
                }),
                refresh_lock: Mutex::new(()),
                epoch: AtomicU64::new(0),
            }),
        }
    }

    async fn get_key(
        &self,
        kid: Option<&str>,
        deployment: &DeploymentConfig,
    ) -> Result<DecodingKey, KeyError> {
        let ttl = Duration::from_secs(deployment.public_key_cache_ttl());

        let refresh = {
            let cache = self.shared.cache.read().await;
            if cache.epoch != self.shared.epoch.load(Ordering::Acquire) {
                Refresh::Invalidated
            } else {
                match lookup(&cache.keys, kid) {
                    Some(jwk) if !is_stale(cache.last_refresh, ttl) => return jwk.to_decoding_key(),
                    Some(_) => Refresh::IfStale,
                    None => Refresh::Missing,
                }
            }
        };

        self.try_refresh(refresh, deployment).await?;

        let cache = self.shared.cache.read().await;
        if cache.epoch != self.shared.epoch.load(Ordering::Acquire) {
            // Keys from before a reset are never handed out.
            return Err(KeyError::UnknownKeyId(kid.unwrap_or("<none>").to_string()));
        }
        lookup(&cache.keys, kid)
            .ok_or_else(|| KeyError::UnknownKeyId(kid.unwrap_or("<none>").to_string()))?
            .to_decoding_key()
    }

    async fn try_refresh(&self, reason: Refresh, deployment: &DeploymentConfig) -> Result<(), KeyError> {
        let ttl = Duration::from_secs(deployment.public_key_cache_ttl());
        let min_interval = Duration::from_secs(deployment.min_time_between_jwks_requests());

        if !self.should_refresh(reason, ttl, min_interval).await {
            return Ok(());
        }

        let _guard = self.shared.refresh_lock.lock().await;

        // Another task may have refreshed while we waited for the lock.
        if !self.should_refresh(reason, ttl, min_interval).await {
            return Ok(());
        }

        {
            let mut cache = self.shared.cache.write().await;
            cache.last_refresh_attempt = Some(Instant::now());
            cache.attempt_epoch = self.shared.epoch.load(Ordering::Acquire);
        }

        let url = deployment.jwks_url().ok_or(KeyError::MissingJwksUrl)?;
        let client = deployment.http_client().map_err(KeyError::HttpClient)?;
        self.shared.fetch(&client, &url).await
    }

    async fn should_refresh(&self, reason: Refresh, ttl: Duration, min_interval: Duration) -> bool {
        let cache = self.shared.cache.read().await;
        let current = self.shared.epoch.load(Ordering::Acquire);
        match reason {
            // The first download after a reset ignores the throttle; retries
            // after a failed one do not.
            Refresh::Invalidated => {
                cache.epoch != current
                    && (cache.attempt_epoch != current
                        || can_attempt(cache.last_refresh_attempt, min_interval))
            }
            Refresh::Missing => can_attempt(cache.last_refresh_attempt, min_interval),
            Refresh::IfStale => {
                is_stale(cache.last_refresh, ttl) && can_attempt(cache.last_refresh_attempt, min_interval)
            }
        }
    }
}

impl Default for JwksKeyLocator {
    fn default() -> Self {
        Self::new()
    }
}

impl Shared {
    /// Download the key set and replace the cache.
    async fn fetch(&self, client: &reqwest::Client, url: &Url) -> Result<(), KeyError> {
        let epoch = self.epoch.load(Ordering::Acquire);

        let response = client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| KeyError::JwksFetch(e.to_string()))?;

        let response = response
            .error_for_status()
            .map_err(|e| KeyError::JwksFetch(e.to_string()))?;

        let jwks: JwksResponse = response
            .json()
            .await
            .map_err(|e| KeyError::JwksFetch(format!("Failed to parse JWKS: {e}")))?;

        let mut keys = HashMap::new();
        for jwk in &jwks.keys {
            if jwk.key_use.as_deref().is_some_and(|u| u != "sig") {
                continue;
            }
            if let (Some(kid), Some(cached)) = (&jwk.kid, CachedJwk::from_jwk(jwk)) {
                keys.insert(kid.clone(), cached);
            }
        }

        debug!(url = %url, keys = keys.len(), epoch, "Refreshed JWKS");

        let now = Instant::now();
        let mut cache = self.cache.write().await;
        cache.keys = keys;
        cache.last_refresh = Some(now);
        cache.last_refresh_attempt = Some(now);
        cache.epoch = epoch;

        Ok(())
    }
}

impl KeyLocator for JwksKeyLocator {
    fn resolve<'a>(
        &'a self,
        kid: Option<&'a str>,
        deployment: &'a DeploymentConfig,
    ) -> Pin<Box<dyn Future<Output = Result<DecodingKey, KeyError>> + Send + 'a>> {
        Box::pin(self.get_key(kid, deployment))
    }

    fn reset(&self, deployment: &DeploymentConfig) {
        let epoch = self.shared.epoch.fetch_add(1, Ordering::AcqRel) + 1;
        debug!(epoch, "Invalidated cached JWKS keys");

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let Some(url) = deployment.jwks_url() else {
            return;
        };
        let factory = deployment.http_client_factory();

        let shared = self.shared.clone();
        handle.spawn(async move {
            // The factory may block, so it is only invoked off the caller's path.
            let client = match factory.get() {
                Ok(client) => client,
                Err(err) => {
                    warn!(error = %err, "Skipping background JWKS refresh");
                    return;
                }
            };
            let _guard = shared.refresh_lock.lock().await;
            if shared.cache.read().await.epoch == shared.epoch.load(Ordering::Acquire) {
                return;
            }
            if let Err(err) = shared.fetch(&client, &url).await {
                warn!(error = %err, url = %url, "Background JWKS refresh failed");
            }
        });
    }
}

fn lookup<'a>(keys: &'a HashMap<String, CachedJwk>, kid: Option<&str>) -> Option<&'a CachedJwk> {
    match kid {
        Some(kid) => keys.get(kid),
        None if keys.len() == 1 => keys.values().next(),
        None => None,
    }
}

fn is_stale(last_refresh: Option<Instant>, ttl: Duration) -> bool {
    match last_refresh {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_when_never_refreshed() {
        assert!(is_stale(None, Duration::from_secs(60)));
    }

    #[test]
    fn not_stale_before_ttl() {
        let ts = Instant::now() - Duration::from_secs(10);
        assert!(!is_stale(Some(ts), Duration::from_secs(60)));
    }

    #[test]
    fn cannot_attempt_too_soon() {
        let ts = Instant::now() - Duration::from_secs(3);
        assert!(!can_attempt(Some(ts), Duration::from_secs(10)));
        assert!(can_attempt(None, Duration::from_secs(10)));
    }

    #[test]
    fn lookup_without_kid_needs_single_key() {
        let mut keys = HashMap::new();
        keys.insert("a".to_string(), CachedJwk::Rsa { n: "n".into(), e: "e".into() });
        assert!(lookup(&keys, None).is_some());

        keys.insert("b".to_string(), CachedJwk::Rsa { n: "n".into(), e: "e".into() });
        assert!(lookup(&keys, None).is_none());
        assert!(lookup(&keys, Some("b")).is_some());
    }

    #[test]
    fn jwk_use_is_captured() {
        let jwk: Jwk = serde_json::from_value(serde_json::json!({
            "kid": "enc", "kty": "RSA", "use": "enc", "n": "abc", "e": "AQAB"
        }))
        .unwrap();
        assert_eq!(jwk.key_use.as_deref(), Some("enc"));
        assert!(CachedJwk::from_jwk(&jwk).is_some());
    }
}
