//! JWKS client for fetching and caching the identity provider's public keys.
//!
//! The client owns exactly one key set URL
//! (`{internal}/realms/{realm}/protocol/openid-connect/certs`) and caches the
//! fetched keys with a configurable TTL.
//!
//! # Security
//!
//! - Keys are cached to reduce load on the identity provider and improve latency
//! - Cache is invalidated on TTL expiry to pick up key rotations
//! - A `kid` missing from a valid cache triggers a refresh, at most once per
//!   [`MIN_REFRESH_INTERVAL`], so unknown key ids cannot be used to hammer
//!   the identity provider

use crate::errors::VerifyError;
use crate::observability::metrics;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::instrument;

/// Default cache TTL in seconds (1 hour).
pub const DEFAULT_CACHE_TTL_SECONDS: u64 = 3600;

/// Minimum time between two refreshes caused by an unknown `kid`.
pub const MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

/// JSON Web Key from the certs endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct Jwk {
    /// Key type ("RSA", "EC" or "OKP").
    pub kty: String,

    /// Key ID - used to select the correct key for verification.
    #[serde(default)]
    pub kid: Option<String>,

    /// Curve name ("Ed25519" for OKP keys, "P-256"/"P-384" for EC keys).
    #[serde(default)]
    pub crv: Option<String>,

    /// OKP public key, or EC x coordinate (base64url encoded).
    #[serde(default)]
    pub x: Option<String>,

    /// EC y coordinate (base64url encoded).
    #[serde(default)]
    pub y: Option<String>,

    /// RSA modulus (base64url encoded).
    #[serde(default)]
    pub n: Option<String>,

    /// RSA public exponent (base64url encoded).
    #[serde(default)]
    pub e: Option<String>,

    /// Algorithm advertised for this key.
    #[serde(default)]
    pub alg: Option<String>,

    /// Key use ("sig" or "enc").
    #[serde(default, rename = "use")]
    pub key_use: Option<String>,
}

/// Key set document.
#[derive(Debug, Clone, Deserialize)]
pub struct JwksResponse {
    /// List of JSON Web Keys.
    pub keys: Vec<Jwk>,
}

/// Cached JWKS data with expiry time.
struct CachedJwks {
    /// Map of key ID to JWK.
    keys: HashMap<String, Jwk>,

    /// When this cache entry was fetched.
    fetched_at: Instant,

    /// When this cache entry expires.
    expires_at: Instant,
}

/// Outcome of a cache lookup.
enum Lookup {
    Hit(Jwk),
    /// Valid cache without the key; carries the age of the cache.
    Miss(Duration),
    Stale,
}

/// JWKS client for fetching and caching public keys.
///
/// Thread-safe client that fetches the key set and caches the keys with a
/// configurable TTL. Two tasks that find an empty cache at the same time may
/// both fetch; the last write wins.
pub struct JwksClient {
    /// URL to the certs endpoint.
    jwks_url: String,

    /// HTTP client for fetching JWKS.
    http_client: reqwest::Client,

    /// Cached JWKS data.
    cache: Arc<RwLock<Option<CachedJwks>>>,

    /// Cache TTL duration.
    cache_ttl: Duration,

    /// Minimum cache age before an unknown `kid` may trigger a refresh.
    min_refresh_interval: Duration,
}

impl JwksClient {
    /// Create a new JWKS client.
    ///
    /// # Arguments
    ///
    /// * `jwks_url` - URL to the realm's certs endpoint
    /// * `cache_ttl` - How long to cache JWKS before refreshing
    /// * `http_timeout` - Timeout for each fetch
    pub fn new(jwks_url: String, cache_ttl: Duration, http_timeout: Duration) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(http_timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(target: "gw.auth.jwks", error = %e, "Failed to build HTTP client with custom config, using defaults");
                reqwest::Client::new()
            });

        Self {
            jwks_url,
            http_client,
            cache: Arc::new(RwLock::new(None)),
            cache_ttl,
            min_refresh_interval: MIN_REFRESH_INTERVAL,
        }
    }

    /// Override the unknown-`kid` refresh interval.
    pub fn with_min_refresh_interval(mut self, interval: Duration) -> Self {
        self.min_refresh_interval = interval;
        self
    }

    /// The key set URL this client fetches from.
    pub fn jwks_url(&self) -> &str {
        &self.jwks_url
    }

    /// Get a JWK by key ID.
    ///
    /// Returns the cached JWK, or fetches the key set when the cache is
    /// empty or expired. A `kid` missing from a valid cache refreshes once
    /// if the cache is older than the refresh interval.
    ///
    /// # Errors
    ///
    /// Returns `VerifyError::KeySetUnavailable` if JWKS cannot be fetched.
    /// Returns `VerifyError::UnknownKey` if key ID is not found.
    #[instrument(skip(self), fields(kid = %kid))]
    pub async fn get_key(&self, kid: &str) -> Result<Jwk, VerifyError> {
        match self.lookup(kid).await {
            Lookup::Hit(key) => {
                tracing::debug!(target: "gw.auth.jwks", kid = %kid, "JWKS cache hit");
                return Ok(key);
            }
            Lookup::Miss(age) if age < self.min_refresh_interval => {
                tracing::debug!(
                    target: "gw.auth.jwks",
                    kid = %kid,
                    cache_age_ms = age.as_millis() as u64,
                    "Key not found in JWKS cache, refresh suppressed"
                );
                return Err(VerifyError::UnknownKey);
            }
            Lookup::Miss(_) => {
                tracing::info!(target: "gw.auth.jwks", kid = %kid, "Key not found in JWKS cache, refreshing");
            }
            Lookup::Stale => {}
        }

        self.refresh_cache().await?;

        match self.lookup(kid).await {
            Lookup::Hit(key) => Ok(key),
            _ => {
                tracing::warn!(target: "gw.auth.jwks", kid = %kid, "Key not found in JWKS after refresh");
                Err(VerifyError::UnknownKey)
            }
        }
    }

    /// Make sure a valid key set is cached, fetching one if needed.
    ///
    /// Returns the number of cached keys.
    pub async fn ensure_loaded(&self) -> Result<usize, VerifyError> {
        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.as_ref() {
                if cached.expires_at > Instant::now() {
                    return Ok(cached.keys.len());
                }
            }
        }

        self.refresh_cache().await
    }

    async fn lookup(&self, kid: &str) -> Lookup {
        let cache = self.cache.read().await;
        match cache.as_ref() {
            Some(cached) if cached.expires_at > Instant::now() => match cached.keys.get(kid) {
                Some(key) => Lookup::Hit(key.clone()),
                None => Lookup::Miss(cached.fetched_at.elapsed()),
            },
            _ => Lookup::Stale,
        }
    }

    /// Refresh the JWKS cache by fetching from the identity provider.
    #[instrument(skip(self))]
    async fn refresh_cache(&self) -> Result<usize, VerifyError> {
        tracing::debug!(target: "gw.auth.jwks", url = %self.jwks_url, "Fetching JWKS");

        let result = self.fetch().await;
        metrics::record_jwks_refresh(if result.is_ok() { "success" } else { "error" });
        let jwks = result?;

        // Build key map; keys without an id cannot be selected
        let keys: HashMap<String, Jwk> = jwks
            .keys
            .into_iter()
            .filter_map(|key| key.kid.clone().map(|kid| (kid, key)))
            .collect();
        let key_count = keys.len();

        tracing::info!(
            target: "gw.auth.jwks",
            key_count = key_count,
            "JWKS cache refreshed"
        );

        let now = Instant::now();
        let mut cache = self.cache.write().await;
        *cache = Some(CachedJwks {
            keys,
            fetched_at: now,
            expires_at: now + self.cache_ttl,
        });

        Ok(key_count)
    }

    async fn fetch(&self) -> Result<JwksResponse, VerifyError> {
        let response = self
            .http_client
            .get(&self.jwks_url)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(target: "gw.auth.jwks", error = %e, "Failed to fetch JWKS");
                VerifyError::KeySetUnavailable(format!("request failed: {e}"))
            })?;

        if !response.status().is_success() {
            tracing::error!(
                target: "gw.auth.jwks",
                status = %response.status(),
                "JWKS endpoint returned error"
            );
            return Err(VerifyError::KeySetUnavailable(format!(
                "HTTP {}",
                response.status().as_u16()
            )));
        }

        response.json().await.map_err(|e| {
            tracing::error!(target: "gw.auth.jwks", error = %e, "Failed to parse JWKS response");
            VerifyError::KeySetUnavailable(format!("invalid key set: {e}"))
        })
    }

    /// Clear the cache.
    #[cfg(test)]
    pub async fn clear_cache(&self) {
        let mut cache = self.cache.write().await;
        *cache = None;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const CERTS: &str = "/realms/bsw-realm/protocol/openid-connect/certs";

    fn client_for(server: &MockServer) -> JwksClient {
        JwksClient::new(
            format!("{}{}", server.uri(), CERTS),
            Duration::from_secs(3600),
            Duration::from_secs(5),
        )
    }

    fn okp_key(kid: &str) -> serde_json::Value {
        serde_json::json!({
            "kty": "OKP",
            "kid": kid,
            "crv": "Ed25519",
            "x": "11qYAYKxCrfVS_7TyWQHOg7hcvPapiMlrwIaaPcHURo",
            "alg": "EdDSA",
            "use": "sig"
        })
    }

    #[test]
    fn test_jwk_deserialization_rsa() {
        let json = r#"{
            "kid": "rsa-1",
            "kty": "RSA",
            "alg": "RS256",
            "use": "sig",
            "n": "sXchDaQebHnPiGvyDOAT4saGEUetSyo9MKLOoWFsueri23bOdgWp4Dy1WlUzewbgBHod5pcM9H95GQRV3JDXboIRROSBigeC5yjU1hGzHHyXss8UDprecbAYxknTcQkhslANGRUZmdTOQ5qTRsLAt6BTYuyvVRdhS8exSZEy_c4gs_7svlJJQ4H9_NxsiIoLwAEk7-Q3UXERGYw_75IDrGA84-lA_-Ct4eTlXHBIY2EaV7t7LjJaynVJCpkv4LKjTTAumiGUIuQhrNhZLuF_RJLqHpM2kgWFLU7-VTdL1VbC2tejvcI2BlMkEpk1BzBZI0KQB0GaDWFLN-aEAw3vRw",
            "e": "AQAB"
        }"#;

        let jwk: Jwk = serde_json::from_str(json).unwrap();

        assert_eq!(jwk.kty, "RSA");
        assert_eq!(jwk.kid.as_deref(), Some("rsa-1"));
        assert_eq!(jwk.e.as_deref(), Some("AQAB"));
        assert!(jwk.n.is_some());
        assert!(jwk.x.is_none());
        assert_eq!(jwk.key_use.as_deref(), Some("sig"));
    }

    #[test]
    fn test_jwk_deserialization_ec() {
        let json = r#"{
            "kid": "ec-1",
            "kty": "EC",
            "alg": "ES256",
            "crv": "P-256",
            "x": "f83OJ3D2xF1Bg8vub9tLe1gHMzV76e8Tus9uPHvRVEU",
            "y": "x_FEzRu9m36HLN_tue659LNpXW6pCyStikYjKIWI5a0"
        }"#;

        let jwk: Jwk = serde_json::from_str(json).unwrap();

        assert_eq!(jwk.kty, "EC");
        assert_eq!(jwk.crv.as_deref(), Some("P-256"));
        assert!(jwk.x.is_some());
        assert!(jwk.y.is_some());
        assert!(jwk.n.is_none());
    }

    #[test]
    fn test_jwk_deserialization_minimal() {
        let jwk: Jwk = serde_json::from_str(r#"{"kty": "OKP"}"#).unwrap();

        assert_eq!(jwk.kty, "OKP");
        assert!(jwk.kid.is_none());
        assert!(jwk.alg.is_none());
    }

    #[tokio::test]
    async fn test_get_key_fetches_once_and_caches() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(CERTS))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "keys": [okp_key("k1")] })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);

        let first = client.get_key("k1").await.unwrap();
        let second = client.get_key("k1").await.unwrap();

        assert_eq!(first.kid.as_deref(), Some("k1"));
        assert_eq!(second.kid.as_deref(), Some("k1"));
    }

    #[tokio::test]
    async fn test_unknown_kid_refresh_is_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(CERTS))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "keys": [okp_key("k1")] })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);

        assert!(client.get_key("k1").await.is_ok());
        assert_eq!(
            client.get_key("unknown").await.unwrap_err(),
            VerifyError::UnknownKey
        );
    }

    #[tokio::test]
    async fn test_unknown_kid_triggers_refresh_for_rotated_key() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(CERTS))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "keys": [okp_key("old")] })),
            )
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(CERTS))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                serde_json::json!({ "keys": [okp_key("old"), okp_key("new")] }),
            ))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server).with_min_refresh_interval(Duration::ZERO);

        assert!(client.get_key("old").await.is_ok());
        let rotated = client.get_key("new").await.unwrap();
        assert_eq!(rotated.kid.as_deref(), Some("new"));
    }

    #[tokio::test]
    async fn test_fetch_errors_are_key_set_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(CERTS))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client.get_key("k1").await.unwrap_err();

        assert_eq!(err, VerifyError::KeySetUnavailable("HTTP 503".to_string()));
    }

    #[tokio::test]
    async fn test_unparseable_key_set_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(CERTS))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>login</html>"))
            .mount(&server)
            .await;

        let client = client_for(&server);

        assert!(matches!(
            client.ensure_loaded().await,
            Err(VerifyError::KeySetUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_ensure_loaded_counts_keys_and_clear_cache_refetches() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(CERTS))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                serde_json::json!({ "keys": [okp_key("a"), okp_key("b"), {"kty": "RSA"}] }),
            ))
            .expect(2)
            .mount(&server)
            .await;

        let client = client_for(&server);

        assert_eq!(client.ensure_loaded().await.unwrap(), 2);
        assert_eq!(client.ensure_loaded().await.unwrap(), 2);

        client.clear_cache().await;
        assert_eq!(client.ensure_loaded().await.unwrap(), 2);
    }
}
