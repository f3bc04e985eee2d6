//! Session gateway configuration.
//!
//! Configuration is loaded from environment variables. Every value has a
//! default so a local stack (identity provider on `localhost:8082`) works
//! without any setup.

use common::jwt::MAX_LEEWAY;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Name of the session cookie carrying the verified access token.
pub const SESSION_COOKIE_NAME: &str = "bsw_access";

/// Default browser-facing identity provider base URL.
pub const DEFAULT_PUBLIC_URL: &str = "http://localhost:8082";

/// Default realm.
pub const DEFAULT_REALM: &str = "bsw-realm";

/// Default key set cache TTL in seconds.
pub const DEFAULT_JWKS_CACHE_TTL_SECONDS: u64 = 3600;

/// Default timeout for outbound HTTP calls in milliseconds.
pub const DEFAULT_HTTP_TIMEOUT_MS: u64 = 5000;

/// Default number of verification attempts made by the access guard.
pub const DEFAULT_VERIFY_MAX_ATTEMPTS: u32 = 3;

/// Upper bound for `VERIFY_MAX_ATTEMPTS`.
pub const MAX_VERIFY_ATTEMPTS: u32 = 10;

/// Default delay before the second verification attempt in milliseconds.
pub const DEFAULT_VERIFY_BASE_DELAY_MS: u64 = 100;

/// Default session cookie max-age in seconds.
pub const DEFAULT_SESSION_COOKIE_MAX_AGE_SECONDS: i64 = 900;

/// Path of the OpenID Connect certs endpoint below `{base}/realms/{realm}`.
pub const CERTS_PATH: &str = "protocol/openid-connect/certs";

/// Session gateway configuration.
#[derive(Clone)]
pub struct Config {
    /// Server bind address (default: "0.0.0.0:3000").
    pub bind_address: String,

    /// Browser-facing identity provider base URL. The expected issuer is
    /// derived from this value.
    pub public_url: String,

    /// Identity provider base URL reachable from this process (container
    /// network). Falls back to `public_url`.
    pub internal_url: String,

    /// Realm identifier.
    pub realm: String,

    /// Client identifier. Enables the audience check when set.
    pub client_id: Option<String>,

    /// Container name of the identity provider, used as an extra
    /// diagnostic candidate.
    pub container_name: Option<String>,

    /// Leeway in seconds applied to `exp` validation.
    pub jwt_leeway_seconds: u64,

    /// How long a fetched key set is reused.
    pub jwks_cache_ttl: Duration,

    /// Timeout applied to every outbound HTTP call.
    pub http_timeout: Duration,

    /// Verification attempts made by the access guard.
    pub verify_max_attempts: u32,

    /// Delay before the second attempt; doubles per attempt.
    pub verify_base_delay: Duration,

    /// Whether permanent verification failures are retried as well.
    pub verify_retry_permanent: bool,

    /// Whether an audience mismatch fails verification.
    pub enforce_audience: bool,

    /// Session cookie max-age in seconds.
    pub session_cookie_max_age_seconds: i64,

    /// Clamp the cookie max-age to the token's remaining lifetime.
    pub session_cookie_clamp_to_token: bool,

    /// Add the `Secure` attribute to the session cookie.
    pub session_cookie_secure: bool,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("bind_address", &self.bind_address)
            .field("public_url", &self.public_url)
            .field("internal_url", &self.internal_url)
            .field("realm", &self.realm)
            .field("client_id", &self.client_id)
            .field("container_name", &self.container_name)
            .field("jwt_leeway_seconds", &self.jwt_leeway_seconds)
            .field("jwks_cache_ttl", &self.jwks_cache_ttl)
            .field("http_timeout", &self.http_timeout)
            .field("verify_max_attempts", &self.verify_max_attempts)
            .field("verify_base_delay", &self.verify_base_delay)
            .field("verify_retry_permanent", &self.verify_retry_permanent)
            .field("enforce_audience", &self.enforce_audience)
            .field(
                "session_cookie_max_age_seconds",
                &self.session_cookie_max_age_seconds,
            )
            .field(
                "session_cookie_clamp_to_token",
                &self.session_cookie_clamp_to_token,
            )
            .field("session_cookie_secure", &self.session_cookie_secure)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid URL configuration: {0}")]
    InvalidUrl(String),

    #[error("Invalid JWT leeway configuration: {0}")]
    InvalidJwtLeeway(String),

    #[error("Invalid duration configuration: {0}")]
    InvalidDuration(String),

    #[error("Invalid retry configuration: {0}")]
    InvalidRetry(String),

    #[error("Invalid session cookie configuration: {0}")]
    InvalidSessionCookie(String),

    #[error("Invalid boolean configuration: {0}")]
    InvalidFlag(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let bind_address = vars
            .get("BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| "0.0.0.0:3000".to_string());

        let public_url = non_empty(vars, "KEYCLOAK_PUBLIC_URL")
            .unwrap_or_else(|| DEFAULT_PUBLIC_URL.to_string());
        validate_base_url("KEYCLOAK_PUBLIC_URL", &public_url)?;

        let internal_url =
            non_empty(vars, "KEYCLOAK_INTERNAL_URL").unwrap_or_else(|| public_url.clone());
        validate_base_url("KEYCLOAK_INTERNAL_URL", &internal_url)?;

        let realm = non_empty(vars, "KEYCLOAK_REALM").unwrap_or_else(|| DEFAULT_REALM.to_string());
        let client_id = non_empty(vars, "KEYCLOAK_CLIENT_ID");
        let container_name = non_empty(vars, "KEYCLOAK_CONTAINER_NAME");

        // Parse JWT leeway with validation
        let jwt_leeway_seconds = if let Some(value_str) = vars.get("JWT_LEEWAY_SECONDS") {
            let value: u64 = value_str.parse().map_err(|e| {
                ConfigError::InvalidJwtLeeway(format!(
                    "JWT_LEEWAY_SECONDS must be a valid non-negative integer, got '{}': {}",
                    value_str, e
                ))
            })?;

            if value > MAX_LEEWAY.as_secs() {
                return Err(ConfigError::InvalidJwtLeeway(format!(
                    "JWT_LEEWAY_SECONDS must not exceed {} seconds, got {}",
                    MAX_LEEWAY.as_secs(),
                    value
                )));
            }

            value
        } else {
            0
        };

        let jwks_cache_ttl = Duration::from_secs(positive_u64(
            vars,
            "JWKS_CACHE_TTL_SECONDS",
            DEFAULT_JWKS_CACHE_TTL_SECONDS,
        )?);

        let http_timeout = Duration::from_millis(positive_u64(
            vars,
            "HTTP_TIMEOUT_MS",
            DEFAULT_HTTP_TIMEOUT_MS,
        )?);

        let verify_max_attempts = if let Some(value_str) = vars.get("VERIFY_MAX_ATTEMPTS") {
            let value: u32 = value_str.parse().map_err(|e| {
                ConfigError::InvalidRetry(format!(
                    "VERIFY_MAX_ATTEMPTS must be a valid positive integer, got '{}': {}",
                    value_str, e
                ))
            })?;

            if value == 0 || value > MAX_VERIFY_ATTEMPTS {
                return Err(ConfigError::InvalidRetry(format!(
                    "VERIFY_MAX_ATTEMPTS must be between 1 and {}, got {}",
                    MAX_VERIFY_ATTEMPTS, value
                )));
            }

            value
        } else {
            DEFAULT_VERIFY_MAX_ATTEMPTS
        };

        let verify_base_delay = if let Some(value_str) = vars.get("VERIFY_BASE_DELAY_MS") {
            let value: u64 = value_str.parse().map_err(|e| {
                ConfigError::InvalidRetry(format!(
                    "VERIFY_BASE_DELAY_MS must be a valid non-negative integer, got '{}': {}",
                    value_str, e
                ))
            })?;
            Duration::from_millis(value)
        } else {
            Duration::from_millis(DEFAULT_VERIFY_BASE_DELAY_MS)
        };

        let verify_retry_permanent = flag(vars, "VERIFY_RETRY_PERMANENT", true)?;
        let enforce_audience = flag(vars, "ENFORCE_AUDIENCE", false)?;

        let session_cookie_max_age_seconds =
            if let Some(value_str) = vars.get("SESSION_COOKIE_MAX_AGE_SECONDS") {
                let value: i64 = value_str.parse().map_err(|e| {
                    ConfigError::InvalidSessionCookie(format!(
                        "SESSION_COOKIE_MAX_AGE_SECONDS must be a valid integer, got '{}': {}",
                        value_str, e
                    ))
                })?;

                if value <= 0 {
                    return Err(ConfigError::InvalidSessionCookie(format!(
                        "SESSION_COOKIE_MAX_AGE_SECONDS must be positive, got {}",
                        value
                    )));
                }

                value
            } else {
                DEFAULT_SESSION_COOKIE_MAX_AGE_SECONDS
            };

        let session_cookie_clamp_to_token = flag(vars, "SESSION_COOKIE_CLAMP_TO_TOKEN", false)?;
        let session_cookie_secure = flag(vars, "SESSION_COOKIE_SECURE", false)?;

        Ok(Config {
            bind_address,
            public_url,
            internal_url,
            realm,
            client_id,
            container_name,
            jwt_leeway_seconds,
            jwks_cache_ttl,
            http_timeout,
            verify_max_attempts,
            verify_base_delay,
            verify_retry_permanent,
            enforce_audience,
            session_cookie_max_age_seconds,
            session_cookie_clamp_to_token,
            session_cookie_secure,
        })
    }

    /// Expected `iss` claim: `{public_url}/realms/{realm}`.
    pub fn issuer(&self) -> String {
        format!("{}/realms/{}", self.public_url.trim_end_matches('/'), self.realm)
    }

    /// Key set URL used by the verifier (internal base).
    pub fn jwks_url(&self) -> String {
        certs_url(&self.internal_url, &self.realm)
    }
}

/// Build the certs endpoint URL for a base URL and realm.
pub fn certs_url(base: &str, realm: &str) -> String {
    format!(
        "{}/realms/{}/{}",
        base.trim_end_matches('/'),
        realm,
        CERTS_PATH
    )
}

fn non_empty(vars: &HashMap<String, String>, key: &str) -> Option<String> {
    vars.get(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn validate_base_url(key: &str, value: &str) -> Result<(), ConfigError> {
    if value.starts_with("http://") || value.starts_with("https://") {
        Ok(())
    } else {
        Err(ConfigError::InvalidUrl(format!(
            "{} must start with http:// or https://, got '{}'",
            key, value
        )))
    }
}

fn positive_u64(
    vars: &HashMap<String, String>,
    key: &str,
    default: u64,
) -> Result<u64, ConfigError> {
    let Some(value_str) = vars.get(key) else {
        return Ok(default);
    };

    let value: u64 = value_str.parse().map_err(|e| {
        ConfigError::InvalidDuration(format!(
            "{} must be a valid positive integer, got '{}': {}",
            key, value_str, e
        ))
    })?;

    if value == 0 {
        return Err(ConfigError::InvalidDuration(format!(
            "{} must be greater than 0",
            key
        )));
    }

    Ok(value)
}

fn flag(vars: &HashMap<String, String>, key: &str, default: bool) -> Result<bool, ConfigError> {
    match vars.get(key).map(|v| v.trim().to_ascii_lowercase()) {
        None => Ok(default),
        Some(v) if v == "true" || v == "1" => Ok(true),
        Some(v) if v == "false" || v == "0" => Ok(false),
        Some(v) => Err(ConfigError::InvalidFlag(format!(
            "{} must be true or false, got '{}'",
            key, v
        ))),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_from_vars_success_with_defaults() {
        let config = Config::from_vars(&HashMap::new()).expect("Config should load successfully");

        assert_eq!(config.bind_address, "0.0.0.0:3000");
        assert_eq!(config.public_url, DEFAULT_PUBLIC_URL);
        assert_eq!(config.internal_url, DEFAULT_PUBLIC_URL);
        assert_eq!(config.realm, DEFAULT_REALM);
        assert!(config.client_id.is_none());
        assert!(config.container_name.is_none());
        assert_eq!(config.jwt_leeway_seconds, 0);
        assert_eq!(config.jwks_cache_ttl, Duration::from_secs(3600));
        assert_eq!(config.http_timeout, Duration::from_secs(5));
        assert_eq!(config.verify_max_attempts, 3);
        assert_eq!(config.verify_base_delay, Duration::from_millis(100));
        assert!(config.verify_retry_permanent);
        assert!(!config.enforce_audience);
        assert_eq!(config.session_cookie_max_age_seconds, 900);
        assert!(!config.session_cookie_clamp_to_token);
        assert!(!config.session_cookie_secure);
    }

    #[test]
    fn test_from_vars_success_with_custom_values() {
        let config = Config::from_vars(&vars(&[
            ("BIND_ADDRESS", "127.0.0.1:9000"),
            ("KEYCLOAK_PUBLIC_URL", "https://login.example.nl/"),
            ("KEYCLOAK_INTERNAL_URL", "http://keycloak:8081"),
            ("KEYCLOAK_REALM", "portal"),
            ("KEYCLOAK_CLIENT_ID", "portal-frontend"),
            ("KEYCLOAK_CONTAINER_NAME", "keycloak"),
            ("JWT_LEEWAY_SECONDS", "30"),
            ("JWKS_CACHE_TTL_SECONDS", "60"),
            ("HTTP_TIMEOUT_MS", "2500"),
            ("VERIFY_MAX_ATTEMPTS", "5"),
            ("VERIFY_BASE_DELAY_MS", "50"),
            ("VERIFY_RETRY_PERMANENT", "false"),
            ("ENFORCE_AUDIENCE", "true"),
            ("SESSION_COOKIE_MAX_AGE_SECONDS", "600"),
            ("SESSION_COOKIE_CLAMP_TO_TOKEN", "1"),
            ("SESSION_COOKIE_SECURE", "TRUE"),
        ]))
        .expect("Config should load successfully");

        assert_eq!(config.bind_address, "127.0.0.1:9000");
        assert_eq!(config.internal_url, "http://keycloak:8081");
        assert_eq!(config.realm, "portal");
        assert_eq!(config.client_id.as_deref(), Some("portal-frontend"));
        assert_eq!(config.container_name.as_deref(), Some("keycloak"));
        assert_eq!(config.jwt_leeway_seconds, 30);
        assert_eq!(config.jwks_cache_ttl, Duration::from_secs(60));
        assert_eq!(config.http_timeout, Duration::from_millis(2500));
        assert_eq!(config.verify_max_attempts, 5);
        assert_eq!(config.verify_base_delay, Duration::from_millis(50));
        assert!(!config.verify_retry_permanent);
        assert!(config.enforce_audience);
        assert_eq!(config.session_cookie_max_age_seconds, 600);
        assert!(config.session_cookie_clamp_to_token);
        assert!(config.session_cookie_secure);
    }

    #[test]
    fn test_issuer_uses_public_url_without_trailing_slash() {
        let config = Config::from_vars(&vars(&[
            ("KEYCLOAK_PUBLIC_URL", "https://login.example.nl/"),
            ("KEYCLOAK_INTERNAL_URL", "http://keycloak:8081/"),
        ]))
        .unwrap();

        assert_eq!(config.issuer(), "https://login.example.nl/realms/bsw-realm");
        assert_eq!(
            config.jwks_url(),
            "http://keycloak:8081/realms/bsw-realm/protocol/openid-connect/certs"
        );
    }

    #[test]
    fn test_internal_url_falls_back_to_public() {
        let config = Config::from_vars(&vars(&[
            ("KEYCLOAK_PUBLIC_URL", "http://localhost:9090"),
            ("KEYCLOAK_INTERNAL_URL", "  "),
        ]))
        .unwrap();

        assert_eq!(config.internal_url, "http://localhost:9090");
    }

    #[test]
    fn test_empty_client_id_is_unset() {
        let config = Config::from_vars(&vars(&[("KEYCLOAK_CLIENT_ID", "")])).unwrap();
        assert!(config.client_id.is_none());
    }

    #[test]
    fn test_rejects_url_without_scheme() {
        let result = Config::from_vars(&vars(&[("KEYCLOAK_PUBLIC_URL", "localhost:8082")]));
        assert!(
            matches!(result, Err(ConfigError::InvalidUrl(msg)) if msg.contains("KEYCLOAK_PUBLIC_URL"))
        );
    }

    #[test]
    fn test_jwt_leeway_rejects_too_large() {
        let result = Config::from_vars(&vars(&[("JWT_LEEWAY_SECONDS", "601")]));
        assert!(
            matches!(result, Err(ConfigError::InvalidJwtLeeway(msg)) if msg.contains("must not exceed 600"))
        );
    }

    #[test]
    fn test_jwt_leeway_rejects_negative() {
        let result = Config::from_vars(&vars(&[("JWT_LEEWAY_SECONDS", "-1")]));
        assert!(matches!(result, Err(ConfigError::InvalidJwtLeeway(_))));
    }

    #[test]
    fn test_cache_ttl_rejects_zero() {
        let result = Config::from_vars(&vars(&[("JWKS_CACHE_TTL_SECONDS", "0")]));
        assert!(
            matches!(result, Err(ConfigError::InvalidDuration(msg)) if msg.contains("must be greater than 0"))
        );
    }

    #[test]
    fn test_max_attempts_bounds() {
        assert!(matches!(
            Config::from_vars(&vars(&[("VERIFY_MAX_ATTEMPTS", "0")])),
            Err(ConfigError::InvalidRetry(_))
        ));
        assert!(matches!(
            Config::from_vars(&vars(&[("VERIFY_MAX_ATTEMPTS", "11")])),
            Err(ConfigError::InvalidRetry(_))
        ));
        assert!(matches!(
            Config::from_vars(&vars(&[("VERIFY_MAX_ATTEMPTS", "three")])),
            Err(ConfigError::InvalidRetry(_))
        ));
    }

    #[test]
    fn test_cookie_max_age_rejects_zero() {
        let result = Config::from_vars(&vars(&[("SESSION_COOKIE_MAX_AGE_SECONDS", "0")]));
        assert!(
            matches!(result, Err(ConfigError::InvalidSessionCookie(msg)) if msg.contains("must be positive"))
        );
    }

    #[test]
    fn test_flag_rejects_garbage() {
        let result = Config::from_vars(&vars(&[("ENFORCE_AUDIENCE", "sometimes")]));
        assert!(
            matches!(result, Err(ConfigError::InvalidFlag(msg)) if msg.contains("ENFORCE_AUDIENCE"))
        );
    }

    #[test]
    fn test_certs_url() {
        assert_eq!(
            certs_url("http://127.0.0.1:8082/", "bsw-realm"),
            "http://127.0.0.1:8082/realms/bsw-realm/protocol/openid-connect/certs"
        );
    }
}
