//! Builder patterns for test data construction
//!
//! Provides a fluent API for identity provider style access token claims.

use chrono::{Duration, Utc};
use serde_json::{json, Map, Value};

/// Issuer matching the gateway's default configuration.
pub const DEFAULT_ISSUER: &str = "http://localhost:8082/realms/bsw-realm";

/// Builder for test token claims
///
/// Defaults: issuer [`DEFAULT_ISSUER`], expiry 10 minutes from now, no
/// audience.
///
/// # Example
/// ```rust,ignore
/// let claims = TestTokenBuilder::new()
///     .for_user("5f0c1a2b")
///     .with_username("jjansen")
///     .with_audience("account")
///     .authorized_party("bsw-frontend")
///     .expires_in(600)
///     .build();
/// ```
pub struct TestTokenBuilder {
    sub: String,
    iss: String,
    exp: i64,
    iat: i64,
    aud: Option<Value>,
    azp: Option<String>,
    extra: Map<String, Value>,
}

impl TestTokenBuilder {
    /// Create a new token builder with defaults
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            sub: "test-subject".to_string(),
            iss: DEFAULT_ISSUER.to_string(),
            exp: (now + Duration::seconds(600)).timestamp(),
            iat: now.timestamp(),
            aud: None,
            azp: None,
            extra: Map::new(),
        }
    }

    /// Set the subject
    pub fn for_user(mut self, subject: &str) -> Self {
        self.sub = subject.to_string();
        self
    }

    /// Set the issuer
    pub fn issued_by(mut self, issuer: &str) -> Self {
        self.iss = issuer.to_string();
        self
    }

    /// Set a single audience
    pub fn with_audience(mut self, aud: &str) -> Self {
        self.aud = Some(json!(aud));
        self
    }

    /// Set an audience list
    pub fn with_audiences(mut self, auds: &[&str]) -> Self {
        self.aud = Some(json!(auds));
        self
    }

    /// Set the authorized party (`azp`)
    pub fn authorized_party(mut self, azp: &str) -> Self {
        self.azp = Some(azp.to_string());
        self
    }

    /// Set `preferred_username`
    pub fn with_username(self, username: &str) -> Self {
        self.with_claim("preferred_username", json!(username))
    }

    /// Set `name`, `given_name` and `family_name`
    pub fn with_name(self, given: &str, family: &str) -> Self {
        self.with_claim("name", json!(format!("{given} {family}")))
            .with_claim("given_name", json!(given))
            .with_claim("family_name", json!(family))
    }

    /// Add any other claim
    pub fn with_claim(mut self, key: &str, value: Value) -> Self {
        self.extra.insert(key.to_string(), value);
        self
    }

    /// Set expiration in seconds from now (negative for the past)
    pub fn expires_in(mut self, seconds: i64) -> Self {
        self.exp = (Utc::now() + Duration::seconds(seconds)).timestamp();
        self
    }

    /// Set an absolute expiration timestamp
    pub fn expires_at(mut self, timestamp: i64) -> Self {
        self.exp = timestamp;
        self
    }

    /// Expired one hour ago
    pub fn expired(self) -> Self {
        self.expires_in(-3600)
    }

    /// Build the claims as a JSON value
    pub fn build(self) -> Value {
        let mut claims = self.extra;
        claims.insert("sub".to_string(), json!(self.sub));
        claims.insert("iss".to_string(), json!(self.iss));
        claims.insert("exp".to_string(), json!(self.exp));
        claims.insert("iat".to_string(), json!(self.iat));
        if let Some(aud) = self.aud {
            claims.insert("aud".to_string(), aud);
        }
        if let Some(azp) = self.azp {
            claims.insert("azp".to_string(), json!(azp));
        }
        Value::Object(claims)
    }
}

impl Default for TestTokenBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let claims = TestTokenBuilder::default().build();

        assert_eq!(claims["sub"], "test-subject");
        assert_eq!(claims["iss"], DEFAULT_ISSUER);
        assert!(claims.get("aud").is_none());
        let exp = claims["exp"].as_i64().unwrap();
        assert!(exp > Utc::now().timestamp() + 500);
    }

    #[test]
    fn test_builder_audience_and_profile() {
        let claims = TestTokenBuilder::new()
            .with_audiences(&["account", "bsw-frontend"])
            .authorized_party("bsw-frontend")
            .with_name("Jan", "Jansen")
            .build();

        assert_eq!(claims["aud"][1], "bsw-frontend");
        assert_eq!(claims["azp"], "bsw-frontend");
        assert_eq!(claims["name"], "Jan Jansen");
        assert_eq!(claims["family_name"], "Jansen");
    }

    #[test]
    fn test_builder_expired() {
        let claims = TestTokenBuilder::new().expired().build();
        assert!(claims["exp"].as_i64().unwrap() < Utc::now().timestamp());
    }
}
