//! Token verification against the identity provider's key set.
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing (DoS prevention)
//! - Only asymmetric algorithms are accepted: RS256/384/512, PS256/384/512,
//!   ES256/384 and EdDSA. `none` and HMAC tokens are rejected before any key
//!   lookup
//! - The token algorithm must match the key type and curve (and the key's
//!   `alg`, when the key advertises one)
//! - Expiration is validated with a configurable leeway (default 0)

use crate::auth::claims::{Claims, VerifiedToken};
use crate::auth::jwks::{Jwk, JwksClient};
use crate::config::Config;
use crate::errors::VerifyError;
use crate::observability::metrics;
use async_trait::async_trait;
use common::jwt::{decode_ed25519_public_key_jwk, extract_kid, JwtValidationError};
use jsonwebtoken::errors::ErrorKind as JwtErrorKind;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::instrument;

/// Anything that can verify a bearer token.
///
/// Implemented by [`TokenVerifier`]; the retry wrapper and access guard
/// only depend on this trait.
#[async_trait]
pub trait TokenVerification: Send + Sync {
    async fn verify(&self, token: &str) -> Result<VerifiedToken, VerifyError>;
}

/// Fires a configuration log line once per instance.
#[derive(Debug, Default)]
pub struct ConfigLogOnce {
    logged: AtomicBool,
}

impl ConfigLogOnce {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `log` if this instance has not logged yet. Returns whether it ran.
    pub fn log_once(&self, log: impl FnOnce()) -> bool {
        if self.logged.swap(true, Ordering::AcqRel) {
            return false;
        }
        log();
        true
    }

    pub fn has_logged(&self) -> bool {
        self.logged.load(Ordering::Acquire)
    }

    /// Arm the instance again.
    pub fn reset(&self) {
        self.logged.store(false, Ordering::Release);
    }
}

/// Verification settings derived from configuration.
#[derive(Debug, Clone)]
pub struct VerifierSettings {
    /// Expected `iss` claim.
    pub issuer: String,

    /// Enables the audience check when set.
    pub client_id: Option<String>,

    /// Fail on audience mismatch instead of warning.
    pub enforce_audience: bool,

    /// Leeway in seconds for `exp`.
    pub leeway_seconds: u64,

    /// Browser-facing base URL (logged only).
    pub public_url: String,

    /// Internal base URL (logged only).
    pub internal_url: String,
}

impl VerifierSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            issuer: config.issuer(),
            client_id: config.client_id.clone(),
            enforce_audience: config.enforce_audience,
            leeway_seconds: config.jwt_leeway_seconds,
            public_url: config.public_url.clone(),
            internal_url: config.internal_url.clone(),
        }
    }
}

/// Token verifier using the configured key set.
pub struct TokenVerifier {
    /// JWKS client for fetching public keys.
    jwks_client: Arc<JwksClient>,

    settings: VerifierSettings,

    config_log: Arc<ConfigLogOnce>,
}

impl TokenVerifier {
    /// Create a new token verifier.
    ///
    /// # Arguments
    ///
    /// * `jwks_client` - Client for fetching public keys
    /// * `settings` - Issuer, audience and leeway settings
    pub fn new(jwks_client: Arc<JwksClient>, settings: VerifierSettings) -> Self {
        Self {
            jwks_client,
            settings,
            config_log: Arc::new(ConfigLogOnce::new()),
        }
    }

    /// Share a one-shot configuration log with other instances.
    pub fn with_config_log(mut self, config_log: Arc<ConfigLogOnce>) -> Self {
        self.config_log = config_log;
        self
    }

    /// Verify a token and return its claims.
    ///
    /// # Checks
    ///
    /// 1. Empty token → `TokenMissing`
    /// 2. Size, structure, `kid` and algorithm → `Malformed`
    /// 3. Key lookup → `UnknownKey` / `KeySetUnavailable`
    /// 4. Signature → `SignatureInvalid`
    /// 5. `exp` → `Expired`
    /// 6. `iss` → `IssuerMismatch`
    /// 7. Audience (only with a client id) → warning, or `AudienceMismatch`
    ///    when enforced
    #[instrument(skip_all, name = "gw.auth.verify")]
    pub async fn verify(&self, token: &str) -> Result<VerifiedToken, VerifyError> {
        self.config_log.log_once(|| {
            tracing::info!(
                target: "gw.auth.verifier",
                public_url = %self.settings.public_url,
                internal_url = %self.settings.internal_url,
                jwks_url = %self.jwks_client.jwks_url(),
                issuer = %self.settings.issuer,
                client_id = ?self.settings.client_id,
                "Token verifier configuration"
            );
        });

        let start = Instant::now();
        let result = self.verify_inner(token).await;

        match &result {
            Ok(_) => {
                tracing::debug!(target: "gw.auth.verifier", "Token verified");
                metrics::record_token_verification("success", start.elapsed());
            }
            Err(e) => {
                tracing::error!(
                    target: "gw.auth.verifier",
                    kind = e.label(),
                    error = %e,
                    "Token verification failed"
                );
                metrics::record_token_verification(e.label(), start.elapsed());
            }
        }

        result
    }

    async fn verify_inner(&self, token: &str) -> Result<VerifiedToken, VerifyError> {
        if token.is_empty() {
            return Err(VerifyError::TokenMissing);
        }

        // Size check and kid extraction happen before anything else is parsed
        let kid = extract_kid(token).map_err(|e| match e {
            JwtValidationError::TokenTooLarge => VerifyError::Malformed("token too large".into()),
            JwtValidationError::MalformedToken => {
                VerifyError::Malformed("invalid token structure".into())
            }
            JwtValidationError::MissingKid => VerifyError::Malformed("missing kid".into()),
        })?;

        let header = decode_header(token).map_err(|e| {
            tracing::debug!(target: "gw.auth.verifier", error = %e, "Token header rejected");
            VerifyError::Malformed("unsupported or invalid header".into())
        })?;
        let alg = supported_algorithm(header.alg)?;

        let jwk = self.jwks_client.get_key(&kid).await?;
        let decoding_key = decoding_key(&jwk, alg)?;

        let mut validation = Validation::new(alg);
        validation.leeway = self.settings.leeway_seconds;
        validation.validate_exp = true;
        // iss and aud are checked below with their own error kinds
        validation.validate_aud = false;

        let claims = decode::<Claims>(token, &decoding_key, &validation)
            .map_err(|e| match e.kind() {
                JwtErrorKind::ExpiredSignature => VerifyError::Expired,
                JwtErrorKind::InvalidSignature | JwtErrorKind::Crypto(_) => {
                    VerifyError::SignatureInvalid
                }
                _ => {
                    tracing::debug!(target: "gw.auth.verifier", error = %e, "Token decode failed");
                    VerifyError::Malformed("invalid claims".into())
                }
            })?
            .claims;

        if claims.iss.as_deref() != Some(self.settings.issuer.as_str()) {
            tracing::debug!(
                target: "gw.auth.verifier",
                expected = %self.settings.issuer,
                actual = ?claims.iss,
                "Issuer mismatch"
            );
            return Err(VerifyError::IssuerMismatch);
        }

        if let Some(client_id) = &self.settings.client_id {
            if !claims.audience_matches(client_id) {
                if self.settings.enforce_audience {
                    return Err(VerifyError::AudienceMismatch);
                }
                tracing::warn!(
                    target: "gw.auth.verifier",
                    client_id = %client_id,
                    aud = ?claims.aud,
                    azp = ?claims.azp,
                    "Token audience does not include client id, accepting"
                );
            }
        }

        Ok(VerifiedToken {
            issuer: self.settings.issuer.clone(),
            audience: claims.aud.clone(),
            claims,
        })
    }
}

#[async_trait]
impl TokenVerification for TokenVerifier {
    async fn verify(&self, token: &str) -> Result<VerifiedToken, VerifyError> {
        TokenVerifier::verify(self, token).await
    }
}

fn supported_algorithm(alg: Algorithm) -> Result<Algorithm, VerifyError> {
    match alg {
        Algorithm::RS256
        | Algorithm::RS384
        | Algorithm::RS512
        | Algorithm::PS256
        | Algorithm::PS384
        | Algorithm::PS512
        | Algorithm::ES256
        | Algorithm::ES384
        | Algorithm::EdDSA => Ok(alg),
        other => {
            tracing::warn!(target: "gw.auth.verifier", alg = ?other, "Rejected token algorithm");
            Err(VerifyError::Malformed("unsupported algorithm".into()))
        }
    }
}

fn is_rsa(alg: Algorithm) -> bool {
    matches!(
        alg,
        Algorithm::RS256
            | Algorithm::RS384
            | Algorithm::RS512
            | Algorithm::PS256
            | Algorithm::PS384
            | Algorithm::PS512
    )
}

/// Curve an EC key must be on for `alg`.
fn ec_curve(alg: Algorithm) -> Option<&'static str> {
    match alg {
        Algorithm::ES256 => Some("P-256"),
        Algorithm::ES384 => Some("P-384"),
        _ => None,
    }
}

/// Build a decoding key from a JWK for the token's algorithm.
fn decoding_key(jwk: &Jwk, alg: Algorithm) -> Result<DecodingKey, VerifyError> {
    let mismatch = || VerifyError::Malformed("algorithm does not match key".into());

    if let Some(key_alg) = &jwk.alg {
        if key_alg.parse::<Algorithm>().ok() != Some(alg) {
            tracing::warn!(target: "gw.auth.verifier", key_alg = %key_alg, token_alg = ?alg, "Token algorithm does not match key");
            return Err(mismatch());
        }
    }

    match jwk.kty.as_str() {
        "RSA" if is_rsa(alg) => {
            let (Some(n), Some(e)) = (&jwk.n, &jwk.e) else {
                tracing::error!(target: "gw.auth.verifier", kid = ?jwk.kid, "RSA JWK missing n or e");
                return Err(VerifyError::Malformed("incomplete key".into()));
            };
            DecodingKey::from_rsa_components(n, e).map_err(|e| {
                tracing::error!(target: "gw.auth.verifier", error = %e, "Invalid RSA key components");
                VerifyError::Malformed("invalid key".into())
            })
        }
        "EC" => {
            let Some(curve) = ec_curve(alg) else {
                tracing::warn!(target: "gw.auth.verifier", kty = "EC", token_alg = ?alg, "Unexpected JWK key type");
                return Err(mismatch());
            };
            if jwk.crv.as_deref() != Some(curve) {
                tracing::warn!(target: "gw.auth.verifier", crv = ?jwk.crv, token_alg = ?alg, "EC curve does not match token algorithm");
                return Err(mismatch());
            }
            let (Some(x), Some(y)) = (&jwk.x, &jwk.y) else {
                tracing::error!(target: "gw.auth.verifier", kid = ?jwk.kid, "EC JWK missing x or y");
                return Err(VerifyError::Malformed("incomplete key".into()));
            };
            DecodingKey::from_ec_components(x, y).map_err(|e| {
                tracing::error!(target: "gw.auth.verifier", error = %e, "Invalid EC key components");
                VerifyError::Malformed("invalid key".into())
            })
        }
        "OKP" if alg == Algorithm::EdDSA => {
            if jwk.crv.as_deref().is_some_and(|crv| crv != "Ed25519") {
                return Err(mismatch());
            }
            let x = jwk.x.as_ref().ok_or_else(|| {
                tracing::error!(target: "gw.auth.verifier", kid = ?jwk.kid, "OKP JWK missing x field");
                VerifyError::Malformed("incomplete key".into())
            })?;
            let public_key_bytes = decode_ed25519_public_key_jwk(x).map_err(|e| {
                tracing::error!(target: "gw.auth.verifier", error = %e, "Invalid public key encoding");
                VerifyError::Malformed("invalid key".into())
            })?;
            Ok(DecodingKey::from_ed_der(&public_key_bytes))
        }
        other => {
            tracing::warn!(target: "gw.auth.verifier", kty = %other, token_alg = ?alg, "Unexpected JWK key type");
            Err(mismatch())
        }
    }
}
