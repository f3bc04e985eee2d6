//! JWT utilities shared by the session gateway and the session sync client.
//!
//! This module provides the token handling that does not need a key:
//! - Size limits for DoS prevention
//! - Key ID extraction from JWT headers
//! - Unverified payload inspection (fingerprinting, expiry lookup)
//! - JWK key material decoding
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing (DoS prevention)
//! - Nothing in this module verifies a signature. Values read with
//!   [`peek_claims`] or [`peek_expiry`] must never be used for an access
//!   decision; they only serve client-side bookkeeping.
//!
//! # Usage
//!
//! ```rust,ignore
//! use common::jwt::{extract_kid, peek_expiry};
//!
//! // Extract key ID for JWKS lookup
//! let kid = extract_kid(token)?;
//!
//! // Read the expiry of a token the client already holds
//! let exp = peek_expiry(token)?;
//! ```

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Constants
// =============================================================================

/// Maximum allowed JWT size in bytes (8KB).
///
/// JWTs larger than this size are rejected BEFORE any parsing or cryptographic
/// operations.
///
/// # Rationale
///
/// - Identity provider access tokens are typically 800-2000 bytes
/// - 8KB leaves room for large role/group claims while preventing abuse
/// - Checked BEFORE base64 decode and signature verification
pub const MAX_JWT_SIZE_BYTES: usize = 8192; // 8KB

/// Maximum allowed leeway for time-based claims (10 minutes).
///
/// Configuration values above this are rejected so a typo cannot turn an
/// expired token into an accepted one for hours.
pub const MAX_LEEWAY: Duration = Duration::from_secs(600);

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur while inspecting a JWT without a key.
///
/// Note: Display messages are intentionally generic. Detailed information is
/// logged at debug level for troubleshooting.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JwtValidationError {
    /// Token size exceeds maximum allowed.
    #[error("The access token is invalid or expired")]
    TokenTooLarge,

    /// Token format is invalid (not a valid JWT structure).
    #[error("The access token is invalid or expired")]
    MalformedToken,

    /// Token is missing required `kid` header.
    #[error("The access token is invalid or expired")]
    MissingKid,
}

// =============================================================================
// Functions
// =============================================================================

/// Split a compact JWS into its three segments after the size check.
fn token_segments(token: &str) -> Result<(&str, &str, &str), JwtValidationError> {
    if token.len() > MAX_JWT_SIZE_BYTES {
        tracing::debug!(
            target: "common.jwt",
            token_size = token.len(),
            max_size = MAX_JWT_SIZE_BYTES,
            "Token rejected: size exceeds maximum allowed"
        );
        return Err(JwtValidationError::TokenTooLarge);
    }

    let mut parts = token.split('.');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(header), Some(payload), Some(signature), None) => Ok((header, payload, signature)),
        _ => {
            tracing::debug!(target: "common.jwt", "Token rejected: invalid JWT format");
            Err(JwtValidationError::MalformedToken)
        }
    }
}

/// Decode one base64url JSON segment of a token.
fn decode_segment<T: DeserializeOwned>(segment: &str) -> Result<T, JwtValidationError> {
    let bytes = URL_SAFE_NO_PAD.decode(segment).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to decode JWT segment base64");
        JwtValidationError::MalformedToken
    })?;

    serde_json::from_slice(&bytes).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to parse JWT segment JSON");
        JwtValidationError::MalformedToken
    })
}

/// Extract the `kid` (key ID) from a JWT header without verifying the signature.
///
/// This is used to look up the correct signing key when the identity provider
/// publishes several keys (e.g., during key rotation).
///
/// # Security
///
/// - Token size is checked BEFORE any parsing
/// - This function does NOT validate the token signature
/// - The `kid` value should only be used for key lookup in a trusted JWKS
///
/// # Errors
///
/// - `TokenTooLarge` - Token exceeds size limit
/// - `MalformedToken` - Token format invalid (wrong structure, bad base64, invalid JSON)
/// - `MissingKid` - Token header missing `kid` field, or `kid` is not a non-empty string
pub fn extract_kid(token: &str) -> Result<String, JwtValidationError> {
    let (header_part, _, _) = token_segments(token)?;
    let header: serde_json::Value = decode_segment(header_part)?;

    // Extract kid as string, rejecting empty values
    header
        .get("kid")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .ok_or(JwtValidationError::MissingKid)
}

/// Deserialize the payload of a JWT WITHOUT verifying it.
///
/// # Errors
///
/// Returns `TokenTooLarge` or `MalformedToken` when the token cannot be split
/// or the payload is not the requested JSON shape.
pub fn peek_claims<T: DeserializeOwned>(token: &str) -> Result<T, JwtValidationError> {
    let (_, payload_part, _) = token_segments(token)?;
    decode_segment(payload_part)
}

#[derive(Deserialize)]
struct ExpiryOnly {
    #[serde(default)]
    exp: Option<i64>,
}

/// Read the `exp` claim of a JWT WITHOUT verifying it.
///
/// Returns `Ok(None)` when the payload has no `exp`.
///
/// # Errors
///
/// Same as [`peek_claims`].
pub fn peek_expiry(token: &str) -> Result<Option<i64>, JwtValidationError> {
    peek_claims::<ExpiryOnly>(token).map(|claims| claims.exp)
}

/// Decode an Ed25519 public key from JWK `x` field (base64url format).
///
/// # Errors
///
/// Returns `base64::DecodeError` if the base64url content cannot be decoded.
///
/// # Example
///
/// ```rust,ignore
/// use common::jwt::decode_ed25519_public_key_jwk;
///
/// let x = jwk.x.as_ref().ok_or("missing x field")?;
/// let key_bytes = decode_ed25519_public_key_jwk(x)?;
/// let decoding_key = DecodingKey::from_ed_der(&key_bytes);
/// ```
pub fn decode_ed25519_public_key_jwk(x_b64url: &str) -> Result<Vec<u8>, base64::DecodeError> {
    URL_SAFE_NO_PAD.decode(x_b64url)
}

// =============================================================================
// Tests
// =============================================================================
