//! Deterministic cryptographic fixtures for testing
//!
//! Provides reproducible Ed25519 keypairs that sign tokens and publish
//! themselves as JWKs. The same seed always produces the same key.
//!
//! ECDSA keypairs are random (ring cannot derive them from a seed) and cover
//! realms configured with ES256/ES384 signing keys.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use ring::rand::SystemRandom;
use ring::signature::{
    EcdsaKeyPair, EcdsaSigningAlgorithm, Ed25519KeyPair, KeyPair,
    ECDSA_P256_SHA256_FIXED_SIGNING, ECDSA_P384_SHA384_FIXED_SIGNING,
};
use thiserror::Error;

/// Test fixture error type
#[derive(Error, Debug)]
pub enum FixtureError {
    #[error("Cryptographic operation failed: {0}")]
    Crypto(String),
}

/// Ed25519 keypair for signing test tokens.
#[derive(Clone)]
pub struct TestKeypair {
    pub kid: String,
    pub public_key_bytes: Vec<u8>,
    private_key_pkcs8: Vec<u8>,
}

impl TestKeypair {
    /// Build a keypair from a seed value (0-255).
    ///
    /// # Example
    /// ```rust,ignore
    /// let keypair = TestKeypair::new(1, "realm-key-1");
    /// let token = keypair.sign(&TestTokenBuilder::new().build());
    /// ```
    pub fn new(seed: u8, kid: &str) -> Self {
        Self::try_new(seed, kid).expect("Failed to create test keypair")
    }

    pub fn try_new(seed: u8, kid: &str) -> Result<Self, FixtureError> {
        let seed_bytes = seed_bytes(seed);

        let key_pair = Ed25519KeyPair::from_seed_unchecked(&seed_bytes).map_err(|e| {
            FixtureError::Crypto(format!("Failed to generate test keypair: {:?}", e))
        })?;

        Ok(Self {
            kid: kid.to_string(),
            public_key_bytes: key_pair.public_key().as_ref().to_vec(),
            private_key_pkcs8: build_pkcs8_from_seed(&seed_bytes),
        })
    }

    /// Sign claims as an EdDSA token carrying this key's `kid`.
    pub fn sign(&self, claims: &serde_json::Value) -> String {
        let mut header = Header::new(Algorithm::EdDSA);
        header.typ = Some("JWT".to_string());
        header.kid = Some(self.kid.clone());
        self.sign_with_header(&header, claims)
    }

    /// Sign claims with a caller-provided header.
    pub fn sign_with_header(&self, header: &Header, claims: &serde_json::Value) -> String {
        let encoding_key = EncodingKey::from_ed_der(&self.private_key_pkcs8);
        encode(header, claims, &encoding_key).expect("Failed to sign token")
    }

    /// Public key as published by the identity provider's certs endpoint.
    pub fn jwk_json(&self) -> serde_json::Value {
        serde_json::json!({
            "kty": "OKP",
            "kid": self.kid,
            "crv": "Ed25519",
            "x": URL_SAFE_NO_PAD.encode(&self.public_key_bytes),
            "alg": "EdDSA",
            "use": "sig"
        })
    }

    /// A key set containing only this key.
    pub fn jwks_json(&self) -> serde_json::Value {
        serde_json::json!({ "keys": [self.jwk_json()] })
    }
}

/// ECDSA keypair (P-256 or P-384) for signing test tokens.
#[derive(Clone)]
pub struct TestEcKeypair {
    pub kid: String,
    pub algorithm: Algorithm,
    /// Uncompressed SEC1 point: `0x04 || x || y`.
    pub public_key_bytes: Vec<u8>,
    private_key_pkcs8: Vec<u8>,
}

impl TestEcKeypair {
    /// Random P-256 keypair signing ES256 tokens.
    pub fn p256(kid: &str) -> Self {
        Self::try_generate(Algorithm::ES256, kid).expect("Failed to create P-256 test keypair")
    }

    /// Random P-384 keypair signing ES384 tokens.
    pub fn p384(kid: &str) -> Self {
        Self::try_generate(Algorithm::ES384, kid).expect("Failed to create P-384 test keypair")
    }

    pub fn try_generate(algorithm: Algorithm, kid: &str) -> Result<Self, FixtureError> {
        let signing: &'static EcdsaSigningAlgorithm = match algorithm {
            Algorithm::ES256 => &ECDSA_P256_SHA256_FIXED_SIGNING,
            Algorithm::ES384 => &ECDSA_P384_SHA384_FIXED_SIGNING,
            other => {
                return Err(FixtureError::Crypto(format!(
                    "Not an ECDSA algorithm: {:?}",
                    other
                )))
            }
        };

        let rng = SystemRandom::new();
        let pkcs8 = EcdsaKeyPair::generate_pkcs8(signing, &rng)
            .map_err(|e| FixtureError::Crypto(format!("Failed to generate EC key: {:?}", e)))?;
        let key_pair = EcdsaKeyPair::from_pkcs8(signing, pkcs8.as_ref(), &rng)
            .map_err(|e| FixtureError::Crypto(format!("Failed to load EC key: {:?}", e)))?;

        Ok(Self {
            kid: kid.to_string(),
            algorithm,
            public_key_bytes: key_pair.public_key().as_ref().to_vec(),
            private_key_pkcs8: pkcs8.as_ref().to_vec(),
        })
    }

    fn curve(&self) -> &'static str {
        match self.algorithm {
            Algorithm::ES384 => "P-384",
            _ => "P-256",
        }
    }

    /// Sign claims with this key's algorithm and `kid`.
    pub fn sign(&self, claims: &serde_json::Value) -> String {
        let mut header = Header::new(self.algorithm);
        header.typ = Some("JWT".to_string());
        header.kid = Some(self.kid.clone());
        let encoding_key = EncodingKey::from_ec_der(&self.private_key_pkcs8);
        encode(&header, claims, &encoding_key).expect("Failed to sign token")
    }

    /// Public key as published by the identity provider's certs endpoint.
    pub fn jwk_json(&self) -> serde_json::Value {
        let coordinates = &self.public_key_bytes[1..];
        let (x, y) = coordinates.split_at(coordinates.len() / 2);
        serde_json::json!({
            "kty": "EC",
            "kid": self.kid,
            "crv": self.curve(),
            "x": URL_SAFE_NO_PAD.encode(x),
            "y": URL_SAFE_NO_PAD.encode(y),
            "alg": format!("{:?}", self.algorithm),
            "use": "sig"
        })
    }
}

fn seed_bytes(seed: u8) -> [u8; 32] {
    let mut seed_bytes = [0u8; 32];
    seed_bytes[0] = seed;
    // Fill rest with deterministic pattern
    for (i, byte) in seed_bytes.iter_mut().enumerate().skip(1) {
        *byte = seed.wrapping_mul(i as u8).wrapping_add(i as u8);
    }
    seed_bytes
}

/// Build PKCS#8 v1 document from Ed25519 seed
///
/// Ring does not expose PKCS#8 for a seeded keypair, so the DER is assembled
/// by hand (RFC 5208 / RFC 8410).
fn build_pkcs8_from_seed(seed: &[u8; 32]) -> Vec<u8> {
    let mut pkcs8 = Vec::with_capacity(48);

    // SEQUENCE, 46 bytes
    pkcs8.extend_from_slice(&[0x30, 0x2e]);
    // version INTEGER 0
    pkcs8.extend_from_slice(&[0x02, 0x01, 0x00]);
    // AlgorithmIdentifier { OID 1.3.101.112 }
    pkcs8.extend_from_slice(&[0x30, 0x05, 0x06, 0x03, 0x2b, 0x65, 0x70]);
    // privateKey OCTET STRING { OCTET STRING seed }
    pkcs8.extend_from_slice(&[0x04, 0x22, 0x04, 0x20]);
    pkcs8.extend_from_slice(seed);

    pkcs8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keypair_is_deterministic() {
        let a = TestKeypair::new(1, "k");
        let b = TestKeypair::new(1, "k");

        assert_eq!(a.public_key_bytes, b.public_key_bytes);
        assert_eq!(a.jwk_json(), b.jwk_json());
    }

    #[test]
    fn test_different_seeds_produce_different_keys() {
        let a = TestKeypair::new(1, "k");
        let b = TestKeypair::new(2, "k");

        assert_ne!(a.public_key_bytes, b.public_key_bytes);
    }

    #[test]
    fn test_pkcs8_is_48_bytes() {
        assert_eq!(build_pkcs8_from_seed(&seed_bytes(7)).len(), 48);
    }

    #[test]
    fn test_signed_token_carries_kid() {
        let keypair = TestKeypair::new(3, "realm-key-3");
        let token = keypair.sign(&serde_json::json!({"sub": "u", "exp": 1}));

        let header = jsonwebtoken::decode_header(&token).unwrap();
        assert_eq!(header.kid.as_deref(), Some("realm-key-3"));
        assert_eq!(header.alg, Algorithm::EdDSA);
    }

    #[test]
    fn test_ec_jwk_splits_coordinates() {
        let p256 = TestEcKeypair::p256("ec-1");
        assert_eq!(p256.public_key_bytes.len(), 65);
        let jwk = p256.jwk_json();
        assert_eq!(jwk["crv"], "P-256");
        assert_eq!(jwk["alg"], "ES256");
        assert_eq!(URL_SAFE_NO_PAD.decode(jwk["y"].as_str().unwrap()).unwrap().len(), 32);

        let p384 = TestEcKeypair::p384("ec-2");
        assert_eq!(p384.jwk_json()["crv"], "P-384");
        assert_eq!(p384.jwk_json()["alg"], "ES384");
    }

    #[test]
    fn test_ec_signed_token_uses_key_algorithm() {
        let keypair = TestEcKeypair::p256("ec-1");
        let token = keypair.sign(&serde_json::json!({"sub": "u", "exp": 1}));

        let header = jsonwebtoken::decode_header(&token).unwrap();
        assert_eq!(header.alg, Algorithm::ES256);
        assert_eq!(header.kid.as_deref(), Some("ec-1"));
    }
}
