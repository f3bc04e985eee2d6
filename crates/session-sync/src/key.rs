//! Identity token and sync key.

use common::jwt::peek_expiry;
use common::secret::{ExposeSecret, SecretString};
use std::fmt;

/// Version tag prefixed to every sync key. Bumping it invalidates all
/// persisted keys.
pub const SYNC_KEY_VERSION: &str = "v1";

/// Characters of the token that go into the key.
pub const TOKEN_PREFIX_CHARS: usize = 16;

/// Fingerprint of a (token, expiry) pair.
///
/// Format: `v1:<first 16 chars of token>:<exp>`, with an empty expiry field
/// when the token carries no `exp`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SyncKey(String);

impl SyncKey {
    pub fn derive(token: &str, exp: Option<i64>) -> Self {
        let prefix: String = token.chars().take(TOKEN_PREFIX_CHARS).collect();
        let exp = exp.map(|e| e.to_string()).unwrap_or_default();
        Self(format!("{SYNC_KEY_VERSION}:{prefix}:{exp}"))
    }

    /// Wrap a previously stored key.
    pub fn from_stored(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SyncKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity token held by the client.
#[derive(Debug, Clone)]
pub struct IdentityToken {
    token: SecretString,
    exp: Option<i64>,
}

impl IdentityToken {
    pub fn new(token: impl Into<String>, exp: Option<i64>) -> Self {
        Self {
            token: SecretString::from(token.into()),
            exp,
        }
    }

    /// Read `exp` from the unverified payload.
    ///
    /// The gate only needs a fingerprint; the gateway verifies the token.
    /// An unreadable payload yields no expiry.
    pub fn from_jwt(token: impl Into<String>) -> Self {
        let token = token.into();
        let exp = match peek_expiry(&token) {
            Ok(exp) => exp,
            Err(e) => {
                tracing::debug!(target: "sync.key", error = %e, "Token payload unreadable, no expiry");
                None
            }
        };
        Self::new(token, exp)
    }

    pub fn token(&self) -> &SecretString {
        &self.token
    }

    pub fn exp(&self) -> Option<i64> {
        self.exp
    }

    pub fn is_empty(&self) -> bool {
        self.token.expose_secret().is_empty()
    }

    pub fn sync_key(&self) -> SyncKey {
        SyncKey::derive(self.token.expose_secret(), self.exp)
    }
}
