//! JWT claims structure.
//!
//! Contains the claims extracted from verified identity provider tokens. The
//! `sub` field is redacted in Debug output to prevent exposure in logs.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The `aud` claim: a single audience or a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    One(String),
    Many(Vec<String>),
}

impl Audience {
    /// True when `client_id` is (one of) the audience(s).
    pub fn contains(&self, client_id: &str) -> bool {
        match self {
            Audience::One(aud) => aud == client_id,
            Audience::Many(auds) => auds.iter().any(|aud| aud == client_id),
        }
    }
}

/// JWT Claims structure for verified tokens.
///
/// The `sub` field contains the user identifier which should not be exposed
/// in logs. A custom Debug implementation redacts this field. Claims not
/// modelled here are kept in `extra`.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user id) - redacted in Debug output.
    pub sub: String,

    /// Expiration timestamp (Unix epoch seconds).
    pub exp: i64,

    /// Issued-at timestamp (Unix epoch seconds).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,

    /// Issuer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,

    /// Audience.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<Audience>,

    /// Authorized party (the client the token was issued to).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub azp: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_username: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub given_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family_name: Option<String>,

    /// Every other claim.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Custom Debug implementation that redacts the `sub` field.
impl fmt::Debug for Claims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Claims")
            .field("sub", &"[REDACTED]")
            .field("exp", &self.exp)
            .field("iat", &self.iat)
            .field("iss", &self.iss)
            .field("aud", &self.aud)
            .field("azp", &self.azp)
            .field("preferred_username", &self.preferred_username)
            .field("extra_claims", &self.extra.len())
            .finish()
    }
}

impl Claims {
    /// Audience check: passes when `aud` is absent, contains `client_id`, or
    /// `azp` equals `client_id`.
    pub fn audience_matches(&self, client_id: &str) -> bool {
        match &self.aud {
            None => true,
            Some(aud) if aud.contains(client_id) => true,
            Some(_) => self.azp.as_deref() == Some(client_id),
        }
    }
}

/// Result of a successful verification.
#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedToken {
    /// Issuer the token was checked against.
    pub issuer: String,

    /// Audience as carried by the token.
    pub audience: Option<Audience>,

    /// All verified claims.
    pub claims: Claims,
}
