//! Secret types for keeping bearer tokens out of logs.
//!
//! Re-exports the [`secrecy`] types used across the workspace. Any struct that
//! holds a token for longer than a single call stores it as a
//! [`SecretString`], so deriving `Debug` on it can never print the token.
//!
//! # Example
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretString};
//!
//! #[derive(Debug)]
//! struct HeldIdentity {
//!     username: String,
//!     access_token: SecretString,
//! }
//!
//! let identity = HeldIdentity {
//!     username: "alice".to_string(),
//!     access_token: SecretString::from("eyJhbGciOi..."),
//! };
//!
//! // Safe: the token is redacted
//! println!("{:?}", identity);
//!
//! // Reading the value requires an explicit call
//! let token: &str = identity.access_token.expose_secret();
//! ```
//!
//! Use `SecretString` for:
//! - Access tokens held by the session sync client
//! - Tokens cached between retries
//!
//! Tokens that only pass through a request handler stay plain `&str`; the
//! handler never logs them.

pub use secrecy::{ExposeSecret, SecretString};

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[test]
    fn test_debug_is_redacted() {
        let secret = SecretString::from("eyJhbGciOiJSUzI1NiJ9.payload.sig");
        let debug_str = format!("{secret:?}");

        assert!(debug_str.contains("REDACTED"));
        assert!(!debug_str.contains("eyJhbGciOiJSUzI1NiJ9"));
    }

    #[test]
    fn test_expose_secret_returns_inner_value() {
        let secret = SecretString::from("token-value");
        assert_eq!(secret.expose_secret(), "token-value");
    }

    #[test]
    fn test_deserialize_session_request() {
        #[derive(Debug, Deserialize)]
        struct SessionRequest {
            token: SecretString,
        }

        let json = r#"{"token": "header.payload.signature"}"#;
        let req: SessionRequest = serde_json::from_str(json).expect("deserialize");

        assert_eq!(req.token.expose_secret(), "header.payload.signature");

        let debug = format!("{req:?}");
        assert!(!debug.contains("header.payload.signature"));
        assert!(debug.contains("REDACTED"));
    }
}
