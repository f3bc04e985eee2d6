//! Authentication for the session gateway.
//!
//! - `jwks` - cached key set of the identity provider
//! - `verifier` - token verification
//! - `retry` - retry wrapper with exponential backoff
//! - `guard` - access decision used by pages and middleware
//! - `discovery` - key source diagnostics

pub mod claims;
pub mod discovery;
pub mod guard;
pub mod jwks;
pub mod retry;
pub mod verifier;

pub use claims::{Audience, Claims, VerifiedToken};
pub use guard::{AccessDecision, AccessGuard, LoginReason};
pub use jwks::JwksClient;
pub use retry::{verify_with_retry, RetryPolicy};
pub use verifier::{ConfigLogOnce, TokenVerification, TokenVerifier, VerifierSettings};
