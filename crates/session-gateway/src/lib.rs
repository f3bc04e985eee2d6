//! Session Gateway Library
//!
//! Token verification and session bridging for the BSW portal:
//!
//! - Verifying identity provider access tokens against the realm key set
//! - Retrying verification with exponential backoff for page-level checks
//! - Exchanging a verified token for the `bsw_access` session cookie
//! - Key source diagnostics for deployments with split internal/public URLs
//!
//! # Architecture
//!
//! ```text
//! routes/mod.rs -> handlers/*.rs -> auth/{guard,retry,verifier,jwks}.rs
//! ```
//!
//! # Modules
//!
//! - `auth` - Key set cache, verifier, retry wrapper, access guard, diagnostics
//! - `config` - Service configuration from environment
//! - `errors` - Error types with HTTP status code mapping
//! - `handlers` - HTTP request handlers
//! - `middleware` - Session authentication and HTTP metrics
//! - `observability` - Prometheus metrics
//! - `routes` - Axum router setup
//! - `session` - Session cookie format and token extraction

pub mod auth;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod observability;
pub mod routes;
pub mod session;
