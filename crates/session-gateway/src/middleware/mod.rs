//! Middleware for the session gateway.
//!
//! # Components
//!
//! - `auth` - Session authentication for protected routes
//! - `http_metrics` - Request metrics for every response

pub mod auth;
pub mod http_metrics;

pub use auth::{require_session, AuthState, VerifiedTokenExt};
pub use http_metrics::http_metrics_middleware;
