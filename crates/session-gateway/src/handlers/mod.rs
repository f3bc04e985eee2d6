//! HTTP request handlers for the session gateway.

pub mod health;
pub mod jwks_probe;
pub mod me;
pub mod metrics;
pub mod session;

pub use health::{health_check, readiness_check};
pub use jwks_probe::probe_key_sources;
pub use me::get_me;
pub use metrics::metrics_handler;
pub use session::{establish_session, session_status, teardown_session};
