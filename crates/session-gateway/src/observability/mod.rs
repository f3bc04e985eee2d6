//! Observability module for the session gateway.
//!
//! Provides metrics definitions and the Prometheus recorder setup.

pub mod metrics;
