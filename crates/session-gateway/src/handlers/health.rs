//! Health check handlers.
//!
//! - `/health`: Liveness probe - returns OK if the process is running
//! - `/ready`: Readiness probe - the verifier's key set can be loaded

use crate::routes::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;
use std::sync::Arc;

/// Readiness probe response.
#[derive(Debug, Clone, Serialize)]
pub struct ReadinessResponse {
    /// "ready" or "not_ready".
    pub status: &'static str,

    /// "available" or "unavailable".
    pub jwks: &'static str,

    /// Number of cached signing keys.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_count: Option<usize>,

    /// Generic error message, never infrastructure details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Liveness probe handler.
///
/// Does NOT check any dependencies.
pub async fn health_check() -> &'static str {
    "OK"
}

/// Readiness probe handler.
///
/// Returns 200 when the key set is cached or can be fetched, 503 otherwise.
/// The actual failure is logged server-side.
#[tracing::instrument(skip_all, name = "gw.health.readiness")]
pub async fn readiness_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.jwks_client.ensure_loaded().await {
        Ok(key_count) => (
            StatusCode::OK,
            Json(ReadinessResponse {
                status: "ready",
                jwks: "available",
                key_count: Some(key_count),
                error: None,
            }),
        ),
        Err(e) => {
            tracing::warn!(target: "gw.health", error = %e, "Readiness check failed: key set unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ReadinessResponse {
                    status: "not_ready",
                    jwks: "unavailable",
                    key_count: None,
                    error: Some("Service dependencies unavailable".to_string()),
                }),
            )
        }
    }
}
