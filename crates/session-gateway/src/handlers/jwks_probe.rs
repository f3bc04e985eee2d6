//! Key source diagnostics handler.

use crate::auth::discovery::{ProbeReport, ProbeSummary};
use crate::routes::AppState;
use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;

/// Handler for GET /api/jwks-test
///
/// `200 {"summary":"success","tried":[...]}` when a candidate served a key
/// set, `500 {"summary":"all_failed","tried":[...]}` otherwise.
#[tracing::instrument(skip_all, name = "gw.handlers.jwks_probe")]
pub async fn probe_key_sources(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<ProbeReport>) {
    let report = state.probe.probe().await;

    let status = match report.summary {
        ProbeSummary::Success => StatusCode::OK,
        ProbeSummary::AllFailed => StatusCode::INTERNAL_SERVER_ERROR,
    };

    (status, Json(report))
}
