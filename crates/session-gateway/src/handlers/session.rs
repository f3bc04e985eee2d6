//! Session bridge handlers.
//!
//! Exchange a client-held identity token for the `bsw_access` cookie, remove
//! it again, and report whether the current cookie grants access.

use crate::auth::{AccessDecision, LoginReason};
use crate::errors::GatewayError;
use crate::handlers::me::UserInfo;
use crate::observability::metrics;
use crate::routes::AppState;
use crate::session::cookie_token;
use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::instrument;

/// Body of `POST /api/session`.
#[derive(Deserialize)]
struct SessionRequest {
    #[serde(default)]
    token: Option<String>,
}

/// Response of `GET /api/session`.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub authenticated: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<UserInfo>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>,
}

/// Handler for POST /api/session
///
/// Verifies the token once (no retry) and, on success, sets the session
/// cookie.
///
/// ## Responses
///
/// - `204` with `Set-Cookie: bsw_access=<token>; Path=/; HttpOnly; SameSite=Lax; Max-Age=900`
/// - `400 {"error":"token missing"}` - no verification, no key fetch
/// - `401 {"error":"verification_failed","detail":...}`
/// - `500 {"error":"session_endpoint_error","detail":...}` - unreadable body
#[instrument(skip_all, name = "gw.session.establish")]
pub async fn establish_session(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Response, GatewayError> {
    let request: SessionRequest = serde_json::from_slice(&body).map_err(|e| {
        metrics::record_session_operation("establish", "error");
        GatewayError::SessionEndpoint(e.to_string())
    })?;

    let Some(token) = request.token.filter(|t| !t.is_empty()) else {
        tracing::debug!(target: "gw.session", "Session request without token");
        metrics::record_session_operation("establish", "rejected");
        return Err(GatewayError::TokenMissing);
    };

    let verified = state.verifier.verify(&token).await.map_err(|e| {
        tracing::warn!(target: "gw.session", error = %e, "Session token rejected");
        metrics::record_session_operation("establish", "rejected");
        GatewayError::from(e)
    })?;

    let now = chrono::Utc::now().timestamp();
    let cookie = state
        .cookie
        .establish(&token, Some(verified.claims.exp), now);

    tracing::info!(target: "gw.session", "Session established");
    metrics::record_session_operation("establish", "success");

    Ok((StatusCode::NO_CONTENT, [(header::SET_COOKIE, cookie)]).into_response())
}

/// Handler for DELETE /api/session
///
/// Always `204` with an expiring `bsw_access` cookie, whether or not a
/// session existed.
#[instrument(skip_all, name = "gw.session.teardown")]
pub async fn teardown_session(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    tracing::info!(target: "gw.session", "Session cleared");
    metrics::record_session_operation("teardown", "success");

    (
        StatusCode::NO_CONTENT,
        [(header::SET_COOKIE, state.cookie.teardown())],
    )
}

/// Handler for GET /api/session
///
/// Runs the access guard against the session cookie. Never fails; a missing
/// or rejected cookie reports `login_required`.
#[instrument(skip_all, name = "gw.session.status")]
pub async fn session_status(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Json<SessionStatus> {
    let token = cookie_token(&headers);

    let status = match state.guard.authorize(token.as_deref()).await {
        AccessDecision::Granted(verified) => {
            metrics::record_session_operation("status", "success");
            SessionStatus {
                authenticated: true,
                user: Some(UserInfo::from(&verified.claims)),
                reason: None,
            }
        }
        AccessDecision::LoginRequired(reason) => {
            metrics::record_session_operation(
                "status",
                match reason {
                    LoginReason::NoToken => "no_token",
                    LoginReason::VerificationFailed => "rejected",
                },
            );
            SessionStatus {
                authenticated: false,
                user: None,
                reason: Some("login_required"),
            }
        }
    };

    Json(status)
}
