//! Authentication middleware for protected routes.
//!
//! Takes the token from the `bsw_access` cookie, falling back to an
//! `Authorization: Bearer` header, runs the access guard, and injects the
//! verified token into request extensions.

use crate::auth::{AccessDecision, AccessGuard, VerifiedToken};
use crate::errors::GatewayError;
use crate::session::request_token;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::IntoResponse,
};
use std::sync::Arc;
use tracing::instrument;

/// State for the authentication middleware.
#[derive(Clone)]
pub struct AuthState {
    pub guard: AccessGuard,
}

/// Authentication middleware for API routes.
///
/// # Response
///
/// - 401 `{"error":"unauthorized"}` with WWW-Authenticate when no token is
///   present or verification fails after retries
/// - Otherwise continues with the [`VerifiedToken`] in extensions
#[instrument(skip_all, name = "gw.middleware.auth")]
pub async fn require_session(
    State(state): State<Arc<AuthState>>,
    mut req: Request,
    next: Next,
) -> Result<impl IntoResponse, GatewayError> {
    let token = request_token(req.headers());

    match state.guard.authorize(token.as_deref()).await {
        AccessDecision::Granted(verified) => {
            req.extensions_mut().insert(verified);
            Ok(next.run(req).await)
        }
        AccessDecision::LoginRequired(reason) => {
            tracing::debug!(target: "gw.middleware.auth", reason = ?reason, "Request not authenticated");
            Err(GatewayError::Unauthorized)
        }
    }
}

/// Extension trait for reading the verified token from a request.
pub trait VerifiedTokenExt {
    /// Returns `None` if the auth middleware was not applied to this request.
    fn verified_token(&self) -> Option<&VerifiedToken>;
}

impl<B> VerifiedTokenExt for axum::extract::Request<B> {
    fn verified_token(&self) -> Option<&VerifiedToken> {
        self.extensions().get::<VerifiedToken>()
    }
}
