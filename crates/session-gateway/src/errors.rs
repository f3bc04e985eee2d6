//! Session gateway error types.
//!
//! [`VerifyError`] is the failure taxonomy of token verification.
//! [`GatewayError`] is what handlers return; it maps to HTTP status codes and
//! JSON bodies via the `IntoResponse` impl.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Value of the `WWW-Authenticate` header sent with every 401.
pub const WWW_AUTHENTICATE_VALUE: &str = "Bearer realm=\"bsw\", error=\"invalid_token\"";

/// Whether a verification failure may succeed when tried again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Network or key-source problem; a later attempt can succeed.
    Transient,
    /// Problem with the token itself.
    Permanent,
}

/// Token verification failure.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VerifyError {
    #[error("token missing")]
    TokenMissing,

    #[error("malformed token: {0}")]
    Malformed(String),

    #[error("signature verification failed")]
    SignatureInvalid,

    #[error("token expired")]
    Expired,

    #[error("issuer mismatch")]
    IssuerMismatch,

    #[error("audience mismatch")]
    AudienceMismatch,

    #[error("signing key not found in key set")]
    UnknownKey,

    #[error("key set unavailable: {0}")]
    KeySetUnavailable(String),
}

impl VerifyError {
    /// Transient vs permanent classification used by the retry policy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            VerifyError::KeySetUnavailable(_) => ErrorKind::Transient,
            _ => ErrorKind::Permanent,
        }
    }

    /// Short label used for metrics and log fields.
    pub fn label(&self) -> &'static str {
        match self {
            VerifyError::TokenMissing => "token_missing",
            VerifyError::Malformed(_) => "malformed",
            VerifyError::SignatureInvalid => "signature_invalid",
            VerifyError::Expired => "expired",
            VerifyError::IssuerMismatch => "issuer_mismatch",
            VerifyError::AudienceMismatch => "audience_mismatch",
            VerifyError::UnknownKey => "unknown_key",
            VerifyError::KeySetUnavailable(_) => "key_set_unavailable",
        }
    }
}

/// Session gateway error type.
///
/// Maps to HTTP status codes:
/// - TokenMissing: 400 Bad Request
/// - VerificationFailed, Unauthorized: 401 Unauthorized
/// - SessionEndpoint, Internal: 500 Internal Server Error
/// - ServiceUnavailable: 503 Service Unavailable
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("token missing")]
    TokenMissing,

    #[error("verification failed: {0}")]
    VerificationFailed(String),

    #[error("session endpoint error: {0}")]
    SessionEndpoint(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Internal server error")]
    Internal,
}

impl GatewayError {
    /// Returns the HTTP status code for this error (for metrics recording).
    pub fn status_code(&self) -> u16 {
        match self {
            GatewayError::TokenMissing => 400,
            GatewayError::VerificationFailed(_) | GatewayError::Unauthorized => 401,
            GatewayError::SessionEndpoint(_) | GatewayError::Internal => 500,
            GatewayError::ServiceUnavailable(_) => 503,
        }
    }
}

impl From<VerifyError> for GatewayError {
    fn from(err: VerifyError) -> Self {
        GatewayError::VerificationFailed(err.to_string())
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            GatewayError::TokenMissing => {
                (StatusCode::BAD_REQUEST, json!({ "error": "token missing" }))
            }
            GatewayError::VerificationFailed(detail) => (
                StatusCode::UNAUTHORIZED,
                json!({ "error": "verification_failed", "detail": detail }),
            ),
            GatewayError::SessionEndpoint(detail) => {
                tracing::error!(target: "gw.session", error = %detail, "Session endpoint failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "session_endpoint_error", "detail": detail }),
                )
            }
            GatewayError::Unauthorized => {
                (StatusCode::UNAUTHORIZED, json!({ "error": "unauthorized" }))
            }
            GatewayError::ServiceUnavailable(reason) => {
                // Log actual reason server-side
                tracing::warn!(target: "gw.availability", reason = %reason, "Service unavailable");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    json!({ "error": "service_unavailable" }),
                )
            }
            GatewayError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "error": "internal_error" }),
            ),
        };

        let mut response = (status, Json(body)).into_response();

        // Add WWW-Authenticate header for 401 responses
        if status == StatusCode::UNAUTHORIZED {
            if let Ok(header_value) = WWW_AUTHENTICATE_VALUE.parse() {
                response
                    .headers_mut()
                    .insert("WWW-Authenticate", header_value);
            }
        }

        response
    }
}
