//! Current user handler.
//!
//! Returns information about the authenticated user from verified claims.

use crate::auth::{Claims, VerifiedToken};
use axum::{Extension, Json};
use serde::Serialize;
use tracing::instrument;

/// Response for `/api/me`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserInfo {
    /// Subject of the token.
    pub user_id: String,

    /// `preferred_username` claim.
    pub username: Option<String>,

    pub name: Option<String>,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
}

impl From<&Claims> for UserInfo {
    fn from(claims: &Claims) -> Self {
        Self {
            user_id: claims.sub.clone(),
            username: claims.preferred_username.clone(),
            name: claims.name.clone(),
            given_name: claims.given_name.clone(),
            family_name: claims.family_name.clone(),
        }
    }
}

/// Handler for GET /api/me
///
/// Requires the session middleware.
///
/// ## Response
///
/// ```json
/// {
///   "user_id": "5f0c...",
///   "username": "jjansen",
///   "name": "Jan Jansen",
///   "given_name": "Jan",
///   "family_name": "Jansen"
/// }
/// ```
#[instrument(skip_all, name = "gw.handlers.me")]
pub async fn get_me(Extension(verified): Extension<VerifiedToken>) -> Json<UserInfo> {
    tracing::debug!(target: "gw.handlers.me", "Returning user info");

    Json(UserInfo::from(&verified.claims))
}
