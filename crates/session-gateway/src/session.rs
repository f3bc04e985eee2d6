//! Session cookie construction and extraction.
//!
//! The header is formatted by hand so the attribute order is stable:
//!
//! ```text
//! bsw_access=<token>; Path=/; HttpOnly; SameSite=Lax; Max-Age=900
//! ```

use crate::config::{Config, SESSION_COOKIE_NAME};
use axum::http::{header, HeaderMap};
use axum_extra::extract::cookie::CookieJar;

/// Cookie attributes that do not depend on the token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionCookieSettings {
    pub max_age_seconds: i64,
    pub clamp_to_token: bool,
    pub secure: bool,
}

impl Default for SessionCookieSettings {
    fn default() -> Self {
        Self {
            max_age_seconds: 900,
            clamp_to_token: false,
            secure: false,
        }
    }
}

impl SessionCookieSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_age_seconds: config.session_cookie_max_age_seconds,
            clamp_to_token: config.session_cookie_clamp_to_token,
            secure: config.session_cookie_secure,
        }
    }

    /// Max-Age for a token expiring at `exp`, evaluated at `now` (epoch seconds).
    ///
    /// Without clamping this is always the configured value. With clamping it
    /// is `min(max_age, exp - now)`, floored at 0.
    pub fn max_age_for(&self, exp: Option<i64>, now: i64) -> i64 {
        match exp {
            Some(exp) if self.clamp_to_token => self.max_age_seconds.min(exp - now).max(0),
            _ => self.max_age_seconds,
        }
    }

    /// `Set-Cookie` value establishing the session.
    pub fn establish(&self, token: &str, exp: Option<i64>, now: i64) -> String {
        self.format(token, self.max_age_for(exp, now))
    }

    /// `Set-Cookie` value removing the session.
    pub fn teardown(&self) -> String {
        self.format("", 0)
    }

    fn format(&self, value: &str, max_age: i64) -> String {
        let mut cookie = format!(
            "{SESSION_COOKIE_NAME}={value}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age}"
        );
        if self.secure {
            cookie.push_str("; Secure");
        }
        cookie
    }
}

/// Session token from the `bsw_access` cookie, if present and non-empty.
pub fn cookie_token(headers: &HeaderMap) -> Option<String> {
    CookieJar::from_headers(headers)
        .get(SESSION_COOKIE_NAME)
        .map(|cookie| cookie.value().to_string())
        .filter(|value| !value.is_empty())
}

/// Token from an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

/// Cookie first, then bearer header.
pub fn request_token(headers: &HeaderMap) -> Option<String> {
    cookie_token(headers).or_else(|| bearer_token(headers))
}
