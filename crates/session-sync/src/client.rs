//! Session exchange client.
//!
//! Talks to the gateway's `/api/session` endpoint: `POST {"token":...}` to
//! establish the cookie session, `DELETE` to end it. The `bsw_access` cookie
//! the gateway sets lands in a shared cookie jar that downstream clients
//! reuse.
//!
//! # Security
//!
//! - The token is held as `SecretString` and never logged
//! - Rejection bodies are logged at trace level only
//! - Every request carries a timeout

use async_trait::async_trait;
use common::secret::{ExposeSecret, SecretString};
use reqwest::cookie::{CookieStore, Jar};
use reqwest::Url;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument, trace, warn};

/// Default request timeout.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(5);

/// Path of the session endpoint below the gateway base URL.
pub const SESSION_PATH: &str = "/api/session";

/// Session cookie set by the gateway.
pub const SESSION_COOKIE_NAME: &str = "bsw_access";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// Transport failure (connect, timeout, body).
    #[error("HTTP client error: {0}")]
    Http(String),

    /// The gateway answered with a non-2xx status.
    #[error("Session exchange rejected with status {status}")]
    Rejected {
        status: u16,
        detail: Option<String>,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Establishes and ends the server-side session.
#[async_trait]
pub trait SessionExchange: Send + Sync {
    async fn establish(&self, token: &SecretString) -> Result<(), SyncError>;
    async fn teardown(&self) -> Result<(), SyncError>;
}

#[derive(Serialize)]
struct EstablishRequest<'a> {
    token: &'a str,
}

/// `reqwest`-based exchange against a gateway base URL.
#[derive(Debug, Clone)]
pub struct HttpSessionClient {
    http_client: reqwest::Client,
    session_url: Url,
    cookie_jar: Arc<Jar>,
}

impl HttpSessionClient {
    /// Client with the default 5 second timeout.
    pub fn new(base_url: &str) -> Result<Self, SyncError> {
        Self::with_timeout(base_url, DEFAULT_HTTP_TIMEOUT)
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self, SyncError> {
        Self::with_cookie_jar(base_url, timeout, Arc::new(Jar::default()))
    }

    /// Client storing the session cookie in `cookie_jar`.
    pub fn with_cookie_jar(
        base_url: &str,
        timeout: Duration,
        cookie_jar: Arc<Jar>,
    ) -> Result<Self, SyncError> {
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(SyncError::Configuration(format!(
                "gateway URL must start with http:// or https://, got '{base_url}'"
            )));
        }

        let session_url = Url::parse(&format!(
            "{}{SESSION_PATH}",
            base_url.trim_end_matches('/')
        ))
        .map_err(|e| SyncError::Configuration(format!("invalid gateway URL '{base_url}': {e}")))?;

        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .cookie_provider(Arc::clone(&cookie_jar))
            .build()
            .map_err(|e| SyncError::Configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http_client,
            session_url,
            cookie_jar,
        })
    }

    pub fn session_url(&self) -> &str {
        self.session_url.as_str()
    }

    /// Jar holding the gateway's cookies, for downstream clients.
    pub fn cookie_jar(&self) -> Arc<Jar> {
        Arc::clone(&self.cookie_jar)
    }

    /// Current `bsw_access` value, if the gateway set one.
    pub fn session_cookie(&self) -> Option<String> {
        let header = self.cookie_jar.cookies(&self.session_url)?;
        let cookies = header.to_str().ok()?;
        cookies
            .split(';')
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, value)| *name == SESSION_COOKIE_NAME && !value.is_empty())
            .map(|(_, value)| value.to_string())
    }
}

#[async_trait]
impl SessionExchange for HttpSessionClient {
    #[instrument(skip_all, name = "sync.client.establish")]
    async fn establish(&self, token: &SecretString) -> Result<(), SyncError> {
        let response = self
            .http_client
            .post(self.session_url.clone())
            .json(&EstablishRequest {
                token: token.expose_secret(),
            })
            .send()
            .await
            .map_err(|e| {
                debug!(target: "sync.client", error = %e, "Session establish request failed");
                SyncError::Http(e.to_string())
            })?;

        check_status(response).await
    }

    #[instrument(skip_all, name = "sync.client.teardown")]
    async fn teardown(&self) -> Result<(), SyncError> {
        let response = self
            .http_client
            .delete(self.session_url.clone())
            .send()
            .await
            .map_err(|e| {
                debug!(target: "sync.client", error = %e, "Session teardown request failed");
                SyncError::Http(e.to_string())
            })?;

        check_status(response).await
    }
}

async fn check_status(response: reqwest::Response) -> Result<(), SyncError> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }

    let body = response.text().await.unwrap_or_else(|e| {
        trace!(target: "sync.client", error = %e, "Failed to read error response body");
        String::new()
    });
    trace!(target: "sync.client", body = %body, "Session rejection response body");
    warn!(target: "sync.client", status = %status, "Session exchange rejected");

    Err(SyncError::Rejected {
        status: status.as_u16(),
        detail: rejection_detail(&body),
    })
}

/// `detail`, else `error`, from a JSON error body.
fn rejection_detail(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .get("detail")
        .or_else(|| value.get("error"))
        .and_then(|v| v.as_str())
        .map(ToString::to_string)
}
