//! Access guard for page and API entry points.
//!
//! Turns an optional token into an access decision. Verification failures,
//! after retries, become `LoginRequired`; the guard never returns an error.

use crate::auth::claims::VerifiedToken;
use crate::auth::retry::{verify_with_retry, RetryPolicy};
use crate::auth::verifier::TokenVerification;
use std::sync::Arc;
use tracing::instrument;

/// Why a login is required.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginReason {
    NoToken,
    VerificationFailed,
}

/// Outcome of [`AccessGuard::authorize`].
#[derive(Debug, Clone, PartialEq)]
pub enum AccessDecision {
    Granted(VerifiedToken),
    LoginRequired(LoginReason),
}

impl AccessDecision {
    pub fn is_granted(&self) -> bool {
        matches!(self, AccessDecision::Granted(_))
    }
}

/// Retry-wrapped verification with a login fallback.
#[derive(Clone)]
pub struct AccessGuard {
    verifier: Arc<dyn TokenVerification>,
    policy: RetryPolicy,
}

impl AccessGuard {
    pub fn new(verifier: Arc<dyn TokenVerification>, policy: RetryPolicy) -> Self {
        Self { verifier, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    #[instrument(skip_all, name = "gw.auth.guard")]
    pub async fn authorize(&self, token: Option<&str>) -> AccessDecision {
        let Some(token) = token.filter(|t| !t.is_empty()) else {
            tracing::debug!(target: "gw.auth.guard", "No session token, login required");
            return AccessDecision::LoginRequired(LoginReason::NoToken);
        };

        match verify_with_retry(self.verifier.as_ref(), token, &self.policy).await {
            Ok(verified) => AccessDecision::Granted(verified),
            Err(e) => {
                tracing::info!(target: "gw.auth.guard", error = %e, "Session token rejected, login required");
                AccessDecision::LoginRequired(LoginReason::VerificationFailed)
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::auth::claims::Claims;
    use crate::errors::VerifyError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    struct CountingVerifier {
        calls: AtomicU32,
        succeed: bool,
    }

    #[async_trait]
    impl TokenVerification for CountingVerifier {
        async fn verify(&self, _token: &str) -> Result<VerifiedToken, VerifyError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.succeed {
                return Err(VerifyError::Expired);
            }
            let claims: Claims =
                serde_json::from_value(serde_json::json!({"sub": "u", "exp": 1})).unwrap();
            Ok(VerifiedToken {
                issuer: "iss".to_string(),
                audience: None,
                claims,
            })
        }
    }

    fn guard(succeed: bool) -> (AccessGuard, Arc<CountingVerifier>) {
        let verifier = Arc::new(CountingVerifier {
            calls: AtomicU32::new(0),
            succeed,
        });
        let policy = RetryPolicy {
            max_attempts: 2,
            base_delay: Duration::from_millis(1),
            retry_permanent: true,
        };
        (AccessGuard::new(verifier.clone(), policy), verifier)
    }

    #[tokio::test]
    async fn test_no_token_requires_login_without_verifying() {
        let (guard, verifier) = guard(true);

        assert_eq!(
            guard.authorize(None).await,
            AccessDecision::LoginRequired(LoginReason::NoToken)
        );
        assert_eq!(
            guard.authorize(Some("")).await,
            AccessDecision::LoginRequired(LoginReason::NoToken)
        );
        assert_eq!(verifier.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failure_after_retries_requires_login() {
        let (guard, verifier) = guard(false);

        assert_eq!(
            guard.authorize(Some("token")).await,
            AccessDecision::LoginRequired(LoginReason::VerificationFailed)
        );
        assert_eq!(verifier.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_success_is_granted() {
        let (guard, verifier) = guard(true);

        assert!(guard.authorize(Some("token")).await.is_granted());
        assert_eq!(verifier.calls.load(Ordering::SeqCst), 1);
    }
}
