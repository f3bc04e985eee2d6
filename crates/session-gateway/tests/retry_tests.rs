//! Retry wrapper and access guard tests.
//!
//! Uses a scripted verifier and paused tokio time so backoff delays are
//! observed exactly without sleeping.

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]

use async_trait::async_trait;
use session_gateway::auth::{
    verify_with_retry, AccessDecision, AccessGuard, Claims, LoginReason, RetryPolicy,
    TokenVerification, VerifiedToken,
};
use session_gateway::errors::VerifyError;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

/// Verifier returning scripted results and recording when each call happened.
struct ScriptedVerifier {
    script: Mutex<VecDeque<Result<(), VerifyError>>>,
    calls: Mutex<Vec<Instant>>,
}

impl ScriptedVerifier {
    fn new(script: Vec<Result<(), VerifyError>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn always(err: VerifyError) -> Arc<Self> {
        Self::new(vec![Err(err); 16])
    }

    fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Gaps between consecutive calls.
    fn gaps(&self) -> Vec<Duration> {
        let calls = self.calls.lock().unwrap();
        calls.windows(2).map(|w| w[1] - w[0]).collect()
    }
}

#[async_trait]
impl TokenVerification for ScriptedVerifier {
    async fn verify(&self, _token: &str) -> Result<VerifiedToken, VerifyError> {
        self.calls.lock().unwrap().push(Instant::now());
        let next = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(VerifyError::UnknownKey));
        next.map(|()| verified("user-1"))
    }
}

fn verified(sub: &str) -> VerifiedToken {
    let claims: Claims = serde_json::from_value(serde_json::json!({
        "sub": sub,
        "exp": 4_000_000_000_i64,
        "iss": "http://localhost:8082/realms/bsw-realm"
    }))
    .unwrap();

    VerifiedToken {
        issuer: "http://localhost:8082/realms/bsw-realm".to_string(),
        audience: None,
        claims,
    }
}

fn policy(max_attempts: u32, retry_permanent: bool) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        base_delay: Duration::from_millis(100),
        retry_permanent,
    }
}

fn unavailable() -> VerifyError {
    VerifyError::KeySetUnavailable("HTTP 503".to_string())
}

#[tokio::test(start_paused = true)]
async fn test_all_attempts_fail_with_exponential_delays() {
    let verifier = ScriptedVerifier::always(unavailable());

    let result = verify_with_retry(verifier.as_ref(), "token", &policy(3, true)).await;

    assert_eq!(result.unwrap_err(), unavailable());
    assert_eq!(verifier.call_count(), 3);
    assert_eq!(
        verifier.gaps(),
        vec![Duration::from_millis(100), Duration::from_millis(200)]
    );
}

#[tokio::test(start_paused = true)]
async fn test_invalid_signature_exhausts_default_policy_with_backoff() {
    let verifier = ScriptedVerifier::always(VerifyError::SignatureInvalid);
    let started = Instant::now();

    let result = verify_with_retry(verifier.as_ref(), "token", &RetryPolicy::default()).await;

    assert_eq!(result.unwrap_err(), VerifyError::SignatureInvalid);
    assert_eq!(verifier.call_count(), 3);
    assert_eq!(
        verifier.gaps(),
        vec![Duration::from_millis(100), Duration::from_millis(200)]
    );
    // No sleep after the final attempt
    assert_eq!(started.elapsed(), Duration::from_millis(300));
}

#[tokio::test(start_paused = true)]
async fn test_success_after_transient_failure() {
    let verifier = ScriptedVerifier::new(vec![Err(unavailable()), Ok(())]);

    let result = verify_with_retry(verifier.as_ref(), "token", &policy(3, true)).await;

    assert_eq!(result.unwrap().claims.sub, "user-1");
    assert_eq!(verifier.call_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_first_success_makes_single_call() {
    let verifier = ScriptedVerifier::new(vec![Ok(())]);
    let started = Instant::now();

    verify_with_retry(verifier.as_ref(), "token", &policy(5, true))
        .await
        .unwrap();

    assert_eq!(verifier.call_count(), 1);
    assert_eq!(started.elapsed(), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn test_permanent_failures_retried_by_default() {
    let verifier = ScriptedVerifier::always(VerifyError::Expired);

    let result = verify_with_retry(verifier.as_ref(), "token", &RetryPolicy::default()).await;

    assert_eq!(result.unwrap_err(), VerifyError::Expired);
    assert_eq!(verifier.call_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_permanent_failure_stops_when_not_retried() {
    let verifier = ScriptedVerifier::always(VerifyError::SignatureInvalid);

    let result = verify_with_retry(verifier.as_ref(), "token", &policy(5, false)).await;

    assert_eq!(result.unwrap_err(), VerifyError::SignatureInvalid);
    assert_eq!(verifier.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_transient_failure_retried_when_permanent_not_retried() {
    let verifier = ScriptedVerifier::new(vec![
        Err(unavailable()),
        Err(VerifyError::IssuerMismatch),
        Ok(()),
    ]);

    let result = verify_with_retry(verifier.as_ref(), "token", &policy(5, false)).await;

    assert_eq!(result.unwrap_err(), VerifyError::IssuerMismatch);
    assert_eq!(verifier.call_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_zero_attempts_treated_as_one() {
    let verifier = ScriptedVerifier::always(unavailable());

    let result = verify_with_retry(verifier.as_ref(), "token", &policy(0, true)).await;

    assert!(result.is_err());
    assert_eq!(verifier.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_last_error_is_returned() {
    let verifier = ScriptedVerifier::new(vec![
        Err(unavailable()),
        Err(VerifyError::UnknownKey),
        Err(VerifyError::Expired),
    ]);

    let result = verify_with_retry(verifier.as_ref(), "token", &policy(3, true)).await;

    assert_eq!(result.unwrap_err(), VerifyError::Expired);
}

#[tokio::test(start_paused = true)]
async fn test_guard_without_token_never_verifies() {
    let verifier = ScriptedVerifier::new(vec![Ok(())]);
    let guard = AccessGuard::new(verifier.clone(), policy(3, true));

    for token in [None, Some("")] {
        let decision = guard.authorize(token).await;
        assert!(matches!(
            decision,
            AccessDecision::LoginRequired(LoginReason::NoToken)
        ));
    }
    assert_eq!(verifier.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_guard_grants_after_retry() {
    let verifier = ScriptedVerifier::new(vec![Err(unavailable()), Ok(())]);
    let guard = AccessGuard::new(verifier.clone(), policy(3, true));

    let decision = guard.authorize(Some("token")).await;

    match decision {
        AccessDecision::Granted(verified) => assert_eq!(verified.claims.sub, "user-1"),
        other => panic!("expected access, got {other:?}"),
    }
    assert_eq!(verifier.call_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_guard_requires_login_after_exhaustion() {
    let verifier = ScriptedVerifier::always(unavailable());
    let guard = AccessGuard::new(verifier.clone(), policy(3, true));

    let decision = guard.authorize(Some("token")).await;

    assert!(matches!(
        decision,
        AccessDecision::LoginRequired(LoginReason::VerificationFailed)
    ));
    assert_eq!(verifier.call_count(), 3);
}
