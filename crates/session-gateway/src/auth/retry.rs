//! Retrying verification with exponential backoff.
//!
//! Attempts are strictly sequential. After failed attempt `n` (1-based) the
//! wrapper sleeps `base_delay * 2^(n-1)` before the next one, so the default
//! policy of 3 attempts sleeps 100ms then 200ms.

use crate::auth::claims::VerifiedToken;
use crate::auth::verifier::TokenVerification;
use crate::config::Config;
use crate::errors::{ErrorKind, VerifyError};
use crate::observability::metrics;
use std::time::Duration;
use tracing::instrument;

/// Retry policy for [`verify_with_retry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts; 0 is treated as 1.
    pub max_attempts: u32,

    /// Delay after the first failed attempt.
    pub base_delay: Duration,

    /// Retry permanent failures as well as transient ones.
    pub retry_permanent: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            retry_permanent: true,
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_attempts: config.verify_max_attempts,
            base_delay: config.verify_base_delay,
            retry_permanent: config.verify_retry_permanent,
        }
    }

    /// Delay after failed attempt `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor)
    }

    fn should_retry(&self, err: &VerifyError) -> bool {
        self.retry_permanent || err.kind() == ErrorKind::Transient
    }
}

/// Verify `token`, retrying failures according to `policy`.
///
/// Returns the first success, or the error of the last attempt made.
#[instrument(skip_all, name = "gw.auth.verify_with_retry", fields(max_attempts = policy.max_attempts))]
pub async fn verify_with_retry<V>(
    verifier: &V,
    token: &str,
    policy: &RetryPolicy,
) -> Result<VerifiedToken, VerifyError>
where
    V: TokenVerification + ?Sized,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        let err = match verifier.verify(token).await {
            Ok(verified) => {
                metrics::record_verify_attempt("success");
                if attempt > 1 {
                    tracing::info!(target: "gw.auth.retry", attempt, "Token verified after retry");
                }
                return Ok(verified);
            }
            Err(err) => err,
        };
        metrics::record_verify_attempt("failure");

        tracing::warn!(
            target: "gw.auth.retry",
            attempt,
            max_attempts,
            error = %err,
            "Verification attempt failed"
        );

        if attempt >= max_attempts {
            tracing::error!(
                target: "gw.auth.retry",
                attempts = attempt,
                error = %err,
                "Verification failed after all attempts"
            );
            return Err(err);
        }

        if !policy.should_retry(&err) {
            tracing::error!(
                target: "gw.auth.retry",
                attempts = attempt,
                error = %err,
                "Permanent verification failure, not retrying"
            );
            return Err(err);
        }

        tokio::time::sleep(policy.delay_after(attempt)).await;
        attempt += 1;
    }
}
