//! Retry loop: run an attempt until the policy says return or throw.

use std::future::Future;

use super::policy::{AttemptOutcome, RetryDecision, RetryPolicy};
use crate::error::ProxyError;

/// A successful result plus how many attempts it took.
#[derive(Debug, Clone, PartialEq)]
pub struct Attempted<T> {
    pub value: T,
    pub attempts: u32,
}

/// Runs `attempt_fn` (given the 1-based attempt number) under the policy's
/// per-attempt deadline until it succeeds or the policy stops.
///
/// A deadline that fires counts as a retryable `UPSTREAM_TIMEOUT`. Attempts are
/// strictly sequential; attempt k+1 starts only after attempt k's outcome and
/// the backoff sleep.
pub async fn run_with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    mut attempt_fn: F,
) -> Result<Attempted<T>, ProxyError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = AttemptOutcome<T>>,
{
    let mut attempt = 1u32;
    loop {
        let outcome = match tokio::time::timeout(policy.per_attempt_timeout, attempt_fn(attempt)).await
        {
            Ok(outcome) => outcome,
            Err(_) => AttemptOutcome::RetryableFailure(ProxyError::timeout()),
        };
        let decision = policy.decide(attempt, &outcome);
        match (decision, outcome) {
            (_, AttemptOutcome::Success(value)) => {
                return Ok(Attempted {
                    value,
                    attempts: attempt,
                })
            }
            (RetryDecision::RetryAfter(delay), AttemptOutcome::RetryableFailure(err)) => {
                tracing::warn!(
                    attempt,
                    max_attempts = policy.max_attempts,
                    status = err.status,
                    code = %err.code,
                    delay_ms = delay.as_millis() as u64,
                    "attempt failed, retrying: {}",
                    err
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            (_, AttemptOutcome::RetryableFailure(err) | AttemptOutcome::TerminalFailure(err)) => {
                tracing::debug!(attempt, code = %err.code, "giving up: {}", err);
                return Err(err);
            }
        }
    }
}
