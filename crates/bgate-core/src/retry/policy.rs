use std::time::Duration;

use crate::error::ProxyError;

/// What happened on one attempt.
#[derive(Debug)]
pub enum AttemptOutcome<T, E = ProxyError> {
    Success(T),
    /// Transient failure; a repeat may succeed.
    RetryableFailure(E),
    /// A repeat cannot change the result (4xx, identity failures, bad input).
    TerminalFailure(E),
}

/// Decision returned by the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Hand the successful result back to the caller.
    Return,
    /// Stop and surface the failure.
    Throw,
    /// Retry after the given delay.
    RetryAfter(Duration),
}

/// Capped exponential backoff with a per-attempt deadline.
///
/// The delay after failed attempt `n` is `min(backoff_cap, backoff_base * multiplier^(n-1))`,
/// so the delay before attempt `k` (k >= 2) is `min(cap, base * multiplier^(k-2))`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the first).
    pub max_attempts: u32,
    /// Deadline for a single attempt.
    pub per_attempt_timeout: Duration,
    pub backoff_base: Duration,
    /// Upper bound on backoff delay.
    pub backoff_cap: Duration,
    pub multiplier: u32,
}

impl Default for RetryPolicy {
    /// JSON gateway defaults: fail fast, 30s per attempt.
    fn default() -> Self {
        Self {
            max_attempts: 1,
            per_attempt_timeout: Duration::from_secs(30),
            backoff_base: Duration::from_millis(150),
            backoff_cap: Duration::from_secs(5),
            multiplier: 2,
        }
    }
}

impl RetryPolicy {
    /// Stream connect defaults: a generous deadline (first bytes may take
    /// minutes) and a short, capped schedule between cheap connect attempts.
    pub fn stream_connect() -> Self {
        Self {
            max_attempts: 5,
            per_attempt_timeout: Duration::from_secs(600),
            backoff_base: Duration::from_millis(250),
            backoff_cap: Duration::from_secs(2),
            multiplier: 2,
        }
    }

    /// `retries` extra attempts after the first.
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.max_attempts = retries.saturating_add(1);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.per_attempt_timeout = timeout;
        self
    }

    /// Backoff to sleep after failed attempt `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1);
        match self.multiplier.max(1).checked_pow(exp) {
            Some(factor) => self.backoff_base.saturating_mul(factor).min(self.backoff_cap),
            None => self.backoff_cap,
        }
    }

    /// Decide what to do after attempt `attempt` (1-based) produced `outcome`.
    pub fn decide<T, E>(&self, attempt: u32, outcome: &AttemptOutcome<T, E>) -> RetryDecision {
        match outcome {
            AttemptOutcome::Success(_) => RetryDecision::Return,
            AttemptOutcome::TerminalFailure(_) => RetryDecision::Throw,
            AttemptOutcome::RetryableFailure(_) if attempt >= self.max_attempts => {
                RetryDecision::Throw
            }
            AttemptOutcome::RetryableFailure(_) => {
                RetryDecision::RetryAfter(self.delay_after(attempt))
            }
        }
    }
}
