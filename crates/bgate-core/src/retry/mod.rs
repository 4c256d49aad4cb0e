//! Retry and backoff policy.
//!
//! `RetryPolicy::decide` is a pure function of the attempt number and its
//! outcome, so one policy value can be shared by concurrent calls. The JSON
//! gateway drives it through [`run_with_retry`]; the stream relay calls
//! `decide` directly because it interleaves progress events with attempts.

mod policy;
mod run;

pub use policy::{AttemptOutcome, RetryDecision, RetryPolicy};
pub use run::{run_with_retry, Attempted};
