//! Retrying JSON gateway for request/response backend calls.
//!
//! One top-level [`JsonGateway::call`] makes up to `retries + 1` attempts, each
//! under its own deadline, sleeping the policy's backoff in between. 4xx
//! answers are never retried. Nothing is cached across calls.

mod options;

pub use options::CallOptions;

use reqwest::StatusCode;
use serde_json::{Map, Value};

use crate::backend::ServiceCredential;
use crate::error::{classify_transport, upstream_error, ProxyError, UpstreamBody};
use crate::retry::{run_with_retry, AttemptOutcome, RetryPolicy};

pub const TRACE_HEADER: &str = "x-trace-id";

/// Parsed body of a successful call plus call-scoped diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayResponse {
    pub body: Value,
    pub attempts: u32,
    pub trace_id: String,
}

#[derive(Debug, Clone)]
pub struct JsonGateway {
    client: reqwest::Client,
    credential: Option<ServiceCredential>,
    defaults: RetryPolicy,
}

impl JsonGateway {
    /// `defaults` supplies the timeout and backoff schedule; the attempt count
    /// always comes from each call's `retries`.
    pub fn new(
        client: reqwest::Client,
        credential: Option<ServiceCredential>,
        defaults: RetryPolicy,
    ) -> Self {
        Self {
            client,
            credential,
            defaults,
        }
    }

    pub fn policy_for(&self, opts: &CallOptions) -> RetryPolicy {
        let policy = self.defaults.with_retries(opts.retries);
        match opts.timeout {
            Some(t) => policy.with_timeout(t),
            None => policy,
        }
    }

    /// Call `url` and return its parsed JSON body, or a classified error.
    pub async fn call(&self, url: &str, opts: &CallOptions) -> Result<Value, ProxyError> {
        self.call_with_report(url, opts).await.map(|r| r.body)
    }

    pub async fn call_with_report(
        &self,
        url: &str,
        opts: &CallOptions,
    ) -> Result<GatewayResponse, ProxyError> {
        let trace_id = opts
            .trace_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let policy = self.policy_for(opts);
        tracing::debug!(
            %url,
            method = %opts.method,
            max_attempts = policy.max_attempts,
            trace_id = %trace_id,
            "backend call"
        );
        let result = run_with_retry(&policy, |attempt| self.attempt(url, opts, &trace_id, attempt)).await;
        match result {
            Ok(done) => Ok(GatewayResponse {
                body: done.value,
                attempts: done.attempts,
                trace_id,
            }),
            Err(err) => Err(err.with_trace_id(trace_id)),
        }
    }

    async fn attempt(
        &self,
        url: &str,
        opts: &CallOptions,
        trace_id: &str,
        attempt: u32,
    ) -> AttemptOutcome<Value> {
        let mut req = self
            .client
            .request(opts.method.clone(), url)
            .header(TRACE_HEADER, trace_id);
        if let Some(cred) = &self.credential {
            req = cred.apply(req);
        }
        for (name, value) in &opts.headers {
            req = req.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &opts.body {
            req = req.json(body);
        }

        let response = match req.send().await {
            Ok(r) => r,
            Err(e) => return transport_outcome(&e),
        };
        let status = response.status();
        let bytes = match response.bytes().await {
            Ok(b) => b,
            Err(e) => return transport_outcome(&e),
        };
        tracing::debug!(attempt, status = status.as_u16(), len = bytes.len(), "backend answered");

        if status.is_success() {
            return AttemptOutcome::Success(parse_success_body(&bytes));
        }
        let err = upstream_error(
            status.as_u16(),
            UpstreamBody::from_bytes(&bytes, &opts.fallback_message),
        );
        failure(err, status)
    }
}

fn transport_outcome(e: &reqwest::Error) -> AttemptOutcome<Value> {
    let err = classify_transport(e);
    if err.retryable {
        AttemptOutcome::RetryableFailure(err)
    } else {
        AttemptOutcome::TerminalFailure(err)
    }
}

fn failure(err: ProxyError, status: StatusCode) -> AttemptOutcome<Value> {
    if err.retryable && !status.is_client_error() {
        AttemptOutcome::RetryableFailure(err)
    } else {
        AttemptOutcome::TerminalFailure(err)
    }
}

/// Successful bodies that are not JSON count as an empty object.
fn parse_success_body(bytes: &[u8]) -> Value {
    serde_json::from_slice(bytes).unwrap_or_else(|_| Value::Object(Map::new()))
}
