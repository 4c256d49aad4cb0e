use std::time::Duration;

use reqwest::Method;
use serde_json::Value;

/// Per-call settings for [`super::JsonGateway::call`].
#[derive(Debug, Clone)]
pub struct CallOptions {
    pub method: Method,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
    /// Per-attempt deadline; the gateway default when `None`.
    pub timeout: Option<Duration>,
    /// Extra attempts after the first. 0 means fail fast.
    pub retries: u32,
    /// Message used when a backend error body carries none.
    pub fallback_message: String,
    /// Trace id to send as `x-trace-id`; generated when `None`.
    pub trace_id: Option<String>,
}

impl CallOptions {
    pub fn new(fallback_message: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            headers: Vec::new(),
            body: None,
            timeout: None,
            retries: 0,
            fallback_message: fallback_message.into(),
            trace_id: None,
        }
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }
}
