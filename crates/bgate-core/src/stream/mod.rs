//! SSE streaming relay.
//!
//! One [`StreamRelay::open`] per inbound request. The relay connects to a
//! streaming backend endpoint, retrying the connect under its own policy, then
//! passes backend bytes through verbatim. It injects `progress` events while
//! connecting and a single `error` event on failure:
//!
//! ```text
//! CONNECTING -> (RETRY_WAIT <-> CONNECTING)* -> CONNECTED -> STREAMING -> CLOSED
//!                                            \-> FAILED -> CLOSED
//! ```
//!
//! Once streaming starts nothing is retried; a mid-stream disconnect is
//! reported as a `proxy_stream` error after whatever bytes already went out.

mod event;
mod session;

pub use event::{
    ErrorEvent, ProgressEvent, SseEvent, CHECKPOINT_CONNECTED, CHECKPOINT_CONNECT_WAIT,
    CHECKPOINT_EXHAUSTED, CHECKPOINT_PREFLIGHT_FAILED, STAGE_BACKEND, STAGE_CONNECTING,
    STAGE_STREAM,
};

use std::time::Duration;

use bytes::Bytes;
use reqwest::Method;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;

use crate::backend::ServiceCredential;
use crate::retry::RetryPolicy;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Headers for the outbound event stream. `X-Accel-Buffering: no` keeps
/// intermediaries from holding back progress frames.
pub const SSE_RESPONSE_HEADERS: [(&str, &str); 4] = [
    ("content-type", "text/event-stream"),
    ("cache-control", "no-store, max-age=0"),
    ("connection", "keep-alive"),
    ("x-accel-buffering", "no"),
];

#[derive(Debug, Clone)]
pub struct RelaySettings {
    pub connect: RetryPolicy,
    /// Emit a `connect_wait` progress event this often while a connect attempt is pending.
    pub heartbeat_interval: Option<Duration>,
    /// Longest silence tolerated between backend chunks once streaming.
    pub idle_timeout: Duration,
    /// Health URL probed once before connecting.
    pub preflight_url: Option<String>,
    /// Bounds the preflight probe and the read of a failed connect's error body.
    pub preflight_timeout: Duration,
    pub channel_capacity: usize,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            connect: RetryPolicy::stream_connect(),
            heartbeat_interval: Some(Duration::from_secs(15)),
            idle_timeout: Duration::from_secs(600),
            preflight_url: None,
            preflight_timeout: Duration::from_secs(3),
            channel_capacity: 32,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RelayRequest {
    pub url: String,
    pub method: Method,
    /// JSON body; `{}` is sent when `None`.
    pub body: Option<Value>,
    /// Inbound request id, forwarded on every connect attempt.
    pub request_id: Option<String>,
}

impl RelayRequest {
    pub fn post(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: Method::POST,
            body: None,
            request_id: None,
        }
    }

    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayOutcome {
    /// Backend body ran to completion.
    Completed,
    /// No usable backend response; one `error` event was sent.
    ConnectFailed,
    /// Backend dropped or stalled mid-stream; one `proxy_stream` error was sent.
    StreamFailed,
    /// Our caller stopped reading.
    ClientDisconnected,
}

/// Call-scoped diagnostics for one relay session.
#[derive(Debug, Clone, PartialEq)]
pub struct RelayReport {
    pub request_id: Option<String>,
    pub attempts_used: u32,
    pub backend_status: Option<u16>,
    pub bytes_relayed: u64,
    pub last_error: Option<String>,
    pub outcome: RelayOutcome,
}

/// Outbound body plus the session's report, available once the stream closes.
#[derive(Debug)]
pub struct RelayHandle {
    pub body: ReceiverStream<Bytes>,
    pub report: JoinHandle<RelayReport>,
}

#[derive(Debug, Clone)]
pub struct StreamRelay {
    client: reqwest::Client,
    credential: Option<ServiceCredential>,
    settings: RelaySettings,
}

impl StreamRelay {
    pub fn new(
        client: reqwest::Client,
        credential: Option<ServiceCredential>,
        settings: RelaySettings,
    ) -> Self {
        Self {
            client,
            credential,
            settings,
        }
    }

    pub fn settings(&self) -> &RelaySettings {
        &self.settings
    }

    /// Start a relay session on the current tokio runtime.
    ///
    /// The returned body yields SSE frames and backend bytes and ends exactly
    /// once, when the session reaches CLOSED. Dropping the body cancels the
    /// backend read.
    pub fn open(&self, request: RelayRequest) -> RelayHandle {
        let (tx, rx) = mpsc::channel(self.settings.channel_capacity.max(1));
        let session = session::Session::new(self.clone(), request, tx);
        RelayHandle {
            body: ReceiverStream::new(rx),
            report: tokio::spawn(session.run()),
        }
    }
}
