//! Gateway error taxonomy.
//!
//! Every failure the gateway surfaces is a [`ProxyError`]: a message, a code,
//! the HTTP status to answer with, and whether the caller may retry. The
//! classification rules live in [`classify`] (transport failures) and
//! [`upstream`] (non-2xx backend answers); text heuristics are isolated in
//! [`fault`].

mod classify;
mod fault;
mod upstream;

pub use classify::{classify_transport, is_network_failure, RETRYABLE_IO_KINDS};
pub use fault::{classify_fault, FaultKind};
pub use upstream::{is_retryable_upstream_status, upstream_error, UpstreamBody};

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub(crate) const UNREACHABLE_MESSAGE: &str =
    "Could not reach the backend. Confirm it is running and backend_url is correct.";
pub(crate) const TIMEOUT_MESSAGE: &str = "Backend request timed out.";
/// Raised when the gateway has no service credential to call the backend with.
pub const MISSING_CREDENTIAL_MESSAGE: &str = "Backend auth not configured";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProxyErrorCode {
    Unauthorized,
    Forbidden,
    BadRequest,
    SeasonNotFound,
    BackendUnreachable,
    UpstreamTimeout,
    UpstreamError,
    InternalError,
}

impl ProxyErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ProxyErrorCode::Unauthorized => "UNAUTHORIZED",
            ProxyErrorCode::Forbidden => "FORBIDDEN",
            ProxyErrorCode::BadRequest => "BAD_REQUEST",
            ProxyErrorCode::SeasonNotFound => "SEASON_NOT_FOUND",
            ProxyErrorCode::BackendUnreachable => "BACKEND_UNREACHABLE",
            ProxyErrorCode::UpstreamTimeout => "UPSTREAM_TIMEOUT",
            ProxyErrorCode::UpstreamError => "UPSTREAM_ERROR",
            ProxyErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }
}

impl std::fmt::Display for ProxyErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified gateway failure.
///
/// `status` is always a valid HTTP status (100..=599). `retryable` reflects
/// the final classification only; it says nothing about how many attempts
/// were already made.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct ProxyError {
    pub message: String,
    pub code: ProxyErrorCode,
    pub status: u16,
    pub retryable: bool,
    pub upstream_status: Option<u16>,
    pub upstream_detail: Option<Value>,
    pub upstream_detail_code: Option<String>,
    pub trace_id: Option<String>,
}

impl ProxyError {
    pub fn new(message: impl Into<String>, code: ProxyErrorCode, status: u16) -> Self {
        Self {
            message: message.into(),
            code,
            status: valid_status(status),
            retryable: false,
            upstream_status: None,
            upstream_detail: None,
            upstream_detail_code: None,
            trace_id: None,
        }
    }

    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }

    pub fn unauthorized() -> Self {
        Self::new("unauthorized", ProxyErrorCode::Unauthorized, 401)
    }

    pub fn forbidden() -> Self {
        Self::new("forbidden", ProxyErrorCode::Forbidden, 403)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(message, ProxyErrorCode::BadRequest, 400)
    }

    pub fn invalid_season_number() -> Self {
        Self::bad_request("seasonNumber is invalid")
    }

    pub fn season_not_found() -> Self {
        Self::new("season not found", ProxyErrorCode::SeasonNotFound, 404)
    }

    /// The attempt's own deadline fired before the backend answered.
    pub fn timeout() -> Self {
        Self::new(TIMEOUT_MESSAGE, ProxyErrorCode::UpstreamTimeout, 504).with_retryable(true)
    }

    pub fn unreachable() -> Self {
        Self::new(UNREACHABLE_MESSAGE, ProxyErrorCode::BackendUnreachable, 502)
            .with_retryable(true)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(message, ProxyErrorCode::InternalError, 500)
    }

    /// Classify a failure that only carries a message (auth layer, resolver, config).
    pub fn from_message(message: &str) -> Self {
        match message {
            "unauthorized" => Self::unauthorized(),
            "forbidden" => Self::forbidden(),
            "season not found" => Self::season_not_found(),
            "seasonNumber is invalid" => Self::invalid_season_number(),
            other => Self::internal(other),
        }
    }

    /// Public JSON body for non-streaming responses.
    pub fn envelope(&self) -> ErrorEnvelope {
        ErrorEnvelope {
            error: self.message.clone(),
            code: Some(self.code),
            retryable: Some(self.retryable),
            trace_id: self.trace_id.clone(),
            upstream_status: self.upstream_status.filter(|s| *s != 0),
            upstream_detail: self.upstream_detail.clone(),
            upstream_detail_code: self.upstream_detail_code.clone(),
        }
    }
}

fn valid_status(status: u16) -> u16 {
    if (100..=599).contains(&status) {
        status
    } else {
        500
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<ProxyErrorCode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retryable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upstream_status: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upstream_detail: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upstream_detail_code: Option<String>,
}
