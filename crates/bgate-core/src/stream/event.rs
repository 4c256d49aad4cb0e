//! Synthetic SSE events the relay injects around the backend payload.

use bytes::Bytes;
use serde::Serialize;

use crate::error::ProxyErrorCode;

pub const STAGE_CONNECTING: &str = "proxy_connecting";
pub const STAGE_BACKEND: &str = "backend";
pub const STAGE_STREAM: &str = "proxy_stream";

pub const CHECKPOINT_CONNECT_WAIT: &str = "connect_wait";
pub const CHECKPOINT_CONNECTED: &str = "proxy_connected";
pub const CHECKPOINT_EXHAUSTED: &str = "connect_exhausted";
pub const CHECKPOINT_PREFLIGHT_FAILED: &str = "backend_preflight_failed";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressEvent {
    pub stage: &'static str,
    pub message: String,
    pub current: u32,
    pub total: u32,
    pub attempt: u32,
    pub max_attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retrying: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connected: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkpoint: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed_ms: Option<u64>,
}

impl ProgressEvent {
    /// Announces connect attempt `attempt` of `max_attempts`.
    pub fn connecting(attempt: u32, max_attempts: u32) -> Self {
        let retrying = attempt > 1;
        let message = if retrying {
            format!("Retrying backend connection (attempt {attempt}/{max_attempts})")
        } else {
            format!("Connecting to backend (attempt {attempt}/{max_attempts})")
        };
        Self {
            stage: STAGE_CONNECTING,
            message,
            current: attempt,
            total: max_attempts,
            attempt,
            max_attempts,
            retrying: Some(retrying),
            connected: None,
            checkpoint: None,
            elapsed_ms: None,
        }
    }

    pub fn waiting(attempt: u32, max_attempts: u32, elapsed_ms: u64) -> Self {
        Self {
            message: format!("Waiting for backend response ({}s)", elapsed_ms / 1000),
            retrying: None,
            checkpoint: Some(CHECKPOINT_CONNECT_WAIT),
            elapsed_ms: Some(elapsed_ms),
            ..Self::connecting(attempt, max_attempts)
        }
    }

    pub fn connected(attempt: u32, max_attempts: u32) -> Self {
        Self {
            message: "Connected to backend".to_string(),
            retrying: None,
            connected: Some(true),
            checkpoint: Some(CHECKPOINT_CONNECTED),
            ..Self::connecting(attempt, max_attempts)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorEvent {
    pub stage: &'static str,
    pub error: String,
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<ProxyErrorCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retryable: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkpoint: Option<&'static str>,
}

impl ErrorEvent {
    pub fn new(stage: &'static str, error: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            stage,
            error: error.into(),
            detail: detail.into(),
            status: None,
            code: None,
            retryable: None,
            checkpoint: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SseEvent {
    Progress(ProgressEvent),
    Error(ErrorEvent),
}

impl SseEvent {
    pub fn name(&self) -> &'static str {
        match self {
            SseEvent::Progress(_) => "progress",
            SseEvent::Error(_) => "error",
        }
    }

    /// `event: <name>\ndata: <json>\n\n`.
    pub fn to_frame(&self) -> Bytes {
        let data = match self {
            SseEvent::Progress(p) => serde_json::to_string(p),
            SseEvent::Error(e) => serde_json::to_string(e),
        }
        .unwrap_or_else(|_| "{}".to_string());
        Bytes::from(format!("event: {}\ndata: {}\n\n", self.name(), data))
    }
}
