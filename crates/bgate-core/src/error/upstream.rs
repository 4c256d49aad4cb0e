//! Classify non-2xx backend answers.

use serde_json::{Map, Value};

use super::fault::classify_fault;
use super::{ProxyError, ProxyErrorCode, UNREACHABLE_MESSAGE};

pub fn is_retryable_upstream_status(status: u16) -> bool {
    matches!(status, 502 | 503 | 504)
}

/// Diagnostic fields extracted from a backend error body shaped `{error?|detail?}`.
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamBody {
    pub message: String,
    pub detail: Option<Value>,
    pub detail_code: Option<String>,
}

impl UpstreamBody {
    /// Parse raw body bytes. Bodies that are not a JSON object count as `{}`.
    pub fn from_bytes(bytes: &[u8], fallback: &str) -> Self {
        let data = match serde_json::from_slice::<Value>(bytes) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        };
        Self::from_object(&data, fallback)
    }

    pub fn from_object(data: &Map<String, Value>, fallback: &str) -> Self {
        Self {
            message: normalize_message(data, fallback),
            detail: data.get("detail").cloned(),
            detail_code: data
                .get("detail")
                .and_then(Value::as_object)
                .and_then(|d| non_blank(d.get("code")))
                .map(|c| c.trim().to_string()),
        }
    }

    /// True when the message or detail reports a DNS/TLS fault on the backend's side.
    pub fn reports_downstream_fault(&self) -> bool {
        if classify_fault(&self.message).is_downstream_fault() {
            return true;
        }
        match &self.detail {
            Some(Value::String(s)) => classify_fault(s).is_downstream_fault(),
            Some(Value::Object(d)) => {
                let joined = ["message", "error", "detail"]
                    .iter()
                    .filter_map(|k| d.get(*k).and_then(Value::as_str))
                    .collect::<Vec<_>>()
                    .join(" ");
                !joined.is_empty() && classify_fault(&joined).is_downstream_fault()
            }
            _ => false,
        }
    }
}

fn non_blank(v: Option<&Value>) -> Option<&str> {
    v.and_then(Value::as_str).filter(|s| !s.trim().is_empty())
}

fn normalize_message(data: &Map<String, Value>, fallback: &str) -> String {
    if let Some(s) = non_blank(data.get("error")) {
        return s.to_string();
    }
    if let Some(s) = non_blank(data.get("detail")) {
        return s.to_string();
    }
    if let Some(detail) = data.get("detail").and_then(Value::as_object) {
        if let Some(s) = non_blank(detail.get("message")).or_else(|| non_blank(detail.get("error")))
        {
            return s.to_string();
        }
        if let Some(code) = non_blank(detail.get("code")) {
            return format!("{fallback} ({code})");
        }
    }
    fallback.to_string()
}

/// Classify a non-2xx backend response.
///
/// A body reporting a DNS/TLS fault becomes `BACKEND_UNREACHABLE` (502,
/// retryable); any other answer keeps the backend status as `UPSTREAM_ERROR`,
/// retryable only for 502/503/504. Upstream diagnostics are always copied.
pub fn upstream_error(status: u16, body: UpstreamBody) -> ProxyError {
    let mut err = if body.reports_downstream_fault() {
        ProxyError::new(UNREACHABLE_MESSAGE, ProxyErrorCode::BackendUnreachable, 502)
            .with_retryable(true)
    } else {
        ProxyError::new(body.message, ProxyErrorCode::UpstreamError, status)
            .with_retryable(is_retryable_upstream_status(status))
    };
    err.upstream_status = Some(status);
    err.upstream_detail = body.detail;
    err.upstream_detail_code = body.detail_code;
    err
}
