//! One relay session: connect phase, then passthrough.

use std::time::Duration;

use bytes::Bytes;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};

use super::event::{
    ErrorEvent, ProgressEvent, SseEvent, CHECKPOINT_EXHAUSTED, CHECKPOINT_PREFLIGHT_FAILED,
    STAGE_BACKEND, STAGE_CONNECTING, STAGE_STREAM,
};
use super::{RelayOutcome, RelayReport, RelayRequest, StreamRelay, REQUEST_ID_HEADER};
use crate::error::{classify_transport, is_retryable_upstream_status, ProxyError};
use crate::retry::{AttemptOutcome, RetryDecision};

/// The outbound receiver was dropped.
struct ClientGone;

/// Why a connect attempt did not yield a usable response.
enum ConnectFailure {
    /// The backend answered with a non-2xx status.
    Response(reqwest::Response),
    /// No answer: timeout or transport error.
    Network(ProxyError),
}

type ConnectOutcome = AttemptOutcome<reqwest::Response, ConnectFailure>;

const DISABLED_HEARTBEAT: Duration = Duration::from_secs(3600);

pub(super) struct Session {
    relay: StreamRelay,
    request: RelayRequest,
    tx: mpsc::Sender<Bytes>,
    report: RelayReport,
    /// Last bytes relayed from the backend; a fresh session counts as a frame boundary.
    tail: [u8; 4],
}

impl Session {
    pub(super) fn new(relay: StreamRelay, request: RelayRequest, tx: mpsc::Sender<Bytes>) -> Self {
        let report = RelayReport {
            request_id: request.request_id.clone(),
            attempts_used: 0,
            backend_status: None,
            bytes_relayed: 0,
            last_error: None,
            outcome: RelayOutcome::ConnectFailed,
        };
        Self {
            relay,
            request,
            tx,
            report,
            tail: *b"\n\n\n\n",
        }
    }

    /// Drive the session to CLOSED. The outbound stream closes when `self`
    /// (and with it the sender) is dropped at the end of this call.
    pub(super) async fn run(mut self) -> RelayReport {
        let outcome = match self.drive().await {
            Ok(outcome) => outcome,
            Err(ClientGone) => RelayOutcome::ClientDisconnected,
        };
        self.report.outcome = outcome;
        tracing::info!(
            request_id = self.report.request_id.as_deref().unwrap_or("-"),
            attempts = self.report.attempts_used,
            bytes = self.report.bytes_relayed,
            outcome = ?outcome,
            "relay closed"
        );
        self.report
    }

    async fn drive(&mut self) -> Result<RelayOutcome, ClientGone> {
        if let Some(url) = self.relay.settings.preflight_url.clone() {
            if let Err(detail) = self.preflight(&url).await {
                self.report.last_error = Some(detail.clone());
                let mut event = ErrorEvent::new(STAGE_CONNECTING, "Backend is not responding", detail);
                event.checkpoint = Some(CHECKPOINT_PREFLIGHT_FAILED);
                event.retryable = Some(true);
                self.emit(SseEvent::Error(event)).await?;
                return Ok(RelayOutcome::ConnectFailed);
            }
        }

        let response = match self.connect().await? {
            Ok(response) => response,
            Err(event) => {
                self.emit(SseEvent::Error(event)).await?;
                return Ok(RelayOutcome::ConnectFailed);
            }
        };

        if response.content_length() == Some(0) {
            let mut event = ErrorEvent::new(
                STAGE_BACKEND,
                "No response body from backend",
                format!("HTTP {}", response.status().as_u16()),
            );
            event.status = Some(502);
            self.emit(SseEvent::Error(event)).await?;
            return Ok(RelayOutcome::ConnectFailed);
        }

        let max = self.relay.settings.connect.max_attempts;
        self.emit(SseEvent::Progress(ProgressEvent::connected(self.report.attempts_used, max)))
            .await?;
        self.pump(response).await
    }

    async fn emit(&self, event: SseEvent) -> Result<(), ClientGone> {
        self.tx.send(event.to_frame()).await.map_err(|_| ClientGone)
    }

    /// Emit after backend bytes: close an unfinished backend frame first so the
    /// injected event parses on its own.
    async fn emit_after_payload(&self, event: SseEvent) -> Result<(), ClientGone> {
        if !ends_frame(&self.tail) {
            self.tx
                .send(Bytes::from_static(b"\n\n"))
                .await
                .map_err(|_| ClientGone)?;
        }
        self.emit(event).await
    }

    async fn preflight(&self, url: &str) -> Result<(), String> {
        let req = self
            .relay
            .client
            .get(url)
            .timeout(self.relay.settings.preflight_timeout);
        match req.send().await {
            Ok(r) if r.status().is_success() => Ok(()),
            Ok(r) => Err(format!("health check returned HTTP {}", r.status().as_u16())),
            Err(e) => Err(classify_transport(&e).message),
        }
    }

    fn build_request(&self) -> reqwest::RequestBuilder {
        let mut req = self
            .relay
            .client
            .request(self.request.method.clone(), &self.request.url)
            .header(reqwest::header::ACCEPT, "text/event-stream");
        if let Some(cred) = &self.relay.credential {
            req = cred.apply(req);
        }
        if let Some(id) = &self.request.request_id {
            req = req.header(REQUEST_ID_HEADER, id.as_str());
        }
        let body = self
            .request
            .body
            .clone()
            .unwrap_or_else(|| serde_json::json!({}));
        req.json(&body)
    }

    /// CONNECTING / RETRY_WAIT. `Ok(Err(event))` is FAILED with the one error event to send.
    async fn connect(&mut self) -> Result<Result<reqwest::Response, ErrorEvent>, ClientGone> {
        let policy = self.relay.settings.connect;
        let mut attempt = 1u32;
        loop {
            self.emit(SseEvent::Progress(ProgressEvent::connecting(attempt, policy.max_attempts)))
                .await?;
            let outcome = self.connect_attempt(attempt).await?;
            self.report.attempts_used = attempt;

            match (policy.decide(attempt, &outcome), outcome) {
                (_, AttemptOutcome::Success(response)) => {
                    self.report.backend_status = Some(response.status().as_u16());
                    tracing::info!(attempt, url = %self.request.url, "backend stream connected");
                    return Ok(Ok(response));
                }
                (RetryDecision::RetryAfter(delay), AttemptOutcome::RetryableFailure(failure)) => {
                    let reason = describe(&failure);
                    tracing::warn!(
                        attempt,
                        max_attempts = policy.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "stream connect failed, retrying: {}",
                        reason
                    );
                    self.report.last_error = Some(reason);
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = self.tx.closed() => return Err(ClientGone),
                    }
                    attempt += 1;
                }
                (_, AttemptOutcome::RetryableFailure(failure)) => {
                    self.report.last_error = Some(describe(&failure));
                    return Ok(Err(self.failure_event(failure, true).await));
                }
                (_, AttemptOutcome::TerminalFailure(failure)) => {
                    self.report.last_error = Some(describe(&failure));
                    return Ok(Err(self.failure_event(failure, false).await));
                }
            }
        }
    }

    /// One connect attempt under the per-attempt deadline, with heartbeats
    /// while it is pending.
    async fn connect_attempt(&self, attempt: u32) -> Result<ConnectOutcome, ClientGone> {
        let settings = &self.relay.settings;
        let max = settings.connect.max_attempts;
        let started = Instant::now();
        let deadline = tokio::time::sleep(settings.connect.per_attempt_timeout);
        let heartbeat_on = settings.heartbeat_interval.is_some();
        let period = settings.heartbeat_interval.unwrap_or(DISABLED_HEARTBEAT).max(Duration::from_millis(1));
        let mut heartbeat = tokio::time::interval_at(started + period, period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let send = self.build_request().send();
        tokio::pin!(deadline);
        tokio::pin!(send);

        loop {
            tokio::select! {
                res = &mut send => {
                    return Ok(match res {
                        Ok(r) if r.status().is_success() => AttemptOutcome::Success(r),
                        Ok(r) if r.status().is_server_error() => {
                            AttemptOutcome::RetryableFailure(ConnectFailure::Response(r))
                        }
                        Ok(r) => AttemptOutcome::TerminalFailure(ConnectFailure::Response(r)),
                        Err(e) => {
                            let err = classify_transport(&e);
                            if err.retryable {
                                AttemptOutcome::RetryableFailure(ConnectFailure::Network(err))
                            } else {
                                AttemptOutcome::TerminalFailure(ConnectFailure::Network(err))
                            }
                        }
                    });
                }
                _ = &mut deadline => {
                    return Ok(AttemptOutcome::RetryableFailure(ConnectFailure::Network(ProxyError::timeout())));
                }
                _ = heartbeat.tick(), if heartbeat_on => {
                    let elapsed = started.elapsed().as_millis() as u64;
                    self.emit(SseEvent::Progress(ProgressEvent::waiting(attempt, max, elapsed))).await?;
                }
            }
        }
    }

    /// `exhausted` marks a retryable failure that used up the attempt budget;
    /// those report against the connect phase, other refusals against the backend.
    async fn failure_event(&self, failure: ConnectFailure, exhausted: bool) -> ErrorEvent {
        match failure {
            ConnectFailure::Response(response) => {
                let status = response.status().as_u16();
                let text = tokio::time::timeout(self.relay.settings.preflight_timeout, response.text())
                    .await
                    .ok()
                    .and_then(Result::ok)
                    .map(|t| t.trim().to_string())
                    .unwrap_or_default();
                let detail = if text.is_empty() {
                    format!("HTTP {status}")
                } else {
                    text
                };
                let mut event = if exhausted {
                    let mut event = ErrorEvent::new(STAGE_CONNECTING, "Backend fetch failed", detail);
                    event.checkpoint = Some(CHECKPOINT_EXHAUSTED);
                    event
                } else {
                    ErrorEvent::new(STAGE_BACKEND, "Backend request failed", detail)
                };
                event.status = Some(status);
                event.retryable = Some(is_retryable_upstream_status(status));
                event
            }
            ConnectFailure::Network(err) => {
                let mut event =
                    ErrorEvent::new(STAGE_CONNECTING, "Backend fetch failed", err.message.clone());
                event.status = Some(err.status);
                event.code = Some(err.code);
                event.retryable = Some(err.retryable);
                if exhausted {
                    event.checkpoint = Some(CHECKPOINT_EXHAUSTED);
                }
                event
            }
        }
    }

    /// STREAMING: relay chunks verbatim until the body ends, fails, or stalls.
    async fn pump(&mut self, response: reqwest::Response) -> Result<RelayOutcome, ClientGone> {
        let idle = self.relay.settings.idle_timeout;
        let mut body = response.bytes_stream();
        loop {
            let next = tokio::select! {
                next = tokio::time::timeout(idle, body.next()) => next,
                _ = self.tx.closed() => return Err(ClientGone),
            };
            match next {
                Ok(Some(Ok(chunk))) => {
                    if chunk.is_empty() {
                        continue;
                    }
                    self.report.bytes_relayed += chunk.len() as u64;
                    self.tail = next_tail(self.tail, &chunk);
                    self.tx.send(chunk).await.map_err(|_| ClientGone)?;
                }
                Ok(None) => return Ok(RelayOutcome::Completed),
                Ok(Some(Err(e))) => {
                    tracing::warn!(bytes = self.report.bytes_relayed, "backend stream interrupted: {}", e);
                    self.report.last_error = Some(e.to_string());
                    let event = ErrorEvent::new(STAGE_STREAM, "Backend stream interrupted", e.to_string());
                    self.emit_after_payload(SseEvent::Error(event)).await?;
                    return Ok(RelayOutcome::StreamFailed);
                }
                Err(_) => {
                    let detail = format!("no data from backend for {}ms", idle.as_millis());
                    tracing::warn!(bytes = self.report.bytes_relayed, "{}", detail);
                    self.report.last_error = Some(detail.clone());
                    let event = ErrorEvent::new(STAGE_STREAM, "Backend stream stalled", detail);
                    self.emit_after_payload(SseEvent::Error(event)).await?;
                    return Ok(RelayOutcome::StreamFailed);
                }
            }
        }
    }
}

fn next_tail(prev: [u8; 4], chunk: &[u8]) -> [u8; 4] {
    let mut tail = prev;
    for &b in chunk.iter().skip(chunk.len().saturating_sub(4)) {
        tail.rotate_left(1);
        tail[3] = b;
    }
    tail
}

/// An SSE event ends with a blank line: `\n\n`, `\r\r` or `\r\n\r\n`.
fn ends_frame(tail: &[u8; 4]) -> bool {
    tail.ends_with(b"\n\n") || tail.ends_with(b"\r\r") || tail == b"\r\n\r\n"
}

fn describe(failure: &ConnectFailure) -> String {
    match failure {
        ConnectFailure::Response(r) => format!("HTTP {}", r.status().as_u16()),
        ConnectFailure::Network(e) => format!("{} ({})", e.message, e.code),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tail_of(chunks: &[&str]) -> [u8; 4] {
        chunks
            .iter()
            .fold(*b"\n\n\n\n", |t, c| next_tail(t, c.as_bytes()))
    }

    #[test]
    fn frame_boundary_tracks_across_chunks() {
        assert!(ends_frame(&tail_of(&[])));
        assert!(ends_frame(&tail_of(&["data: 1\n\n"])));
        assert!(ends_frame(&tail_of(&["data: 1\n", "\n"])));
        assert!(ends_frame(&tail_of(&["data: 1\r\n\r", "\n"])));
        assert!(!ends_frame(&tail_of(&["data: {\"n\":"])));
        assert!(!ends_frame(&tail_of(&["data: 1\n"])));
        assert!(!ends_frame(&tail_of(&["data: 1\n\n", "hello"])));
    }
}
