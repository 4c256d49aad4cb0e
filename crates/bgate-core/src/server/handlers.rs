use std::convert::Infallible;
use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::{Path, Query, RawQuery, State};
use axum::http::{HeaderMap, Method};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::StreamExt;
use serde_json::Value;

use super::response::apply_sse_headers;
use super::{AppState, RETRIES_HEADER};
use crate::backend::Backend;
use crate::error::ProxyError;
use crate::gateway::{CallOptions, TRACE_HEADER};
use crate::season::SeasonCall;
use crate::stream::{RelayRequest, REQUEST_ID_HEADER};

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Empty body is `None`; a body that is not JSON is a 400.
fn json_body(body: &Bytes) -> Result<Option<Value>, ProxyError> {
    if body.is_empty() {
        return Ok(None);
    }
    serde_json::from_slice(body)
        .map(Some)
        .map_err(|e| ProxyError::bad_request(format!("request body is not valid JSON: {e}")))
}

fn call_options(
    state: &AppState,
    method: Method,
    headers: &HeaderMap,
    body: Option<Value>,
    fallback: &str,
) -> Result<CallOptions, ProxyError> {
    let retries = match header_str(headers, RETRIES_HEADER) {
        Some(v) => v
            .parse::<u32>()
            .map_err(|_| ProxyError::bad_request(format!("{RETRIES_HEADER} must be a non-negative integer")))?,
        None => state.default_retries,
    };
    let mut opts = CallOptions::new(fallback).method(method).retries(retries);
    if let Some(body) = body {
        opts = opts.body(body);
    }
    if let Some(trace_id) = header_str(headers, TRACE_HEADER) {
        opts = opts.trace_id(trace_id);
    }
    Ok(opts)
}

/// Pull the `season_id` hint out of the inbound query; the rest is re-encoded for the backend.
fn split_season_query(params: &[(String, String)]) -> (Option<String>, Option<String>) {
    let mut hint = None;
    let mut forwarded = url::form_urlencoded::Serializer::new(String::new());
    for (k, v) in params {
        if k == "season_id" {
            hint = Some(v.clone());
        } else {
            forwarded.append_pair(k, v);
        }
    }
    let query = forwarded.finish();
    (hint, (!query.is_empty()).then_some(query))
}

fn error_response(err: ProxyError, label: &str) -> Response {
    tracing::error!(
        status = err.status,
        code = %err.code,
        trace_id = err.trace_id.as_deref().unwrap_or("-"),
        "{}: {}",
        label,
        err
    );
    err.into_response()
}

pub(super) async fn json_proxy(
    State(state): State<Arc<AppState>>,
    method: Method,
    Path(path): Path<String>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let result = async {
        state.require_credential()?;
        let body = json_body(&body)?;
        let opts = call_options(&state, method, &headers, body, "Backend request failed")?;
        let url = Backend::with_query(state.backend.url(&path), query.as_deref());
        state.gateway.call(&url, &opts).await
    }
    .await;
    match result {
        Ok(value) => Json(value).into_response(),
        Err(err) => error_response(err, "json proxy failed"),
    }
}

pub(super) async fn season_proxy(
    State(state): State<Arc<AppState>>,
    method: Method,
    Path((show_id, season_number, path)): Path<(String, String, String)>,
    Query(params): Query<Vec<(String, String)>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let result = async {
        state.require_credential()?;
        let body = json_body(&body)?;
        let opts = call_options(&state, method, &headers, body, "Season backend request failed")?;
        let mut call = SeasonCall::new(opts);
        let (hint, query) = split_season_query(&params);
        call.season_id_hint = hint;
        call.query = query;
        state
            .seasons
            .fetch_json(&show_id, &season_number, &path, &call)
            .await
    }
    .await;
    match result {
        Ok(value) => Json(value).into_response(),
        Err(err) => error_response(err, "season proxy failed"),
    }
}

pub(super) async fn stream_proxy(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Err(err) = state.require_credential() {
        return error_response(err, "stream proxy refused");
    }
    // A malformed inbound body is forwarded as `{}` rather than failing the stream.
    let body = json_body(&body).ok().flatten();
    let url = Backend::with_query(state.backend.url(&path), query.as_deref());
    let mut request = RelayRequest::post(url);
    request.body = body;
    request.request_id = header_str(&headers, REQUEST_ID_HEADER).map(str::to_string);

    let handle = state.relay.open(request);
    let mut response = Body::from_stream(handle.body.map(Ok::<_, Infallible>)).into_response();
    apply_sse_headers(&mut response);
    response
}
