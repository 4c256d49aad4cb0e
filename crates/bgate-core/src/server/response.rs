use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::error::ProxyError;
use crate::stream::SSE_RESPONSE_HEADERS;

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.envelope())).into_response()
    }
}

pub(super) fn apply_sse_headers(response: &mut Response) {
    let headers = response.headers_mut();
    for (name, value) in SSE_RESPONSE_HEADERS {
        headers.insert(name, HeaderValue::from_static(value));
    }
}
