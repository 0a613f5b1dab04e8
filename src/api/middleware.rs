//! Request middleware: proxy prefix, request ids, metrics, and error handling.

use std::any::Any;
use std::sync::Arc;
use std::time::Instant;

use axum::body::{to_bytes, Body};
use axum::extract::{MatchedPath, Request, State};
use axum::http::{header, HeaderValue, StatusCode, Uri};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::{debug, error, info_span, Span};
use uuid::Uuid;

use crate::metrics;

use super::error::ApiError;

/// Header carrying the request id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Largest error body read back when normalizing error responses.
const MAX_ERROR_BODY_BYTES: usize = 64 * 1024;

/// Request id attached to request extensions.
#[derive(Clone, Debug)]
pub struct RequestId(pub String);

/// Remove a leading `proxy_prefix` from the request path before routing.
///
/// Requests that arrive through a stripping proxy and requests that still
/// carry the prefix reach the same handlers.
pub async fn strip_proxy_prefix(
    State(proxy_prefix): State<Arc<str>>,
    mut request: Request,
    next: Next,
) -> Response {
    if let Some(uri) = without_prefix(request.uri(), &proxy_prefix) {
        debug!(from = %request.uri(), to = %uri, "Stripped proxy prefix");
        *request.uri_mut() = uri;
    }
    next.run(request).await
}

/// `uri` with `prefix` removed, when the path starts with it as a whole segment.
pub fn without_prefix(uri: &Uri, prefix: &str) -> Option<Uri> {
    if prefix.is_empty() || !prefix.starts_with('/') {
        return None;
    }

    let rest = uri.path().strip_prefix(prefix)?;
    if !(rest.is_empty() || rest.starts_with('/')) {
        return None;
    }
    let path = if rest.is_empty() { "/" } else { rest };

    let path_and_query = match uri.query() {
        Some(query) => format!("{}?{}", path, query),
        None => path.to_string(),
    };

    let mut parts = uri.clone().into_parts();
    parts.path_and_query = Some(path_and_query.parse().ok()?);
    Uri::from_parts(parts).ok()
}

/// Span opened for every request; carries the id set by [`request_id`].
pub fn request_span(request: &Request) -> Span {
    let request_id = request
        .extensions()
        .get::<RequestId>()
        .map(|id| id.0.as_str())
        .unwrap_or("-");

    info_span!(
        "request",
        request_id = %request_id,
        method = %request.method(),
        uri = %request.uri().path(),
    )
}

/// Propagate or create `x-request-id` and echo it on the response.
///
/// Must wrap the trace layer so [`request_span`] can read the id.
pub async fn request_id(mut request: Request, next: Next) -> Response {
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(String::from)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    request
        .extensions_mut()
        .insert(RequestId(request_id.clone()));

    let mut response = next.run(request).await;

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }

    response
}

/// Record request count and latency, labelled by route template.
pub async fn track_metrics(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let response = next.run(request).await;

    metrics::record_http_request(start, &method, &path, response.status().as_u16());
    response
}

/// Turn every error response into the JSON error shape and log it.
///
/// Responses that already carry JSON are passed through unchanged.
pub async fn handle_errors(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let response = next.run(request).await;
    let status = response.status();
    if !(status.is_client_error() || status.is_server_error()) {
        return response;
    }

    if status.is_server_error() {
        error!(%method, %path, status = status.as_u16(), "Request failed");
    } else {
        debug!(%method, %path, status = status.as_u16(), "Request rejected");
    }

    if is_json(&response) {
        return response;
    }

    let (parts, body) = response.into_parts();
    let detail = match to_bytes(body, MAX_ERROR_BODY_BYTES).await {
        Ok(bytes) if !bytes.is_empty() => String::from_utf8_lossy(&bytes).trim().to_string(),
        _ => status.canonical_reason().unwrap_or("Error").to_string(),
    };

    let mut normalized = ApiError::Status { status, detail }.into_response();
    for (name, value) in parts.headers.iter() {
        if name != header::CONTENT_TYPE && name != header::CONTENT_LENGTH {
            normalized.headers_mut().insert(name.clone(), value.clone());
        }
    }
    normalized
}

/// Response for a handler that panicked.
pub fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response<Body> {
    let message = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    error!(panic = %message, "Handler panicked");

    ApiError::Status {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        detail: "Internal Server Error".to_string(),
    }
    .into_response()
}

fn is_json(response: &Response) -> bool {
    response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/json") || v.ends_with("+json"))
}
