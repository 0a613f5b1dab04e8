//! HTTP API handlers.

use std::fmt;
use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, Uri};
use axum::response::{IntoResponse, Redirect};
use axum::Json;
use metrics_exporter_prometheus::PrometheusHandle;
use utoipa::openapi::OpenApi;

use super::error::ApiError;
use super::openapi;

/// Body returned by the liveness probe.
pub const HEALTHZ_BODY: &str = "success";

/// Application state shared with handlers.
#[derive(Clone)]
pub struct AppState {
    /// Path prefix the app is served under (`""` when none).
    pub proxy_prefix: Arc<str>,
    /// Prometheus exposition handle.
    pub metrics: PrometheusHandle,
    /// OpenAPI document served at `/openapi.json`.
    pub openapi: Arc<OpenApi>,
}

impl AppState {
    /// Create new app state.
    pub fn new(proxy_prefix: &str, metrics: PrometheusHandle) -> Self {
        let proxy_prefix = proxy_prefix.trim_end_matches('/');
        Self {
            proxy_prefix: Arc::from(proxy_prefix),
            metrics,
            openapi: Arc::new(openapi::document(proxy_prefix)),
        }
    }

    /// Where `/` redirects to.
    pub fn playground_url(&self) -> String {
        playground_url(&self.proxy_prefix)
    }
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState")
            .field("proxy_prefix", &self.proxy_prefix)
            .finish_non_exhaustive()
    }
}

/// Playground location for a deployment served under `proxy_prefix`.
pub fn playground_url(proxy_prefix: &str) -> String {
    format!("{}/playground/", proxy_prefix)
}

/// Report on the liveness of the server.
#[utoipa::path(
    get,
    path = "/healthz",
    tag = "health",
    responses((status = 200, description = "Server is alive", body = String, content_type = "text/plain"))
)]
pub async fn healthz() -> &'static str {
    HEALTHZ_BODY
}

/// Redirect the root directory to the playground.
#[utoipa::path(
    get,
    path = "/",
    tag = "health",
    responses((status = 307, description = "Redirect to the playground"))
)]
pub async fn root(State(state): State<AppState>) -> Redirect {
    Redirect::temporary(&state.playground_url())
}

/// Prometheus metrics exposition.
#[utoipa::path(
    get,
    path = "/metrics",
    tag = "telemetry",
    responses((status = 200, description = "Prometheus text format", body = String, content_type = "text/plain"))
)]
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

/// The OpenAPI document of this server.
pub async fn openapi_json(State(state): State<AppState>) -> Json<OpenApi> {
    Json(state.openapi.as_ref().clone())
}

/// Fallback for unmatched routes.
pub async fn not_found(uri: Uri) -> ApiError {
    ApiError::NotFound(uri.path().to_string())
}
