//! HTTP API route definitions.

use std::sync::Arc;

use axum::{middleware, routing::get, Router};
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::{DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::runnable::{add_routes, RouteOptions, Runnable};

use super::handlers::{healthz, metrics, not_found, openapi_json, root, AppState};
use super::middleware::{
    handle_errors, panic_response, request_id, request_span, strip_proxy_prefix, track_metrics,
};

/// Create the API router.
///
/// Routes are registered without the proxy prefix. A request path that
/// still starts with the prefix has it removed before routing, so the app
/// answers both behind a stripping proxy and when reached directly.
pub fn create_router(state: AppState, chain: Arc<dyn Runnable>, options: RouteOptions) -> Router {
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(request_span)
        .on_response(DefaultOnResponse::new().level(Level::INFO));
    let proxy_prefix = state.proxy_prefix.clone();

    let router = Router::new()
        // Health endpoints
        .route("/healthz", get(healthz))
        .route("/", get(root))
        // Telemetry and docs
        .route("/metrics", get(metrics))
        .route("/openapi.json", get(openapi_json))
        .with_state(state);

    let app = add_routes(router, chain, options)
        .fallback(not_found)
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(middleware::from_fn(handle_errors))
        .layer(middleware::from_fn(track_metrics))
        .layer(trace_layer)
        .layer(middleware::from_fn(request_id));

    if proxy_prefix.is_empty() {
        return app;
    }

    // Routing happens inside `app`, so the rewrite has to wrap it as a service.
    Router::new().fallback_service(
        ServiceBuilder::new()
            .layer(middleware::from_fn_with_state(proxy_prefix, strip_proxy_prefix))
            .service(app),
    )
}
