//! HTTP endpoints generated from a [`Runnable`].

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::Html;
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::metrics;

use super::{config_schema, playground, Runnable, RunnableConfig, DEFAULT_MAX_CONCURRENCY};

/// Endpoint a run was started from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum RunEndpoint {
    /// `POST /invoke`.
    Invoke,
    /// `POST /batch`.
    Batch,
    /// `POST /stream`.
    Stream,
}

/// Where and how a runnable is mounted.
#[derive(Debug, Clone)]
pub struct RouteOptions {
    /// Path the endpoints are registered under; `""` mounts at the root.
    pub path: String,
    /// Batch fan-out used when the request does not set `max_concurrency`.
    pub max_concurrency: usize,
}

impl Default for RouteOptions {
    fn default() -> Self {
        Self {
            path: String::new(),
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
        }
    }
}

impl RouteOptions {
    /// Mount at `path`.
    pub fn at(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Set the default batch fan-out.
    pub fn max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }
}

#[derive(Clone)]
struct RouteState {
    runnable: Arc<dyn Runnable>,
    max_concurrency: usize,
}

impl RouteState {
    fn config(&self, mut config: RunnableConfig) -> RunnableConfig {
        config.max_concurrency.get_or_insert(self.max_concurrency);
        config
    }
}

/// Body of `POST /invoke` and `POST /stream`.
#[derive(Debug, Deserialize)]
pub struct InvokeRequest {
    /// Runnable input.
    pub input: Value,
    /// Per-run options.
    #[serde(default)]
    pub config: RunnableConfig,
    /// Accepted for client compatibility; unused.
    #[serde(default)]
    pub kwargs: Map<String, Value>,
}

/// Body of `POST /batch`.
#[derive(Debug, Deserialize)]
pub struct BatchRequest {
    /// Runnable inputs.
    pub inputs: Vec<Value>,
    /// Options shared by every run.
    #[serde(default)]
    pub config: RunnableConfig,
    /// Accepted for client compatibility; unused.
    #[serde(default)]
    pub kwargs: Map<String, Value>,
}

/// Response of `POST /invoke`.
#[derive(Debug, Serialize)]
pub struct InvokeResponse {
    /// Runnable output.
    pub output: Value,
    /// Run metadata.
    pub metadata: RunMetadata,
}

/// Metadata of a single run.
#[derive(Debug, Serialize)]
pub struct RunMetadata {
    /// Identifier of the run.
    pub run_id: Uuid,
}

/// Response of `POST /batch`.
#[derive(Debug, Serialize)]
pub struct BatchResponse {
    /// Outputs in input order.
    pub output: Vec<Value>,
    /// Batch metadata.
    pub metadata: BatchMetadata,
}

/// Metadata of a batch.
#[derive(Debug, Serialize)]
pub struct BatchMetadata {
    /// One identifier per input.
    pub run_ids: Vec<Uuid>,
}

/// Register the endpoints of `runnable` on `router`.
///
/// Registered under `options.path`:
/// `POST invoke`, `POST batch`, `POST stream`, `GET input_schema`,
/// `GET output_schema`, `GET config_schema` and `GET playground/`.
pub fn add_routes(router: Router, runnable: Arc<dyn Runnable>, options: RouteOptions) -> Router {
    let base = options.path.trim_end_matches('/');
    let state = RouteState {
        runnable,
        max_concurrency: options.max_concurrency.max(1),
    };

    let routes = Router::new()
        .route(&format!("{base}/invoke"), post(invoke))
        .route(&format!("{base}/batch"), post(batch))
        .route(&format!("{base}/stream"), post(stream))
        .route(&format!("{base}/input_schema"), get(input_schema))
        .route(&format!("{base}/output_schema"), get(output_schema))
        .route(&format!("{base}/config_schema"), get(runnable_config_schema))
        .route(&format!("{base}/playground/"), get(playground_page))
        .with_state(state);

    router.merge(routes)
}

#[instrument(skip_all, fields(runnable = %state.runnable.name()))]
async fn invoke(
    State(state): State<RouteState>,
    Json(request): Json<InvokeRequest>,
) -> Result<Json<InvokeResponse>, ApiError> {
    let run_id = Uuid::new_v4();
    let config = state.config(request.config);
    info!(%run_id, endpoint = %RunEndpoint::Invoke, "Run started");
    metrics::inc_chain_runs(RunEndpoint::Invoke.as_ref());

    let output = state
        .runnable
        .invoke(request.input, &config)
        .await
        .map_err(|e| run_failed(RunEndpoint::Invoke, run_id, e.into()))?;

    info!(%run_id, "Run finished");
    Ok(Json(InvokeResponse {
        output,
        metadata: RunMetadata { run_id },
    }))
}

#[instrument(skip_all, fields(runnable = %state.runnable.name(), inputs = request.inputs.len()))]
async fn batch(
    State(state): State<RouteState>,
    Json(request): Json<BatchRequest>,
) -> Result<Json<BatchResponse>, ApiError> {
    let run_ids: Vec<Uuid> = request.inputs.iter().map(|_| Uuid::new_v4()).collect();
    let config = state.config(request.config);
    info!(runs = run_ids.len(), endpoint = %RunEndpoint::Batch, "Batch started");
    metrics::inc_chain_runs(RunEndpoint::Batch.as_ref());

    let output = state
        .runnable
        .batch(request.inputs, &config)
        .await
        .map_err(|e| {
            let batch_id = run_ids.first().copied().unwrap_or_else(Uuid::nil);
            run_failed(RunEndpoint::Batch, batch_id, e.into())
        })?;

    Ok(Json(BatchResponse {
        output,
        metadata: BatchMetadata { run_ids },
    }))
}

#[instrument(skip_all, fields(runnable = %state.runnable.name()))]
async fn stream(
    State(state): State<RouteState>,
    Json(request): Json<InvokeRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let run_id = Uuid::new_v4();
    let config = state.config(request.config);
    info!(%run_id, endpoint = %RunEndpoint::Stream, "Run started");
    metrics::inc_chain_runs(RunEndpoint::Stream.as_ref());

    let mut output = state
        .runnable
        .stream(request.input, &config)
        .await
        .map_err(|e| run_failed(RunEndpoint::Stream, run_id, e.into()))?;

    let events = async_stream::stream! {
        yield Ok(Event::default()
            .event("metadata")
            .data(json!({ "run_id": run_id }).to_string()));

        while let Some(chunk) = output.next().await {
            match chunk {
                Ok(value) => yield Ok(Event::default().event("data").data(value.to_string())),
                Err(e) => {
                    let error = run_failed(RunEndpoint::Stream, run_id, e.into());
                    let payload = json!({
                        "status_code": error.status().as_u16(),
                        "message": error.public_message(),
                    });
                    yield Ok(Event::default().event("error").data(payload.to_string()));
                    return;
                }
            }
        }

        info!(%run_id, "Run finished");
        yield Ok(Event::default().event("end"));
    };

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

async fn input_schema(State(state): State<RouteState>) -> Json<Value> {
    Json(state.runnable.input_schema())
}

async fn output_schema(State(state): State<RouteState>) -> Json<Value> {
    Json(state.runnable.output_schema())
}

async fn runnable_config_schema() -> Json<Value> {
    Json(config_schema())
}

async fn playground_page(State(state): State<RouteState>) -> Html<String> {
    Html(playground::render(state.runnable.name()))
}

fn run_failed(endpoint: RunEndpoint, run_id: Uuid, error: ApiError) -> ApiError {
    metrics::inc_chain_failures(endpoint.as_ref());
    warn!(%run_id, %endpoint, error = %error, "Run failed");
    error
}
