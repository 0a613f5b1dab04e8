//! Runnables and the HTTP routes generated from them.
//!
//! A [`Runnable`] is any processing object that maps JSON input to JSON
//! output. [`add_routes`] exposes one over HTTP with `invoke`, `batch`,
//! `stream`, schema and playground endpoints.

mod playground;
pub mod routes;

use std::pin::Pin;

use async_trait::async_trait;
use futures::{stream, Stream, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::ChainError;

pub use routes::{add_routes, RouteOptions};

/// Batch fan-out used when neither the request nor the route sets one.
pub const DEFAULT_MAX_CONCURRENCY: usize = 8;

/// Stream of output chunks.
pub type OutputStream = Pin<Box<dyn Stream<Item = Result<Value, ChainError>> + Send + 'static>>;

/// Per-run options supplied by the caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnableConfig {
    /// Free-form tags attached to the run.
    pub tags: Vec<String>,
    /// Free-form metadata attached to the run.
    pub metadata: Map<String, Value>,
    /// Display name for the run.
    pub run_name: Option<String>,
    /// Upper bound on concurrently processed batch inputs.
    pub max_concurrency: Option<usize>,
    /// Runtime overrides understood by the runnable.
    pub configurable: Map<String, Value>,
}

/// JSON schema describing [`RunnableConfig`].
pub fn config_schema() -> Value {
    json!({
        "title": "RunnableConfig",
        "type": "object",
        "properties": {
            "tags": { "type": "array", "items": { "type": "string" } },
            "metadata": { "type": "object" },
            "run_name": { "type": ["string", "null"] },
            "max_concurrency": { "type": ["integer", "null"], "minimum": 1 },
            "configurable": { "type": "object" }
        }
    })
}

/// A processing object that can be served over HTTP.
#[async_trait]
pub trait Runnable: Send + Sync {
    /// Name shown in the playground and logs.
    fn name(&self) -> &str;

    /// JSON schema of accepted input.
    fn input_schema(&self) -> Value;

    /// JSON schema of produced output.
    fn output_schema(&self) -> Value;

    /// Run once on `input`.
    async fn invoke(&self, input: Value, config: &RunnableConfig) -> Result<Value, ChainError>;

    /// Run on many inputs; output order follows input order.
    ///
    /// At most `config.max_concurrency` inputs are in flight. The first
    /// failure fails the whole batch.
    async fn batch(
        &self,
        inputs: Vec<Value>,
        config: &RunnableConfig,
    ) -> Result<Vec<Value>, ChainError> {
        let limit = config
            .max_concurrency
            .unwrap_or(DEFAULT_MAX_CONCURRENCY)
            .max(1);

        stream::iter(inputs)
            .map(|input| self.invoke(input, config))
            .buffered(limit)
            .try_collect()
            .await
    }

    /// Run once on `input`, yielding output chunks as they are produced.
    async fn stream(&self, input: Value, config: &RunnableConfig) -> Result<OutputStream, ChainError>;
}
