//! Conversational RAG chain server.
//!
//! Serves a conversational retrieval-augmented-generation chain over HTTP:
//! follow-up questions are condensed against the chat history, relevant
//! documents are retrieved, and a chat model answers from them.
//!
//! ```text
//! GET  /healthz        -> 200 "success"
//! GET  /               -> 307 <prefix>/playground/
//! POST /invoke         -> {"output": ..., "metadata": {"run_id": ...}}
//! POST /batch          -> {"output": [...], "metadata": {"run_ids": [...]}}
//! POST /stream         -> text/event-stream
//! GET  /playground/    -> browser chat page
//! ```
//!
//! # Modules
//!
//! - [`config`]: Configuration loading from environment
//! - [`error`]: Unified error types
//! - [`llm`]: Chat model trait and clients
//! - [`chain`]: The conversational RAG chain and its retriever
//! - [`runnable`]: Route generation for processing objects
//! - [`api`]: HTTP server wiring, middleware and handlers
//! - [`metrics`]: Prometheus metrics
//! - [`telemetry`]: Optional OpenTelemetry span export
//! - [`utils`]: Utility functions

pub mod api;
pub mod chain;
pub mod config;
pub mod error;
pub mod llm;
pub mod metrics;
pub mod runnable;
pub mod telemetry;
pub mod utils;

pub use config::Config;
pub use error::{RagError, Result};
