//! Unified error types for the RAG server.

use thiserror::Error;

/// Unified error type for startup and command-line operations.
#[derive(Error, Debug)]
pub enum RagError {
    /// Configuration loading error.
    #[error("configuration error: {0}")]
    Config(#[from] envy::Error),

    /// Configuration loaded but failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Knowledge base loading error.
    #[error("retriever error: {0}")]
    Retriever(#[from] RetrieverError),

    /// HTTP client construction error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Span exporter setup error.
    #[cfg(feature = "otel")]
    #[error("telemetry error: {0}")]
    Telemetry(String),
}

/// Chat model endpoint errors.
#[derive(Error, Debug)]
pub enum LlmError {
    /// The request could not be sent or returned a non-success status.
    #[error("model request failed: {0}")]
    RequestFailed(String),

    /// The endpoint answered 429.
    #[error("model endpoint rate limited")]
    RateLimited,

    /// The endpoint answered with a body we could not use.
    #[error("invalid model response: {0}")]
    InvalidResponse(String),
}

/// Knowledge base errors.
#[derive(Error, Debug)]
pub enum RetrieverError {
    /// Failed to read a document from disk.
    #[error("failed to load {path}: {source}")]
    Load {
        /// File or directory that failed.
        path: String,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised while running the chain.
#[derive(Error, Debug)]
pub enum ChainError {
    /// The input did not match the chain's input schema.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The chat model failed.
    #[error(transparent)]
    Llm(#[from] LlmError),

    /// The retriever failed.
    #[error(transparent)]
    Retriever(#[from] RetrieverError),

    /// Output could not be serialized.
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Convenient Result type alias.
pub type Result<T> = std::result::Result<T, RagError>;
