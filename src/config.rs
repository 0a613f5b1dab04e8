//! Application configuration loaded from environment variables.

use serde::Deserialize;

/// Title advertised in the OpenAPI document.
pub const APP_TITLE: &str = "NVIDIA Conversational RAG";
/// API version advertised in the OpenAPI document.
pub const APP_VERSION: &str = "0.1.0";
/// Description advertised in the OpenAPI document.
pub const APP_DESCRIPTION: &str = "More advanced conversational RAG using NVIDIA components.";

/// Fixed application metadata. Not configurable from the environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppMetadata {
    /// Application title.
    pub title: &'static str,
    /// Application version.
    pub version: &'static str,
    /// Human readable description.
    pub description: &'static str,
}

impl AppMetadata {
    /// The metadata of this build.
    pub const CURRENT: Self = Self {
        title: APP_TITLE,
        version: APP_VERSION,
        description: APP_DESCRIPTION,
    };
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // === Server Configuration ===
    /// Path prefix a reverse proxy serves the app under (e.g. `/api`).
    #[serde(default)]
    pub proxy_prefix: Option<String>,

    /// Interface the HTTP server binds to.
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP server port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub rust_log: String,

    /// Emit logs as JSON lines.
    #[serde(default)]
    pub log_json: bool,

    /// Export spans over OTLP (needs the `otel` feature). The exporter reads
    /// the standard `OTEL_EXPORTER_OTLP_*` variables.
    #[serde(default)]
    pub otel_enabled: bool,

    // === Model Endpoint ===
    /// API key for the chat completions endpoint.
    #[serde(default)]
    pub nvidia_api_key: Option<String>,

    /// Base URL of an OpenAI-compatible chat completions API.
    #[serde(default = "default_llm_base_url")]
    pub llm_base_url: String,

    /// Model identifier sent with every completion request.
    #[serde(default = "default_llm_model")]
    pub llm_model: String,

    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub llm_temperature: f32,

    /// Maximum tokens generated per answer.
    #[serde(default = "default_max_tokens")]
    pub llm_max_tokens: u32,

    /// Timeout for a model request. Bounds a whole completion, and the wait
    /// for response headers when streaming.
    #[serde(default = "default_llm_timeout")]
    pub llm_timeout_ms: u64,

    // === Retrieval ===
    /// Directory of `.txt`/`.md` files loaded into the knowledge base.
    #[serde(default)]
    pub docs_dir: Option<String>,

    /// Number of documents handed to the model as context.
    #[serde(default = "default_top_k")]
    pub retriever_top_k: usize,

    /// Default number of batch inputs processed concurrently.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8081
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_llm_base_url() -> String {
    "https://integrate.api.nvidia.com/v1".to_string()
}

fn default_llm_model() -> String {
    "meta/llama3-70b-instruct".to_string()
}

fn default_temperature() -> f32 {
    0.2
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_llm_timeout() -> u64 {
    60_000
}

fn default_top_k() -> usize {
    4
}

fn default_max_concurrency() -> usize {
    8
}

impl Config {
    /// Load configuration from environment, reading .env file first.
    pub fn load() -> crate::Result<Self> {
        dotenvy::dotenv().ok();
        Ok(envy::from_env()?)
    }

    /// Build configuration from explicit `(VARIABLE, value)` pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self, envy::Error>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        envy::from_iter(pairs.into_iter().map(|(k, v)| (k.into(), v.into())))
    }

    /// Check if the configuration is valid.
    pub fn validate(&self) -> Result<(), String> {
        if let Err(e) = url::Url::parse(&self.llm_base_url) {
            return Err(format!("LLM_BASE_URL is not a valid URL: {}", e));
        }

        if self.retriever_top_k == 0 {
            return Err("RETRIEVER_TOP_K must be at least 1".to_string());
        }

        if self.max_concurrency == 0 {
            return Err("MAX_CONCURRENCY must be at least 1".to_string());
        }

        if !(0.0..=2.0).contains(&self.llm_temperature) {
            return Err("LLM_TEMPERATURE must be between 0.0 and 2.0".to_string());
        }

        Ok(())
    }

    /// The configured path prefix without trailing slashes, or `""` when unset.
    pub fn proxy_prefix(&self) -> &str {
        self.proxy_prefix
            .as_deref()
            .unwrap_or("")
            .trim_end_matches('/')
    }

    /// Address the HTTP server binds to.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
