//! OpenAI-compatible chat completions client.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::config::Config;
use crate::error::LlmError;
use crate::metrics;

use super::{ChatMessage, ChatModel, TokenStream};

/// Chat completions API client (NVIDIA API catalog, NIM, or any OpenAI-compatible endpoint).
#[derive(Debug, Clone)]
pub struct ChatCompletionsClient {
    /// HTTP client for API requests.
    http: reqwest::Client,
    /// Base URL, without trailing slash.
    base_url: String,
    /// Bearer token, if the endpoint needs one.
    api_key: Option<String>,
    /// Model identifier.
    model: String,
    /// Sampling temperature.
    temperature: f32,
    /// Generation limit.
    max_tokens: u32,
    /// Bound on a whole completion, or on the wait for headers when streaming.
    timeout: Duration,
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: String,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CompletionChunk {
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    delta: ChunkDelta,
}

#[derive(Debug, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

impl ChatCompletionsClient {
    /// Create a new client from config.
    pub fn new(config: &Config) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .tcp_keepalive(Duration::from_secs(30))
            .pool_idle_timeout(Duration::from_secs(90))
            .build()?;

        Ok(Self {
            http,
            base_url: config.llm_base_url.trim_end_matches('/').to_string(),
            api_key: config.nvidia_api_key.clone().filter(|k| !k.is_empty()),
            model: config.llm_model.clone(),
            temperature: config.llm_temperature,
            max_tokens: config.llm_max_tokens,
            timeout: Duration::from_millis(config.llm_timeout_ms),
        })
    }

    /// Model identifier this client requests.
    pub fn model(&self) -> &str {
        &self.model
    }

    fn request_body<'a>(&'a self, messages: &'a [ChatMessage], stream: bool) -> CompletionRequest<'a> {
        CompletionRequest {
            model: &self.model,
            messages: messages
                .iter()
                .map(|m| WireMessage {
                    role: m.role.to_string(),
                    content: &m.content,
                })
                .collect(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            stream,
        }
    }

    async fn send(
        &self,
        messages: &[ChatMessage],
        stream: bool,
    ) -> Result<reqwest::Response, LlmError> {
        let mut request = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .json(&self.request_body(messages, stream));

        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        // A streamed answer may legitimately outlive the timeout; only the
        // wait for its headers is bounded.
        let sent = if stream {
            tokio::time::timeout(self.timeout, request.send())
                .await
                .map_err(|_| {
                    LlmError::RequestFailed(format!(
                        "no response within {} ms",
                        self.timeout.as_millis()
                    ))
                })?
        } else {
            request.timeout(self.timeout).send().await
        };
        let response = sent.map_err(|e| LlmError::RequestFailed(e.to_string()))?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            warn!("Model endpoint rate limited");
            return Err(LlmError::RateLimited);
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::RequestFailed(format!("HTTP {}: {}", status, body)));
        }

        Ok(response)
    }
}

#[async_trait]
impl ChatModel for ChatCompletionsClient {
    #[instrument(skip(self, messages), fields(model = %self.model, messages = messages.len()))]
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
        let _timer = metrics::timer_llm_request();
        let response = self.send(messages, false).await?;

        let completion: CompletionResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| LlmError::InvalidResponse("empty choices".to_string()))?;

        debug!(chars = content.len(), "Completion received");
        Ok(content)
    }

    #[instrument(skip(self, messages), fields(model = %self.model, messages = messages.len()))]
    async fn complete_stream(&self, messages: &[ChatMessage]) -> Result<TokenStream, LlmError> {
        let timer = metrics::timer_llm_request();
        let response = self.send(messages, true).await?;
        let mut bytes = Box::pin(response.bytes_stream());

        let stream = async_stream::stream! {
            // Recorded when the stream finishes or is dropped.
            let _timer = timer;
            let mut buffer: Vec<u8> = Vec::new();

            while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        yield Err(LlmError::RequestFailed(e.to_string()));
                        return;
                    }
                };
                buffer.extend_from_slice(&chunk);

                // Split on whole lines so multi-byte characters are never cut.
                while let Some(newline) = buffer.iter().position(|b| *b == b'\n') {
                    let line: Vec<u8> = buffer.drain(..=newline).collect();
                    match parse_sse_line(String::from_utf8_lossy(&line).trim()) {
                        SseLine::Token(token) => yield Ok(token),
                        SseLine::Done => return,
                        SseLine::Skip => {}
                    }
                }
            }

            if let SseLine::Token(token) = parse_sse_line(String::from_utf8_lossy(&buffer).trim()) {
                yield Ok(token);
            }
        };

        Ok(Box::pin(stream))
    }
}

#[derive(Debug, PartialEq, Eq)]
enum SseLine {
    Token(String),
    Done,
    Skip,
}

fn parse_sse_line(line: &str) -> SseLine {
    let Some(data) = line.strip_prefix("data:") else {
        return SseLine::Skip;
    };
    let data = data.trim_start();
    if data == "[DONE]" {
        return SseLine::Done;
    }

    match serde_json::from_str::<CompletionChunk>(data) {
        Ok(chunk) => chunk
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.delta.content)
            .filter(|content| !content.is_empty())
            .map_or(SseLine::Skip, SseLine::Token),
        Err(e) => {
            debug!(error = %e, "Skipping unparsable stream chunk");
            SseLine::Skip
        }
    }
}
