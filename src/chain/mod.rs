//! Conversational retrieval-augmented generation chain.
//!
//! This module handles:
//! - Condensing a follow-up question and chat history into a standalone question
//! - Retrieving context documents for it
//! - Asking the chat model to answer from that context

pub mod prompt;
pub mod retriever;

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, instrument, warn};
use utoipa::{PartialSchema, ToSchema};

use crate::config::Config;
use crate::error::{ChainError, RagError};
use crate::llm::{ChatCompletionsClient, ChatMessage, ChatModel};
use crate::metrics;
use crate::runnable::{OutputStream, Runnable, RunnableConfig};

pub use retriever::{Document, InMemoryRetriever, Retriever};

/// Name the chain is served under.
pub const CHAIN_NAME: &str = "ConversationalRagChain";

/// Input accepted by the chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ChainInput {
    /// The latest user question.
    pub question: String,
    /// Earlier turns of the conversation, oldest first.
    #[serde(default)]
    #[schema(inline)]
    pub chat_history: Vec<ChatMessage>,
}

impl ChainInput {
    /// Parse and validate a JSON input.
    pub fn from_value(value: Value) -> Result<Self, ChainError> {
        let input: Self =
            serde_json::from_value(value).map_err(|e| ChainError::InvalidInput(e.to_string()))?;
        if input.question.trim().is_empty() {
            return Err(ChainError::InvalidInput(
                "question must not be empty".to_string(),
            ));
        }
        Ok(input)
    }
}

/// The chain as served in production.
pub type DefaultChain = ConversationalRagChain<ChatCompletionsClient, InMemoryRetriever>;

/// The conversational RAG chain.
pub struct ConversationalRagChain<M, R>
where
    M: ChatModel,
    R: Retriever,
{
    model: Arc<M>,
    retriever: Arc<R>,
    top_k: usize,
}

impl<M, R> ConversationalRagChain<M, R>
where
    M: ChatModel,
    R: Retriever,
{
    /// Create a chain handing `top_k` documents to `model`.
    pub fn new(model: Arc<M>, retriever: Arc<R>, top_k: usize) -> Self {
        Self {
            model,
            retriever,
            top_k: top_k.max(1),
        }
    }

    /// Rewrite the question so it stands without the history.
    async fn standalone_question(&self, input: &ChainInput) -> Result<String, ChainError> {
        if input.chat_history.is_empty() {
            return Ok(input.question.clone());
        }

        let messages = prompt::condense_question(&input.chat_history, &input.question);
        let condensed = self.model.complete(&messages).await?;
        let condensed = condensed.trim();

        debug!(standalone = %condensed, "Condensed follow-up question");
        if condensed.is_empty() {
            Ok(input.question.clone())
        } else {
            Ok(condensed.to_string())
        }
    }

    /// Build the answering prompt for `input`.
    async fn answer_messages(&self, input: &ChainInput) -> Result<Vec<ChatMessage>, ChainError> {
        let query = self.standalone_question(input).await?;

        let documents = {
            let _timer = metrics::timer_retrieval();
            self.retriever.retrieve(&query, self.top_k).await?
        };
        metrics::record_retrieved_documents(documents.len());
        debug!(documents = documents.len(), "Retrieved context");

        Ok(prompt::answer(
            &documents,
            &input.chat_history,
            &input.question,
        ))
    }
}

/// Build the production chain: the configured model endpoint plus the
/// documents found in `DOCS_DIR`.
pub async fn from_config(config: &Config) -> Result<DefaultChain, RagError> {
    config.validate().map_err(RagError::InvalidConfig)?;

    if config.nvidia_api_key.as_deref().map_or(true, str::is_empty) {
        warn!("NVIDIA_API_KEY is not set; requests to the model endpoint are unauthenticated");
    }
    let model = ChatCompletionsClient::new(config)?;

    let retriever = InMemoryRetriever::new();
    match &config.docs_dir {
        Some(dir) => {
            if retriever.load_dir(dir).await? == 0 {
                warn!("No documents found in {}", dir);
            }
        }
        None => warn!("DOCS_DIR is not set; answering without retrieved context"),
    }

    Ok(ConversationalRagChain::new(
        Arc::new(model),
        Arc::new(retriever),
        config.retriever_top_k,
    ))
}

#[async_trait]
impl<M, R> Runnable for ConversationalRagChain<M, R>
where
    M: ChatModel + 'static,
    R: Retriever + 'static,
{
    fn name(&self) -> &str {
        CHAIN_NAME
    }

    fn input_schema(&self) -> Value {
        let mut schema = serde_json::to_value(ChainInput::schema()).unwrap_or_default();
        if let Some(object) = schema.as_object_mut() {
            object.insert("title".to_string(), json!("ChainInput"));
        }
        schema
    }

    fn output_schema(&self) -> Value {
        json!({ "title": "ChainOutput", "type": "string" })
    }

    #[instrument(skip_all)]
    async fn invoke(&self, input: Value, _config: &RunnableConfig) -> Result<Value, ChainError> {
        let input = ChainInput::from_value(input)?;
        let messages = self.answer_messages(&input).await?;
        let answer = self.model.complete(&messages).await?;
        Ok(Value::String(answer))
    }

    #[instrument(skip_all)]
    async fn stream(&self, input: Value, _config: &RunnableConfig) -> Result<OutputStream, ChainError> {
        let input = ChainInput::from_value(input)?;
        let messages = self.answer_messages(&input).await?;
        let tokens = self.model.complete_stream(&messages).await?;

        Ok(Box::pin(tokens.map(|token| {
            token.map(Value::String).map_err(ChainError::from)
        })))
    }
}
