//! Chat model abstraction.
//!
//! This module handles:
//! - Chat message types shared with the chain input
//! - The `ChatModel` trait the chain talks to
//! - An OpenAI-compatible HTTP client (NVIDIA API catalog by default)
//! - A scripted mock model for testing

pub mod client;
pub mod mock;

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::LlmError;

pub use client::ChatCompletionsClient;
pub use mock::MockChatModel;

/// Stream of generated tokens.
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String, LlmError>> + Send + 'static>>;

/// Speaker of a chat message.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    ToSchema,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    /// Instructions for the model.
    System,
    /// The human side of the conversation.
    #[serde(alias = "human")]
    #[strum(to_string = "user", serialize = "human")]
    User,
    /// The model side of the conversation.
    #[serde(alias = "ai")]
    #[strum(to_string = "assistant", serialize = "ai")]
    Assistant,
}

/// Single chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ChatMessage {
    /// Who said it.
    #[schema(inline)]
    pub role: Role,
    /// What was said.
    pub content: String,
}

impl ChatMessage {
    /// System message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    /// User message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A chat model that completes a conversation.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Generate the full reply to `messages`.
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, LlmError>;

    /// Generate the reply to `messages` token by token.
    async fn complete_stream(&self, messages: &[ChatMessage]) -> Result<TokenStream, LlmError>;
}
