//! Mock chat model for unit testing.
//!
//! This module provides a scripted model that can be used in tests
//! without making real network requests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::LlmError;

use super::{ChatMessage, ChatModel, TokenStream};

/// Configuration for mock model behavior.
#[derive(Debug, Clone, Default)]
pub struct MockModelConfig {
    /// Reply used once the script runs out.
    pub default_reply: String,
    /// Whether every request fails.
    pub fail: bool,
    /// Whether requests fail with a rate limit instead of a generic error.
    pub rate_limited: bool,
}

/// Mock chat model for testing.
#[derive(Debug, Clone)]
pub struct MockChatModel {
    /// Mock configuration.
    config: MockModelConfig,
    /// Replies handed out in order.
    script: Arc<Mutex<VecDeque<String>>>,
    /// Every conversation the model was asked to complete.
    calls: Arc<Mutex<Vec<Vec<ChatMessage>>>>,
}

impl MockChatModel {
    /// Create a mock that always answers `reply`.
    pub fn new(reply: impl Into<String>) -> Self {
        Self::with_config(MockModelConfig {
            default_reply: reply.into(),
            ..MockModelConfig::default()
        })
    }

    /// Create a mock model with custom configuration.
    pub fn with_config(config: MockModelConfig) -> Self {
        Self {
            config,
            script: Arc::new(Mutex::new(VecDeque::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Create a mock whose requests all fail.
    pub fn failing() -> Self {
        Self::with_config(MockModelConfig {
            fail: true,
            ..MockModelConfig::default()
        })
    }

    /// Queue replies returned before the default reply.
    pub fn with_script<I, S>(self, replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.script
            .lock()
            .unwrap()
            .extend(replies.into_iter().map(Into::into));
        self
    }

    /// Conversations received so far.
    pub fn calls(&self) -> Vec<Vec<ChatMessage>> {
        self.calls.lock().unwrap().clone()
    }

    fn next_reply(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
        self.calls.lock().unwrap().push(messages.to_vec());

        if self.config.rate_limited {
            return Err(LlmError::RateLimited);
        }
        if self.config.fail {
            return Err(LlmError::RequestFailed("mock failure".to_string()));
        }

        Ok(self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.config.default_reply.clone()))
    }
}

#[async_trait]
impl ChatModel for MockChatModel {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
        self.next_reply(messages)
    }

    async fn complete_stream(&self, messages: &[ChatMessage]) -> Result<TokenStream, LlmError> {
        let reply = self.next_reply(messages)?;
        let tokens: Vec<Result<String, LlmError>> = reply
            .split_inclusive(' ')
            .map(|token| Ok(token.to_string()))
            .collect();
        Ok(Box::pin(futures::stream::iter(tokens)))
    }
}
