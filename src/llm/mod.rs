//! Chat-completion clients used for answering and summarization.
//!
//! The OpenAI-compatible backend goes through `async-openai`, which also decodes the
//! Server-Sent-Events stream. The Ollama backend issues plain `reqwest` calls and reads its
//! newline-delimited JSON stream line by line.

use crate::config::{ChatProvider, Config};
use async_openai::error::OpenAIError;
use async_trait::async_trait;
use futures_core::Stream;
use serde::Serialize;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;

mod ollama;
mod openai;

pub use ollama::OllamaChatClient;
pub use openai::OpenAiChatClient;

/// Errors surfaced by chat-completion providers.
#[derive(Debug, Error)]
pub enum LlmError {
    /// Provider could not be reached or the HTTP client failed to build.
    #[error("Chat provider unavailable: {0}")]
    ProviderUnavailable(String),
    /// Provider returned an error response or an in-stream error.
    #[error("Failed to generate completion: {0}")]
    GenerationFailed(String),
    /// Provider response could not be parsed.
    #[error("Malformed provider response: {0}")]
    InvalidResponse(String),
}

impl From<OpenAIError> for LlmError {
    fn from(error: OpenAIError) -> Self {
        match error {
            error @ OpenAIError::Reqwest(..) => Self::ProviderUnavailable(error.to_string()),
            error @ OpenAIError::JSONDeserialize(..) => Self::InvalidResponse(error.to_string()),
            other => Self::GenerationFailed(other.to_string()),
        }
    }
}

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    /// Instructions framing the conversation.
    System,
    /// Human input.
    User,
    /// Model output.
    Assistant,
}

/// Single message in a chat prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    /// Message author.
    pub role: ChatRole,
    /// Message text.
    pub content: String,
}

impl ChatMessage {
    /// System-role message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    /// User-role message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }
}

/// Prompt and sampling parameters for one completion.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    /// Ordered prompt messages.
    pub messages: Vec<ChatMessage>,
    /// Sampling temperature; `0.0` requests deterministic output.
    pub temperature: f32,
}

/// Incremental completion output, one text fragment per item.
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String, LlmError>> + Send>>;

/// Interface implemented by chat-completion providers.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Run a single blocking completion and return the full text.
    async fn complete(&self, request: ChatRequest) -> Result<String, LlmError>;

    /// Start a streaming completion. Errors before the first token are returned directly;
    /// later failures arrive as an `Err` item.
    async fn stream(&self, request: ChatRequest) -> Result<TokenStream, LlmError>;
}

/// Build a chat client for the configured provider.
pub fn get_chat_client(config: &Config) -> Result<Arc<dyn ChatClient>, LlmError> {
    tracing::debug!(
        provider = ?config.chat_provider,
        model = %config.chat_model,
        "Building chat client"
    );
    let client: Arc<dyn ChatClient> = match config.chat_provider {
        ChatProvider::OpenAI => Arc::new(OpenAiChatClient::new(
            config.openai_base_url.clone(),
            config.openai_api_key.clone(),
            config.chat_model.clone(),
        )?),
        ChatProvider::Ollama => Arc::new(OllamaChatClient::new(
            config.ollama_url.clone(),
            config.chat_model.clone(),
        )?),
    };
    Ok(client)
}

fn build_http_client() -> Result<reqwest::Client, LlmError> {
    reqwest::Client::builder()
        .user_agent("rag-gateway/chat")
        .build()
        .map_err(|error| {
            LlmError::ProviderUnavailable(format!("failed to construct HTTP client: {error}"))
        })
}

/// Turn a non-success response into a [`LlmError::GenerationFailed`].
async fn error_from_status(provider: &str, response: reqwest::Response) -> LlmError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    LlmError::GenerationFailed(format!("{provider} returned {status}: {body}"))
}
