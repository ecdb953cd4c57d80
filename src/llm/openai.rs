//! OpenAI-compatible `/chat/completions` adapter built on `async-openai`.

use super::{ChatClient, ChatMessage, ChatRequest, ChatRole, LlmError, TokenStream};
use async_openai::{
    Client,
    config::OpenAIConfig,
    error::OpenAIError,
    types::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessage, ChatCompletionRequestUserMessage,
        CreateChatCompletionRequest, CreateChatCompletionRequestArgs,
    },
};
use async_trait::async_trait;
use futures_util::{StreamExt, future};

/// Chat client for the OpenAI chat completions API (or any compatible server).
pub struct OpenAiChatClient {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiChatClient {
    /// Create a client against `base_url`, e.g. `https://api.openai.com/v1`.
    pub fn new(base_url: String, api_key: Option<String>, model: String) -> Result<Self, LlmError> {
        Ok(Self {
            client: crate::openai::build_client(&base_url, api_key.as_deref()),
            model,
        })
    }

    fn build_request(&self, request: ChatRequest) -> Result<CreateChatCompletionRequest, LlmError> {
        tracing::debug!(
            model = %self.model,
            messages = request.messages.len(),
            "Preparing OpenAI chat completion"
        );
        let messages = request
            .messages
            .into_iter()
            .map(to_openai_message)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .temperature(request.temperature)
            .build()?)
    }
}

fn to_openai_message(message: ChatMessage) -> Result<ChatCompletionRequestMessage, OpenAIError> {
    Ok(match message.role {
        ChatRole::System => ChatCompletionRequestSystemMessage::from(message.content).into(),
        ChatRole::User => ChatCompletionRequestUserMessage::from(message.content).into(),
        ChatRole::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
            .content(message.content)
            .build()?
            .into(),
    })
}

#[async_trait]
impl ChatClient for OpenAiChatClient {
    async fn complete(&self, request: ChatRequest) -> Result<String, LlmError> {
        let request = self.build_request(request)?;
        let response = self.client.chat().create(request).await?;

        response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content.unwrap_or_default())
            .ok_or_else(|| LlmError::InvalidResponse("completion contained no choices".into()))
    }

    async fn stream(&self, request: ChatRequest) -> Result<TokenStream, LlmError> {
        let request = self.build_request(request)?;
        let upstream = self.client.chat().create_stream(request).await?;

        let tokens = upstream.filter_map(|item| {
            future::ready(match item {
                Ok(response) => response
                    .choices
                    .into_iter()
                    .next()
                    .and_then(|choice| choice.delta.content)
                    .filter(|token| !token.is_empty())
                    .map(Ok),
                Err(error) => Some(Err(LlmError::from(error))),
            })
        });
        Ok(Box::pin(tokens))
    }
}
