//! OpenAI-compatible `/embeddings` adapter built on `async-openai`.

use super::{EmbeddingClient, EmbeddingClientError};
use async_openai::{Client, config::OpenAIConfig, types::CreateEmbeddingRequestArgs};
use async_trait::async_trait;

/// Embedding client for the OpenAI `/embeddings` endpoint (or any compatible server).
pub struct OpenAiEmbeddingClient {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiEmbeddingClient {
    /// Create a client against `base_url`, e.g. `https://api.openai.com/v1`.
    pub fn new(
        base_url: String,
        api_key: Option<String>,
        model: String,
    ) -> Result<Self, EmbeddingClientError> {
        Ok(Self {
            client: crate::openai::build_client(&base_url, api_key.as_deref()),
            model,
        })
    }
}

#[async_trait]
impl EmbeddingClient for OpenAiEmbeddingClient {
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        let expected = texts.len();
        tracing::debug!(model = %self.model, inputs = expected, "Requesting OpenAI embeddings");

        let request = CreateEmbeddingRequestArgs::default()
            .model(&self.model)
            .input(texts)
            .build()?;
        let mut response = self.client.embeddings().create(request).await?;

        if response.data.len() != expected {
            return Err(EmbeddingClientError::InvalidResponse(format!(
                "expected {expected} embeddings, received {}",
                response.data.len()
            )));
        }

        response.data.sort_by_key(|item| item.index);
        Ok(response.data.into_iter().map(|item| item.embedding).collect())
    }
}
