use crate::config::{Config, EmbeddingProvider};
use async_openai::error::OpenAIError;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

mod ollama;
mod openai;

pub use ollama::OllamaEmbeddingClient;
pub use openai::OpenAiEmbeddingClient;

/// Errors raised by embedding providers.
#[derive(Debug, Error)]
pub enum EmbeddingClientError {
    /// Provider could not be reached or the HTTP client failed to build.
    #[error("Embedding provider unavailable: {0}")]
    ProviderUnavailable(String),
    /// Provider was unable to produce embeddings for the supplied input.
    #[error("Failed to generate embeddings: {0}")]
    GenerationFailed(String),
    /// Provider response could not be decoded.
    #[error("Malformed embedding response: {0}")]
    InvalidResponse(String),
}

impl From<OpenAIError> for EmbeddingClientError {
    fn from(error: OpenAIError) -> Self {
        match error {
            error @ OpenAIError::Reqwest(..) => Self::ProviderUnavailable(error.to_string()),
            error @ OpenAIError::JSONDeserialize(..) => Self::InvalidResponse(error.to_string()),
            other => Self::GenerationFailed(other.to_string()),
        }
    }
}

/// Interface implemented by embedding backends.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Produce an embedding vector for each supplied chunk of text, in input order.
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError>;
}

/// Deterministic offline embedding client hashing bytes into a fixed number of slots.
///
/// Useful for local development without a provider; similarity only reflects byte overlap.
pub struct HashingEmbeddingClient {
    dimension: usize,
}

impl HashingEmbeddingClient {
    /// Construct a hashing client producing vectors of `dimension` slots.
    pub const fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn encode(text: &str, dimension: usize) -> Vec<f32> {
        let mut embedding = vec![0.0_f32; dimension];

        if text.is_empty() {
            return embedding;
        }

        for (idx, byte) in text.bytes().enumerate() {
            let position = idx % dimension;
            embedding[position] += f32::from(byte) / 255.0;
        }

        let norm = embedding
            .iter()
            .map(|value| value * value)
            .sum::<f32>()
            .sqrt();

        if norm > 0.0 {
            for value in &mut embedding {
                *value /= norm;
            }
        }

        embedding
    }
}

#[async_trait]
impl EmbeddingClient for HashingEmbeddingClient {
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        if self.dimension == 0 {
            return Err(EmbeddingClientError::GenerationFailed(
                "embedding dimension must be greater than zero".to_string(),
            ));
        }

        tracing::debug!(
            dimension = self.dimension,
            inputs = texts.len(),
            "Generating hashed embeddings"
        );

        Ok(texts
            .iter()
            .map(|text| Self::encode(text, self.dimension))
            .collect())
    }
}

/// Build an embedding client suitable for the supplied configuration.
pub fn get_embedding_client(
    config: &Config,
) -> Result<Arc<dyn EmbeddingClient>, EmbeddingClientError> {
    tracing::debug!(
        provider = ?config.embedding_provider,
        model = %config.embedding_model,
        "Building embedding client"
    );
    let client: Arc<dyn EmbeddingClient> = match config.embedding_provider {
        EmbeddingProvider::OpenAI => Arc::new(OpenAiEmbeddingClient::new(
            config.openai_base_url.clone(),
            config.openai_api_key.clone(),
            config.embedding_model.clone(),
        )?),
        EmbeddingProvider::Ollama => Arc::new(OllamaEmbeddingClient::new(
            config.ollama_url.clone(),
            config.embedding_model.clone(),
        )?),
        EmbeddingProvider::Hash => {
            Arc::new(HashingEmbeddingClient::new(config.embedding_dimension))
        }
    };
    Ok(client)
}

pub(crate) fn build_http_client() -> Result<reqwest::Client, EmbeddingClientError> {
    reqwest::Client::builder()
        .user_agent("rag-gateway/embeddings")
        .build()
        .map_err(|error| {
            EmbeddingClientError::ProviderUnavailable(format!(
                "failed to construct HTTP client: {error}"
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hashing_client_is_deterministic_and_normalized() {
        let client = HashingEmbeddingClient::new(16);
        let first = client
            .generate_embeddings(vec!["The sky is blue.".into(), String::new()])
            .await
            .expect("embeddings");
        let second = client
            .generate_embeddings(vec!["The sky is blue.".into()])
            .await
            .expect("embeddings");

        assert_eq!(first.len(), 2);
        assert_eq!(first[0], second[0]);
        let norm: f32 = first[0].iter().map(|value| value * value).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
        assert!(first[1].iter().all(|value| *value == 0.0));
    }

    #[tokio::test]
    async fn hashing_client_rejects_zero_dimension() {
        let error = HashingEmbeddingClient::new(0)
            .generate_embeddings(vec!["text".into()])
            .await
            .expect_err("zero dimension");
        assert!(matches!(error, EmbeddingClientError::GenerationFailed(_)));
    }
}
