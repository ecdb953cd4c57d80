//! Ollama `/api/chat` adapter.

use super::{ChatClient, ChatRequest, LlmError, TokenStream, build_http_client, error_from_status};
use async_stream::try_stream;
use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tokio::io::AsyncBufReadExt;
use tokio_util::io::StreamReader;

/// Chat client for a local Ollama runtime.
pub struct OllamaChatClient {
    http: Client,
    base_url: String,
    model: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    message: Option<ResponseMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: String,
}

impl OllamaChatClient {
    /// Create a client against an Ollama base URL such as `http://127.0.0.1:11434`.
    pub fn new(base_url: String, model: String) -> Result<Self, LlmError> {
        Ok(Self {
            http: build_http_client()?,
            base_url,
            model,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/api/chat", self.base_url.trim_end_matches('/'))
    }

    async fn send(
        &self,
        request: ChatRequest,
        stream: bool,
    ) -> Result<reqwest::Response, LlmError> {
        let payload = json!({
            "model": self.model,
            "messages": request.messages,
            "stream": stream,
            "options": {
                "temperature": request.temperature,
            }
        });

        let response = self
            .http
            .post(self.endpoint())
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                LlmError::ProviderUnavailable(format!(
                    "failed to reach Ollama at {}: {error}",
                    self.base_url
                ))
            })?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(LlmError::ProviderUnavailable(format!(
                "Ollama endpoint {} returned 404",
                self.endpoint()
            )));
        }
        if !response.status().is_success() {
            return Err(error_from_status("Ollama", response).await);
        }
        Ok(response)
    }
}

/// Decode one NDJSON line into `(content, done)`.
fn parse_chunk_line(line: &str) -> Result<Option<(String, bool)>, LlmError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let chunk: ChatResponse = serde_json::from_str(line).map_err(|error| {
        LlmError::InvalidResponse(format!("failed to decode Ollama chunk: {error}"))
    })?;
    if let Some(error) = chunk.error {
        return Err(LlmError::GenerationFailed(error));
    }
    let content = chunk.message.map(|message| message.content).unwrap_or_default();
    Ok(Some((content, chunk.done)))
}

#[async_trait]
impl ChatClient for OllamaChatClient {
    async fn complete(&self, request: ChatRequest) -> Result<String, LlmError> {
        let response = self.send(request, false).await?;
        let body: ChatResponse = response.json().await.map_err(|error| {
            LlmError::InvalidResponse(format!("failed to decode Ollama response: {error}"))
        })?;

        if let Some(error) = body.error {
            return Err(LlmError::GenerationFailed(error));
        }
        if !body.done {
            return Err(LlmError::InvalidResponse(
                "Ollama response incomplete".into(),
            ));
        }
        Ok(body
            .message
            .map(|message| message.content.trim().to_string())
            .unwrap_or_default())
    }

    async fn stream(&self, request: ChatRequest) -> Result<TokenStream, LlmError> {
        let response = self.send(request, true).await?;
        let body = Box::pin(
            response
                .bytes_stream()
                .map(|chunk| chunk.map_err(std::io::Error::other)),
        );
        let mut lines = StreamReader::new(body).lines();

        let tokens = try_stream! {
            let mut done = false;
            while !done {
                let line = lines.next_line().await.map_err(|error| {
                    LlmError::ProviderUnavailable(format!("stream interrupted: {error}"))
                })?;
                let Some(line) = line else {
                    break;
                };
                if let Some((content, finished)) = parse_chunk_line(&line)? {
                    if !content.is_empty() {
                        yield content;
                    }
                    done = finished;
                }
            }

            if !done {
                Err::<(), _>(LlmError::InvalidResponse(
                    "Ollama stream ended before completion".into(),
                ))?;
            }
        };

        Ok(Box::pin(tokens))
    }
}
