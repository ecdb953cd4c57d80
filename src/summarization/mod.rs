//! Text summarization over the configured chat model, blocking or streamed.
//!
//! Streaming runs a producer task that drives the model's token stream into a bounded channel;
//! the receiving half becomes the HTTP response body. Every stream ends with exactly one
//! terminal event, [`SummaryEvent::Done`] on success or [`SummaryEvent::Error`] on failure.

use crate::llm::{ChatClient, ChatMessage, ChatRequest, LlmError};
use async_stream::stream;
use futures_core::Stream;
use futures_util::StreamExt;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::mpsc;

const SUMMARY_SYSTEM_PROMPT: &str = "You are an expert summarizer. Summarize the following text concisely, capturing the most important points. Adapt summary length to input length: short texts get 2-3 sentences, longer texts get a few paragraphs with key takeaways. Use clear, professional language.";

const STREAM_BUFFER: usize = 32;

/// Marker sent as the final SSE payload of a successful stream.
pub const DONE_MARKER: &str = "[DONE]";

/// One item of a streamed summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SummaryEvent {
    /// Next non-empty fragment of model output.
    Token(String),
    /// Model finished successfully.
    Done,
    /// Generation failed; no further events follow.
    Error(String),
}

impl SummaryEvent {
    /// Payload for the SSE `data:` field.
    pub fn sse_data(&self) -> String {
        match self {
            Self::Token(token) => json!({ "token": token }).to_string(),
            Self::Done => DONE_MARKER.to_string(),
            Self::Error(message) => json!({ "error": message }).to_string(),
        }
    }
}

/// Summarizes free text with a fixed prompt at temperature zero.
pub struct SummarizationService {
    chat: Arc<dyn ChatClient>,
}

impl SummarizationService {
    /// Build a summarizer over `chat`.
    pub fn new(chat: Arc<dyn ChatClient>) -> Self {
        Self { chat }
    }

    fn request(text: &str) -> ChatRequest {
        ChatRequest {
            messages: vec![
                ChatMessage::system(SUMMARY_SYSTEM_PROMPT),
                ChatMessage::user(text),
            ],
            temperature: 0.0,
        }
    }

    /// Produce the full summary in one call.
    pub async fn summarize(&self, text: &str) -> Result<String, LlmError> {
        tracing::info!(chars = text.chars().count(), "Summarizing text");
        self.chat.complete(Self::request(text)).await
    }

    /// Stream the summary token by token.
    ///
    /// Dropping the returned stream stops the producer and with it the upstream request.
    pub fn summarize_stream(
        &self,
        text: String,
    ) -> impl Stream<Item = SummaryEvent> + Send + use<> {
        let (tx, mut rx) = mpsc::channel(STREAM_BUFFER);
        let chat = Arc::clone(&self.chat);
        tokio::spawn(produce(chat, Self::request(&text), tx));

        stream! {
            while let Some(event) = rx.recv().await {
                yield event;
            }
        }
    }
}

async fn produce(chat: Arc<dyn ChatClient>, request: ChatRequest, tx: mpsc::Sender<SummaryEvent>) {
    let mut tokens = match chat.stream(request).await {
        Ok(tokens) => tokens,
        Err(error) => {
            tracing::error!(%error, "Failed to start summary stream");
            let _ = tx.send(SummaryEvent::Error(error.to_string())).await;
            return;
        }
    };

    let mut emitted = 0usize;
    loop {
        let next = tokio::select! {
            _ = tx.closed() => {
                tracing::debug!(emitted, "Summary stream consumer went away");
                return;
            }
            next = tokens.next() => next,
        };

        match next {
            Some(Ok(token)) => {
                if token.is_empty() {
                    continue;
                }
                if tx.send(SummaryEvent::Token(token)).await.is_err() {
                    tracing::debug!(emitted, "Summary stream consumer went away");
                    return;
                }
                emitted += 1;
            }
            Some(Err(error)) => {
                tracing::error!(%error, emitted, "Summary stream failed");
                let _ = tx.send(SummaryEvent::Error(error.to_string())).await;
                return;
            }
            None => {
                tracing::info!(emitted, "Summary stream completed");
                let _ = tx.send(SummaryEvent::Done).await;
                return;
            }
        }
    }
}
