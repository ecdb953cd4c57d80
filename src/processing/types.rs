//! Core data types and error definitions for the document pipelines.

use crate::{index::IndexError, llm::LlmError};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

/// Source label applied when an upload carries no usable filename.
pub const UNKNOWN_SOURCE: &str = "unknown";

/// Errors produced while configuring or running the text splitter.
#[derive(Debug, Error)]
pub enum ChunkingError {
    /// Splitter configured with an impossible length budget.
    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,
    /// Overlap must leave room for new content in every chunk.
    #[error("chunk overlap ({overlap}) must be smaller than chunk size ({size})")]
    OverlapTooLarge {
        /// Requested overlap.
        overlap: usize,
        /// Requested chunk size.
        size: usize,
    },
    /// Tokenizer resources were unavailable for the configured model.
    #[error("failed to initialize tokenizer for model '{model}': {source}")]
    Tokenizer {
        /// Model we attempted to load an encoding for.
        model: String,
        /// Underlying error raised by the tokenizer library.
        #[source]
        source: anyhow::Error,
    },
}

/// Errors raised while turning uploaded bytes into text.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// Temporary upload file could not be created or written.
    #[error("failed to stage upload: {0}")]
    TempFile(#[from] std::io::Error),
    /// PDF parser rejected the document.
    #[error("failed to extract PDF text: {0}")]
    Pdf(String),
    /// Plain-text upload was not valid UTF-8.
    #[error("text upload is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
    /// Blocking extraction task panicked or was cancelled.
    #[error("extraction task failed: {0}")]
    Task(String),
}

/// Errors emitted by the ingestion and retrieval-answering pipelines.
#[derive(Debug, Error)]
pub enum RagError {
    /// Upload declared a content type other than PDF or plain text.
    #[error("Only PDF and text files are supported (got '{0}')")]
    UnsupportedMediaType(String),
    /// Text extraction failed.
    #[error("Failed to extract document text: {0}")]
    Extraction(#[from] ExtractionError),
    /// Embedding or index bookkeeping failed.
    #[error("Vector index operation failed: {0}")]
    Index(#[from] IndexError),
    /// Chat model failed while answering.
    #[error("Failed to generate answer: {0}")]
    Llm(#[from] LlmError),
}

/// Bounded span of document text tagged with its origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentChunk {
    /// Chunk content.
    pub text: String,
    /// Originating filename, or [`UNKNOWN_SOURCE`].
    pub source: String,
}

impl DocumentChunk {
    /// Create a chunk, falling back to [`UNKNOWN_SOURCE`] for absent or blank sources.
    pub fn new(text: impl Into<String>, source: Option<&str>) -> Self {
        let source = source
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .unwrap_or(UNKNOWN_SOURCE);
        Self {
            text: text.into(),
            source: source.to_string(),
        }
    }
}

/// Uploaded file as received by the HTTP layer.
#[derive(Debug, Clone, Default)]
pub struct DocumentUpload {
    /// Raw file contents.
    pub bytes: Vec<u8>,
    /// Declared content type of the multipart field.
    pub content_type: Option<String>,
    /// Client-supplied filename.
    pub filename: Option<String>,
}

/// Result of a completed ingestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestOutcome {
    /// Number of chunks produced and indexed.
    pub chunk_count: usize,
    /// Index identifiers of the new chunks, in document order.
    pub chunk_ids: Vec<Uuid>,
    /// Source label attached to every chunk.
    pub source: String,
}

/// Retrieval-augmented answer with the sources it was grounded on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Answer {
    /// Model output, or the fixed no-documents message.
    pub text: String,
    /// Unique source labels in first-retrieved order.
    pub sources: Vec<String>,
}
