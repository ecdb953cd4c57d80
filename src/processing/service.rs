//! Retrieval-augmented service coordinating extraction, chunking, indexing, and answering.

use crate::{
    index::VectorIndex,
    llm::{ChatClient, ChatMessage, ChatRequest},
    metrics::{MetricsSnapshot, PipelineMetrics},
    processing::{
        chunking::TextSplitter,
        extract::{DocumentKind, extract_text, stage_upload},
        types::{Answer, DocumentUpload, IngestOutcome, RagError, UNKNOWN_SOURCE},
    },
};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

/// Answer returned when retrieval finds nothing to ground on.
pub const NO_DOCUMENTS_ANSWER: &str = "No relevant documents found. Please upload documents first.";

const ANSWER_SYSTEM_PROMPT: &str = "You are a helpful assistant. Answer the user's question based only on the provided context. If the context doesn't contain enough information to answer, say so.";

const DEFAULT_TOP_K: usize = 4;

/// Ingestion and question-answering over a shared in-memory index.
///
/// Construct once near process start and share through an `Arc`; the index is the only
/// mutable state and is internally synchronized.
pub struct RagService {
    index: Arc<VectorIndex>,
    chat: Arc<dyn ChatClient>,
    splitter: TextSplitter,
    metrics: Arc<PipelineMetrics>,
    upload_dir: Option<PathBuf>,
    top_k: usize,
}

/// Abstraction over the RAG pipelines used by the HTTP surface.
#[async_trait]
pub trait RagApi: Send + Sync {
    /// Extract, chunk, embed, and index an uploaded document.
    async fn ingest(&self, upload: DocumentUpload) -> Result<IngestOutcome, RagError>;

    /// Answer a question from the indexed documents.
    async fn answer(&self, question: &str) -> Result<Answer, RagError>;

    /// Retrieve the current metrics snapshot for diagnostics.
    fn metrics_snapshot(&self) -> MetricsSnapshot;
}

impl RagService {
    /// Build a service over `index`, answering with `chat` and chunking with `splitter`.
    pub fn new(index: Arc<VectorIndex>, chat: Arc<dyn ChatClient>, splitter: TextSplitter) -> Self {
        Self {
            index,
            chat,
            splitter,
            metrics: Arc::new(PipelineMetrics::new()),
            upload_dir: None,
            top_k: DEFAULT_TOP_K,
        }
    }

    /// Stage uploads in `dir` instead of the OS temp dir.
    pub fn with_upload_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.upload_dir = dir;
        self
    }

    /// Retrieve `top_k` chunks per question.
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    /// Shared index handle.
    pub fn index(&self) -> &Arc<VectorIndex> {
        &self.index
    }

    async fn ingest_upload(&self, upload: DocumentUpload) -> Result<IngestOutcome, RagError> {
        let DocumentUpload {
            bytes,
            content_type,
            filename,
        } = upload;
        let Some(kind) = DocumentKind::from_content_type(content_type.as_deref()) else {
            let declared = content_type.unwrap_or_default();
            tracing::warn!(content_type = %declared, "Rejected unsupported upload");
            return Err(RagError::UnsupportedMediaType(declared));
        };

        let source = filename
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(UNKNOWN_SOURCE)
            .to_string();
        tracing::info!(source = %source, ?kind, bytes = bytes.len(), "Ingesting document");

        // Dropping `staged` deletes the file, including on the error paths below.
        let staged = stage_upload(bytes, kind, self.upload_dir.clone()).await?;
        let text = extract_text(staged.path(), kind).await?;
        drop(staged);

        let chunks = self.splitter.split(&text, Some(&source));
        let chunk_count = chunks.len();
        tracing::debug!(
            source = %source,
            chunks = chunk_count,
            chunk_size = self.splitter.chunk_size(),
            overlap = self.splitter.chunk_overlap(),
            "Document split"
        );

        let chunk_ids = self.index.insert(chunks).await?;
        self.metrics.record_document(chunk_count as u64);
        tracing::info!(
            source = %source,
            chunks = chunk_count,
            first_chunk = ?chunk_ids.first(),
            "Document indexed"
        );

        Ok(IngestOutcome {
            chunk_count,
            chunk_ids,
            source,
        })
    }

    async fn answer_question(&self, question: &str) -> Result<Answer, RagError> {
        let hits = self.index.query(question, self.top_k).await?;
        if hits.is_empty() {
            tracing::info!("No indexed context for question");
            self.metrics.record_answer(false);
            return Ok(Answer {
                text: NO_DOCUMENTS_ANSWER.to_string(),
                sources: Vec::new(),
            });
        }

        let context = hits
            .iter()
            .map(|hit| hit.chunk.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        let mut sources: Vec<String> = Vec::new();
        for hit in &hits {
            if !sources.contains(&hit.chunk.source) {
                sources.push(hit.chunk.source.clone());
            }
        }
        tracing::debug!(
            retrieved = hits.len(),
            top_score = hits[0].score,
            top_chunk = %hits[0].id,
            sources = sources.len(),
            "Retrieved context"
        );

        let request = ChatRequest {
            messages: vec![
                ChatMessage::system(ANSWER_SYSTEM_PROMPT),
                ChatMessage::user(format!("Context:\n{context}\n\nQuestion: {question}")),
            ],
            temperature: 0.0,
        };
        let text = self.chat.complete(request).await?;
        self.metrics.record_answer(true);

        Ok(Answer { text, sources })
    }
}

#[async_trait]
impl RagApi for RagService {
    async fn ingest(&self, upload: DocumentUpload) -> Result<IngestOutcome, RagError> {
        self.ingest_upload(upload).await
    }

    async fn answer(&self, question: &str) -> Result<Answer, RagError> {
        self.answer_question(question).await
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}
