#![deny(missing_docs)]

//! Core library for the RAG gateway: document ingestion, retrieval-augmented answering, and
//! streamed summarization behind a small HTTP API.

/// HTTP routing and REST handlers.
pub mod api;
/// Environment-driven configuration management.
pub mod config;
/// Embedding client abstraction and adapters.
pub mod embedding;
/// In-memory vector index.
pub mod index;
/// Chat-completion client abstraction and adapters.
pub mod llm;
/// Structured logging and tracing setup.
pub mod logging;
/// Ingestion and answering metrics helpers.
pub mod metrics;
mod openai;
/// Document extraction, chunking, and the RAG service.
pub mod processing;
/// Blocking and streamed summarization.
pub mod summarization;
