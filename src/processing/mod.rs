//! Document pipeline: extraction, chunking, and retrieval-augmented answering.

pub mod chunking;
pub mod extract;
mod service;
pub mod types;

pub use chunking::{ChunkingConfig, TextSplitter};
pub use extract::DocumentKind;
pub use service::{NO_DOCUMENTS_ANSWER, RagApi, RagService};
pub use types::{
    Answer, ChunkingError, DocumentChunk, DocumentUpload, ExtractionError, IngestOutcome,
    RagError, UNKNOWN_SOURCE,
};
