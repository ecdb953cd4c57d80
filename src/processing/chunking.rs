//! Overlapping text chunking on top of `text-splitter`.
//!
//! The splitter cuts on the coarsest semantic boundary that fits (paragraphs, lines,
//! sentences, words, then graphemes) and packs as much text as possible into each chunk of at
//! most `chunk_size` units. Adjacent chunks share up to `chunk_overlap` units.
//!
//! Lengths are measured in characters by default. Setting `TEXT_SPLITTER_LENGTH_UNIT=tokens`
//! switches to `tiktoken-rs` counts for the embedding model, falling back to `cl100k_base` when
//! the model has no known encoding.

use crate::config::LengthUnit;
use std::sync::Arc;
use text_splitter::{ChunkConfig, ChunkSizer};
use tiktoken_rs::{
    CoreBPE, cl100k_base, get_bpe_from_model, o200k_base, p50k_base, p50k_edit, r50k_base,
};

use super::types::{ChunkingError, DocumentChunk};

/// Chunk sizing parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    /// Maximum chunk length.
    pub chunk_size: usize,
    /// Maximum length carried over from one chunk into the next.
    pub chunk_overlap: usize,
    /// Unit in which both values are measured.
    pub length_unit: LengthUnit,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            length_unit: LengthUnit::Characters,
        }
    }
}

/// Measures chunk length in the configured unit.
#[derive(Clone)]
enum Sizer {
    Characters,
    Tokens(Arc<CoreBPE>),
}

impl ChunkSizer for Sizer {
    fn size(&self, chunk: &str) -> usize {
        match self {
            Self::Characters => chunk.chars().count(),
            Self::Tokens(encoding) => encoding.encode_ordinary(chunk).len(),
        }
    }
}

/// Deterministic splitter producing overlapping chunks.
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    inner: text_splitter::TextSplitter<Sizer>,
}

impl std::fmt::Debug for TextSplitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextSplitter")
            .field("chunk_size", &self.chunk_size)
            .field("chunk_overlap", &self.chunk_overlap)
            .finish_non_exhaustive()
    }
}

impl TextSplitter {
    /// Build a splitter; `model` selects the tokenizer when lengths are measured in tokens.
    pub fn new(config: ChunkingConfig, model: &str) -> Result<Self, ChunkingError> {
        let sizer = match config.length_unit {
            LengthUnit::Characters => Sizer::Characters,
            LengthUnit::Tokens => Sizer::Tokens(Arc::new(build_encoding(model)?)),
        };
        Self::with_sizer(config.chunk_size, config.chunk_overlap, sizer)
    }

    fn with_sizer(
        chunk_size: usize,
        chunk_overlap: usize,
        sizer: Sizer,
    ) -> Result<Self, ChunkingError> {
        let too_large = || ChunkingError::OverlapTooLarge {
            overlap: chunk_overlap,
            size: chunk_size,
        };
        if chunk_size == 0 {
            return Err(ChunkingError::InvalidChunkSize);
        }
        if chunk_overlap >= chunk_size {
            return Err(too_large());
        }

        let chunk_config = ChunkConfig::new(chunk_size)
            .with_overlap(chunk_overlap)
            .map_err(|_| too_large())?
            .with_sizer(sizer);
        Ok(Self {
            chunk_size,
            chunk_overlap,
            inner: text_splitter::TextSplitter::new(chunk_config),
        })
    }

    /// Maximum chunk length in the configured unit.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Maximum overlap between adjacent chunks in the configured unit.
    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Split `text` into chunks tagged with `source` (or `"unknown"`).
    pub fn split(&self, text: &str, source: Option<&str>) -> Vec<DocumentChunk> {
        self.split_text(text)
            .into_iter()
            .map(|chunk| DocumentChunk::new(chunk, source))
            .collect()
    }

    /// Split `text` into trimmed, non-empty chunk strings.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.inner
            .chunks(text)
            .map(str::trim)
            .filter(|chunk| !chunk.is_empty())
            .map(str::to_owned)
            .collect()
    }
}

fn build_encoding(model: &str) -> Result<CoreBPE, ChunkingError> {
    let normalized = model.trim();
    let target = if normalized.is_empty() {
        "cl100k_base"
    } else {
        normalized
    };
    resolve_encoding(target).map_err(|source| ChunkingError::Tokenizer {
        model: target.to_string(),
        source,
    })
}

fn resolve_encoding(model: &str) -> Result<CoreBPE, anyhow::Error> {
    match get_bpe_from_model(model) {
        Ok(encoding) => Ok(encoding),
        Err(model_err) => {
            tracing::debug!(
                model,
                error = %model_err,
                "Tokenizer model lookup failed; trying encoding name"
            );
            if let Some(candidate) = encoding_from_name(model) {
                candidate
            } else {
                tracing::warn!(
                    model,
                    "Falling back to 'cl100k_base' encoding for token counting"
                );
                cl100k_base()
            }
        }
    }
}

fn encoding_from_name(name: &str) -> Option<Result<CoreBPE, anyhow::Error>> {
    match name {
        "cl100k_base" => Some(cl100k_base()),
        "o200k_base" => Some(o200k_base()),
        "p50k_base" => Some(p50k_base()),
        "p50k_edit" => Some(p50k_edit()),
        "r50k_base" | "gpt2" => Some(r50k_base()),
        _ => None,
    }
}
