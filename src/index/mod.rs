//! Process-wide in-memory vector index.
//!
//! Entries are `(id, chunk, vector)` tuples kept in insertion order behind a
//! `tokio::sync::RwLock`. Embedding happens outside the lock; each batch is appended under a
//! single write guard, so queries never observe half of an ingested document. Nothing is
//! persisted: the index lives exactly as long as the process.

use crate::embedding::{EmbeddingClient, EmbeddingClientError};
use crate::processing::DocumentChunk;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Errors emitted while inserting into or querying the index.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Embedding provider failed to produce vectors.
    #[error("Failed to generate embeddings: {0}")]
    Embedding(#[from] EmbeddingClientError),
    /// Provider returned a different number of vectors than inputs.
    #[error("Embedding count mismatch: expected {expected}, got {actual}")]
    EmbeddingCountMismatch {
        /// Number of texts submitted.
        expected: usize,
        /// Number of vectors returned.
        actual: usize,
    },
    /// Vector dimensionality differs from the vectors already stored.
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimension fixed by earlier entries.
        expected: usize,
        /// Dimension of the offending vector.
        actual: usize,
    },
}

/// Stored chunk plus its embedding.
#[derive(Debug, Clone)]
pub struct IndexedEntry {
    /// Identifier assigned at insertion.
    pub id: Uuid,
    /// Indexed chunk.
    pub chunk: DocumentChunk,
    /// Embedding of `chunk.text`.
    pub vector: Vec<f32>,
}

/// Chunk returned by a similarity query with its cosine score.
#[derive(Debug, Clone)]
pub struct ScoredEntry {
    /// Identifier assigned when the chunk was inserted.
    pub id: Uuid,
    /// Matching chunk.
    pub chunk: DocumentChunk,
    /// Cosine similarity to the query vector.
    pub score: f32,
}

/// In-memory k-nearest-neighbour index over chunk embeddings.
pub struct VectorIndex {
    embedder: Arc<dyn EmbeddingClient>,
    entries: RwLock<Vec<IndexedEntry>>,
}

impl VectorIndex {
    /// Create an empty index that embeds through `embedder`.
    pub fn new(embedder: Arc<dyn EmbeddingClient>) -> Self {
        Self {
            embedder,
            entries: RwLock::new(Vec::new()),
        }
    }

    /// Embed and store `chunks`, returning the ids assigned in input order.
    pub async fn insert(&self, chunks: Vec<DocumentChunk>) -> Result<Vec<Uuid>, IndexError> {
        if chunks.is_empty() {
            return Ok(Vec::new());
        }

        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let vectors = self.embedder.generate_embeddings(texts).await?;
        if vectors.len() != chunks.len() {
            return Err(IndexError::EmbeddingCountMismatch {
                expected: chunks.len(),
                actual: vectors.len(),
            });
        }

        let mut entries = self.entries.write().await;
        let expected = entries
            .first()
            .map(|entry| entry.vector.len())
            .or_else(|| vectors.first().map(Vec::len))
            .unwrap_or_default();
        if let Some(actual) = vectors
            .iter()
            .map(Vec::len)
            .find(|dimension| *dimension != expected)
        {
            return Err(IndexError::DimensionMismatch { expected, actual });
        }

        let ids: Vec<Uuid> = chunks.iter().map(|_| Uuid::new_v4()).collect();
        entries.extend(
            chunks
                .into_iter()
                .zip(vectors)
                .zip(ids.iter().copied())
                .map(|((chunk, vector), id)| IndexedEntry { id, chunk, vector }),
        );
        tracing::debug!(
            inserted = ids.len(),
            total = entries.len(),
            dimension = expected,
            "Chunks added to vector index"
        );
        Ok(ids)
    }

    /// Return up to `k` chunks ranked by descending cosine similarity to `text`.
    ///
    /// Ties keep insertion order. An empty index answers without calling the embedder.
    pub async fn query(&self, text: &str, k: usize) -> Result<Vec<ScoredEntry>, IndexError> {
        if k == 0 || self.is_empty().await {
            return Ok(Vec::new());
        }

        let mut vectors = self
            .embedder
            .generate_embeddings(vec![text.to_string()])
            .await?;
        if vectors.len() != 1 {
            return Err(IndexError::EmbeddingCountMismatch {
                expected: 1,
                actual: vectors.len(),
            });
        }
        let query = vectors.remove(0);

        let entries = self.entries.read().await;
        if let Some(expected) = entries.first().map(|entry| entry.vector.len()) {
            if expected != query.len() {
                return Err(IndexError::DimensionMismatch {
                    expected,
                    actual: query.len(),
                });
            }
        }

        let mut scored: Vec<ScoredEntry> = entries
            .iter()
            .map(|entry| ScoredEntry {
                id: entry.id,
                chunk: entry.chunk.clone(),
                score: cosine_similarity(&query, &entry.vector),
            })
            .collect();
        // Stable sort: equal scores keep insertion order.
        scored.sort_by(|left, right| right.score.total_cmp(&left.score));
        scored.truncate(k);
        Ok(scored)
    }

    /// Number of stored entries.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether the index holds no entries.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Dimension shared by all stored vectors, if any are stored.
    pub async fn dimension(&self) -> Option<usize> {
        self.entries
            .read()
            .await
            .first()
            .map(|entry| entry.vector.len())
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot_product / (norm_a * norm_b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Embeds known texts to fixed vectors and counts provider calls.
    struct TableEmbedder {
        table: HashMap<String, Vec<f32>>,
        calls: AtomicUsize,
    }

    impl TableEmbedder {
        fn new(pairs: &[(&str, Vec<f32>)]) -> Arc<Self> {
            Arc::new(Self {
                table: pairs
                    .iter()
                    .map(|(text, vector)| (text.to_string(), vector.clone()))
                    .collect(),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl EmbeddingClient for TableEmbedder {
        async fn generate_embeddings(
            &self,
            texts: Vec<String>,
        ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            texts
                .iter()
                .map(|text| {
                    self.table.get(text).cloned().ok_or_else(|| {
                        EmbeddingClientError::GenerationFailed(format!("unknown text {text}"))
                    })
                })
                .collect()
        }
    }

    fn chunk(text: &str, source: &str) -> DocumentChunk {
        DocumentChunk::new(text, Some(source))
    }

    #[tokio::test]
    async fn empty_index_returns_nothing_without_embedding() {
        let embedder = TableEmbedder::new(&[]);
        let index = VectorIndex::new(embedder.clone());

        let results = index.query("anything", 4).await.expect("query");

        assert!(results.is_empty());
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn empty_insert_is_a_noop() {
        let embedder = TableEmbedder::new(&[]);
        let index = VectorIndex::new(embedder.clone());

        assert!(index.insert(Vec::new()).await.expect("insert").is_empty());
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
        assert!(index.dimension().await.is_none());
    }

    #[tokio::test]
    async fn ranks_by_similarity_and_truncates_to_k() {
        let embedder = TableEmbedder::new(&[
            ("north", vec![0.0, 1.0]),
            ("east", vec![1.0, 0.0]),
            ("north-east", vec![1.0, 1.0]),
            ("query", vec![0.1, 1.0]),
        ]);
        let index = VectorIndex::new(embedder);
        index
            .insert(vec![
                chunk("east", "a.txt"),
                chunk("north-east", "b.txt"),
                chunk("north", "c.txt"),
            ])
            .await
            .expect("insert");

        let results = index.query("query", 2).await.expect("query");
        let texts: Vec<&str> = results.iter().map(|hit| hit.chunk.text.as_str()).collect();

        assert_eq!(texts, vec!["north", "north-east"]);
        assert!(results[0].score >= results[1].score);
        assert_eq!(index.len().await, 3);
    }

    #[tokio::test]
    async fn ties_keep_insertion_order() {
        let embedder = TableEmbedder::new(&[
            ("first", vec![1.0, 0.0]),
            ("second", vec![2.0, 0.0]),
            ("third", vec![3.0, 0.0]),
            ("query", vec![1.0, 0.0]),
        ]);
        let index = VectorIndex::new(embedder);
        index
            .insert(vec![chunk("first", "a"), chunk("second", "b")])
            .await
            .expect("insert");
        index.insert(vec![chunk("third", "c")]).await.expect("insert");

        let results = index.query("query", 4).await.expect("query");
        let texts: Vec<&str> = results.iter().map(|hit| hit.chunk.text.as_str()).collect();

        assert_eq!(texts, vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn rejects_dimension_changes() {
        let embedder = TableEmbedder::new(&[
            ("flat", vec![1.0, 0.0]),
            ("tall", vec![1.0, 0.0, 0.0]),
        ]);
        let index = VectorIndex::new(embedder);
        index.insert(vec![chunk("flat", "a")]).await.expect("insert");

        let error = index
            .insert(vec![chunk("tall", "b")])
            .await
            .expect_err("dimension mismatch");

        assert!(matches!(
            error,
            IndexError::DimensionMismatch {
                expected: 2,
                actual: 3
            }
        ));
        assert_eq!(index.len().await, 1);
        assert_eq!(index.dimension().await, Some(2));
    }

    #[tokio::test]
    async fn embedding_failure_leaves_index_untouched() {
        let embedder = TableEmbedder::new(&[("known", vec![1.0])]);
        let index = VectorIndex::new(embedder);

        let error = index
            .insert(vec![chunk("known", "a"), chunk("unknown", "a")])
            .await
            .expect_err("embedding failure");

        assert!(matches!(error, IndexError::Embedding(_)));
        assert!(index.is_empty().await);
    }

    #[test]
    fn cosine_handles_zero_vectors() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert!((cosine_similarity(&[1.0, 1.0], &[2.0, 2.0]) - 1.0).abs() < 1e-6);
    }
}
