//! Vector Store
//!
//! In-memory nearest-neighbor search over fixed-dimension embeddings.
//! Entries keep insertion order, so equal scores resolve to the earlier entry.

use crate::error::{EngineError, Result};
use crate::llm::Embedding;

/// Search hit with its cosine similarity.
#[derive(Debug, Clone)]
pub struct SearchResult<'a, T> {
    pub item: &'a T,
    pub score: f32,
}

pub struct InMemoryVectorStore<T> {
    entries: Vec<(T, Embedding)>,
    dimension: usize,
}

impl<T> InMemoryVectorStore<T> {
    /// Create a new vector store with specified embedding dimension
    pub fn new(dimension: usize) -> Self {
        Self {
            entries: Vec::new(),
            dimension,
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn insert(&mut self, item: T, embedding: Embedding) -> Result<()> {
        if embedding.len() != self.dimension {
            return Err(EngineError::Embedding(format!(
                "Embedding dimension {} doesn't match store dimension {}",
                embedding.len(),
                self.dimension
            )));
        }
        self.entries.push((item, embedding));
        Ok(())
    }

    /// Top `top_k` entries by cosine similarity, highest first.
    ///
    /// Linear scan; the example corpus is small.
    pub fn search(&self, query_embedding: &[f32], top_k: usize) -> Result<Vec<SearchResult<'_, T>>> {
        if query_embedding.len() != self.dimension {
            return Err(EngineError::Embedding(format!(
                "Query embedding dimension {} doesn't match store dimension {}",
                query_embedding.len(),
                self.dimension
            )));
        }

        let mut results: Vec<SearchResult<'_, T>> = self
            .entries
            .iter()
            .map(|(item, embedding)| SearchResult {
                item,
                score: cosine_similarity(query_embedding, embedding),
            })
            .collect();

        // Stable sort keeps insertion order among equal scores.
        results.sort_by(|a, b| b.score.total_cmp(&a.score));
        results.truncate(top_k);
        Ok(results)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Compute cosine similarity between two vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    let similarity = dot_product / (norm_a * norm_b);
    if similarity.is_nan() {
        0.0
    } else {
        similarity
    }
}
