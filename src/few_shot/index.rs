//! Example Index
//!
//! Similarity index over example questions. An index without an embedding
//! capability, or over an empty corpus, is *unavailable*: lookups return
//! nothing and the prompt goes out without examples.

use crate::error::with_timeout;
use crate::few_shot::corpus::Example;
use crate::few_shot::vector_store::InMemoryVectorStore;
use crate::llm::EmbeddingProvider;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const DEFAULT_K: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexStatus {
    Ready { size: usize },
    Unavailable { reason: String },
}

pub struct ExampleIndex {
    store: Option<InMemoryVectorStore<Example>>,
    status: IndexStatus,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    embed_timeout: Duration,
    /// Set when the build failed on an embedding call that may succeed later.
    retryable: bool,
}

impl ExampleIndex {
    fn unavailable(reason: impl Into<String>, embed_timeout: Duration) -> Self {
        let reason = reason.into();
        warn!("Example index unavailable: {}. Few-shot examples will not be used.", reason);
        Self {
            store: None,
            status: IndexStatus::Unavailable { reason },
            embedder: None,
            embed_timeout,
            retryable: false,
        }
    }

    /// Embed every example question and index it. Never fails.
    pub async fn build(
        corpus: &[Example],
        embedder: Option<Arc<dyn EmbeddingProvider>>,
        embed_timeout: Duration,
    ) -> Self {
        let embedder = match embedder {
            Some(embedder) => embedder,
            None => return Self::unavailable("embeddings not available", embed_timeout),
        };
        if corpus.is_empty() {
            return Self::unavailable("no examples loaded", embed_timeout);
        }

        let questions: Vec<String> = corpus.iter().map(|e| e.question.clone()).collect();
        let embeddings = match with_timeout("example embedding", embed_timeout, embedder.embed(&questions)).await {
            Ok(embeddings) => embeddings,
            Err(e) => {
                return Self {
                    retryable: true,
                    ..Self::unavailable(format!("failed to embed examples: {}", e), embed_timeout)
                }
            }
        };
        if embeddings.len() != corpus.len() {
            return Self::unavailable(
                format!("expected {} embeddings, got {}", corpus.len(), embeddings.len()),
                embed_timeout,
            );
        }

        let dimension = embeddings[0].len();
        if dimension == 0 {
            return Self::unavailable("embedding provider returned empty vectors", embed_timeout);
        }

        let mut store = InMemoryVectorStore::new(dimension);
        for (example, embedding) in corpus.iter().zip(embeddings) {
            let mut example = example.clone();
            example.embedding = Some(embedding.clone());
            if let Err(e) = store.insert(example, embedding) {
                return Self::unavailable(e.to_string(), embed_timeout);
            }
        }

        info!(
            "Example index built from {} examples via {} (dimension {})",
            store.len(),
            embedder.name(),
            dimension
        );
        Self {
            status: IndexStatus::Ready { size: store.len() },
            store: Some(store),
            embedder: Some(embedder),
            embed_timeout,
            retryable: false,
        }
    }

    pub fn status(&self) -> &IndexStatus {
        &self.status
    }

    /// An unavailable index worth rebuilding on the next request.
    pub fn is_retryable(&self) -> bool {
        self.retryable
    }

    pub fn is_available(&self) -> bool {
        self.store.is_some()
    }

    pub fn len(&self) -> usize {
        self.store.as_ref().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Up to `min(k, corpus size)` examples nearest to `question`.
    pub async fn retrieve_similar(&self, question: &str, k: usize) -> Vec<Example> {
        let (Some(_), Some(embedder)) = (&self.store, &self.embedder) else {
            return Vec::new();
        };
        if k == 0 {
            return Vec::new();
        }

        let texts = [question.to_string()];
        let query_embedding = match with_timeout("question embedding", self.embed_timeout, embedder.embed(&texts)).await {
            Ok(mut vectors) if vectors.len() == 1 => vectors.remove(0),
            Ok(vectors) => {
                warn!("Expected one question embedding, got {}", vectors.len());
                return Vec::new();
            }
            Err(e) => {
                warn!("Failed to embed question, continuing without examples: {}", e);
                return Vec::new();
            }
        };
        self.nearest(&query_embedding, k)
    }

    /// Deterministic lookup for an already embedded question.
    pub fn nearest(&self, query_embedding: &[f32], k: usize) -> Vec<Example> {
        let Some(store) = &self.store else {
            return Vec::new();
        };
        match store.search(query_embedding, k) {
            Ok(results) => {
                debug!(
                    "Selected examples: {:?}",
                    results.iter().map(|r| (&r.item.id, r.score)).collect::<Vec<_>>()
                );
                results.into_iter().map(|r| r.item.clone()).collect()
            }
            Err(e) => {
                warn!("Example search failed: {}", e);
                Vec::new()
            }
        }
    }
}
