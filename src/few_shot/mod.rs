//! Few-shot example retrieval
//!
//! `FewShotSelector` owns the memoized corpus and index. The first caller loads
//! and embeds; concurrent callers wait for that build and reuse it. An index
//! left unavailable by a failed embedding call is rebuilt on a later request.

pub mod corpus;
pub mod index;
pub mod vector_store;

pub use corpus::{local_examples, CorpusSource, Example, ExampleCorpus, RemoteCollection};
pub use index::{ExampleIndex, IndexStatus, DEFAULT_K};
pub use vector_store::{cosine_similarity, InMemoryVectorStore};

use crate::llm::EmbeddingProvider;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::info;

pub struct FewShotSelector {
    corpus: ExampleCorpus,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    embed_timeout: Duration,
    index: RwLock<Option<Arc<ExampleIndex>>>,
    build: Mutex<()>,
}

impl FewShotSelector {
    pub fn new(
        corpus: ExampleCorpus,
        embedder: Option<Arc<dyn EmbeddingProvider>>,
        embed_timeout: Duration,
    ) -> Self {
        Self {
            corpus,
            embedder,
            embed_timeout,
            index: RwLock::new(None),
            build: Mutex::new(()),
        }
    }

    /// A selector that never returns examples.
    pub fn disabled() -> Self {
        Self::new(ExampleCorpus::fixed(Vec::new()), None, Duration::from_secs(1))
    }

    pub async fn index(&self) -> Arc<ExampleIndex> {
        let seen = self.index.read().await.clone();
        if let Some(index) = &seen {
            if !index.is_retryable() {
                return Arc::clone(index);
            }
        }

        let _build = self.build.lock().await;
        // Someone else may have built or rebuilt while we waited.
        let latest = self.index.read().await.clone();
        if let Some(latest) = latest {
            let rebuilt = seen.as_ref().map_or(true, |seen| !Arc::ptr_eq(seen, &latest));
            if !latest.is_retryable() || rebuilt {
                return latest;
            }
            info!("Retrying example index build");
        }

        let examples = self.corpus.load().await;
        let index = Arc::new(ExampleIndex::build(&examples, self.embedder.clone(), self.embed_timeout).await);
        *self.index.write().await = Some(Arc::clone(&index));
        index
    }

    /// Build the index ahead of the first request.
    pub async fn warm_up(&self) -> IndexStatus {
        self.index().await.status().clone()
    }

    pub async fn select(&self, question: &str, k: usize) -> Vec<Example> {
        self.index().await.retrieve_similar(question, k).await
    }
}
