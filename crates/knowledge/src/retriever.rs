//! Query-time retrieval: embed the question, search the index.

use crate::embeddings::EmbeddingProvider;
use crate::types::RetrievalResult;
use crate::vector_index::VectorIndex;
use medbot_core::{AppError, AppResult};
use std::sync::Arc;

/// Embeds queries and returns the `k` most similar chunks.
///
/// Holds shared handles only; cloning is cheap and clones may be used from
/// many sessions at once.
#[derive(Clone)]
pub struct Retriever {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
}

impl Retriever {
    /// Pair an embedder with an index.
    ///
    /// # Errors
    /// `AppError::Config` if the embedder's dimensions differ from the index.
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, index: Arc<dyn VectorIndex>) -> AppResult<Self> {
        let index_dims = index.meta().dimensions;
        if embedder.dimensions() != index_dims {
            return Err(AppError::Config(format!(
                "Embedding dimension mismatch: embedder '{}' produces {}, index has {}",
                embedder.model_name(),
                embedder.dimensions(),
                index_dims
            )));
        }

        Ok(Self { embedder, index })
    }

    pub fn index(&self) -> &Arc<dyn VectorIndex> {
        &self.index
    }

    pub fn embedder(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedder
    }

    /// Retrieve up to `k` chunks for `query`.
    ///
    /// Returns fewer than `k` hits only when the index holds fewer chunks.
    ///
    /// # Errors
    /// - `AppError::InvalidInput` for an empty query or `k == 0`
    /// - `AppError::Embedding` if the query cannot be embedded
    /// - `AppError::IndexUnavailable` if the index cannot be read
    pub async fn retrieve(&self, query: &str, k: usize) -> AppResult<RetrievalResult> {
        if query.trim().is_empty() {
            return Err(AppError::InvalidInput("Query is empty".to_string()));
        }
        if k == 0 {
            return Err(AppError::InvalidInput("k must be at least 1".to_string()));
        }

        let embedding = self.embedder.embed(query).await.map_err(|e| match e {
            AppError::Embedding(_) => e,
            other => AppError::Embedding(other.to_string()),
        })?;

        let dims = self.index.meta().dimensions;
        if embedding.len() != dims {
            return Err(AppError::Config(format!(
                "Query embedding has {} dimensions, index has {}",
                embedding.len(),
                dims
            )));
        }

        // Brute-force scan touches the disk; keep it off the async workers
        let index = Arc::clone(&self.index);
        let hits = tokio::task::spawn_blocking(move || index.search(&embedding, k))
            .await
            .map_err(|e| AppError::IndexUnavailable(format!("Index search task failed: {}", e)))??;

        tracing::debug!(
            k,
            returned = hits.len(),
            top_score = hits.first().map(|h| h.score),
            "Retrieved chunks"
        );

        Ok(RetrievalResult::from_ranked(hits))
    }
}
