//! In-memory vector index for tests and small fixtures.

use crate::types::{Chunk, IndexMeta, IndexStats, ScoredChunk};
use crate::vector_index::{rank_top_k, similarity, VectorIndex};
use medbot_core::{AppError, AppResult};
use std::collections::HashSet;
use std::sync::Arc;

/// Brute-force index held entirely in memory.
///
/// Entries are kept in insertion order; re-inserting an id replaces the
/// entry in place.
pub struct MemoryIndex {
    meta: IndexMeta,
    entries: Vec<(Arc<Chunk>, Vec<f32>)>,
}

impl MemoryIndex {
    pub fn new(meta: IndexMeta) -> Self {
        Self {
            meta,
            entries: Vec::new(),
        }
    }

    /// Insert or replace a chunk.
    pub fn insert(&mut self, chunk: Chunk, embedding: Vec<f32>) -> AppResult<()> {
        if embedding.len() != self.meta.dimensions {
            return Err(AppError::InvalidInput(format!(
                "Chunk '{}' has {} dimensions, index expects {}",
                chunk.id,
                embedding.len(),
                self.meta.dimensions
            )));
        }

        let entry = (Arc::new(chunk), embedding);
        match self.entries.iter().position(|(c, _)| c.id == entry.0.id) {
            Some(pos) => self.entries[pos] = entry,
            None => self.entries.push(entry),
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl VectorIndex for MemoryIndex {
    fn meta(&self) -> &IndexMeta {
        &self.meta
    }

    fn search(&self, query: &[f32], top_k: usize) -> AppResult<Vec<ScoredChunk>> {
        let candidates = self
            .entries
            .iter()
            .map(|(chunk, embedding)| ScoredChunk {
                chunk: Arc::clone(chunk),
                score: similarity(self.meta.metric, query, embedding),
            })
            .collect();

        Ok(rank_top_k(candidates, top_k))
    }

    fn stats(&self) -> AppResult<IndexStats> {
        let sources: HashSet<&str> = self.entries.iter().map(|(c, _)| c.source.as_str()).collect();
        Ok(IndexStats {
            chunks_count: self.entries.len(),
            sources_count: sources.len(),
            meta: self.meta.clone(),
            size_bytes: 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use medbot_core::SimilarityMetric;

    fn index() -> MemoryIndex {
        MemoryIndex::new(IndexMeta {
            dimensions: 2,
            metric: SimilarityMetric::InnerProduct,
            embedding_model: None,
        })
    }

    #[test]
    fn test_insert_and_search() {
        let mut index = index();
        index.insert(Chunk::new("a", "alpha", "doc1"), vec![1.0, 0.0]).unwrap();
        index.insert(Chunk::new("b", "beta", "doc2"), vec![0.0, 1.0]).unwrap();

        let hits = index.search(&[0.2, 0.9], 1).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk.id, "b");
    }

    #[test]
    fn test_replace_keeps_position() {
        let mut index = index();
        index.insert(Chunk::new("a", "old", "doc"), vec![1.0, 0.0]).unwrap();
        index.insert(Chunk::new("b", "other", "doc"), vec![1.0, 0.0]).unwrap();
        index.insert(Chunk::new("a", "new", "doc"), vec![1.0, 0.0]).unwrap();

        assert_eq!(index.len(), 2);
        let hits = index.search(&[1.0, 0.0], 2).unwrap();
        assert_eq!(hits[0].chunk.text, "new");
        assert_eq!(hits[1].chunk.id, "b");
    }

    #[test]
    fn test_rejects_wrong_dimensions() {
        let mut index = index();
        let result = index.insert(Chunk::new("a", "alpha", "doc"), vec![1.0]);
        assert!(matches!(result, Err(AppError::InvalidInput(_))));
        assert!(index.is_empty());
    }

    #[test]
    fn test_stats_counts_sources() {
        let mut index = index();
        index.insert(Chunk::new("a", "x", "doc1"), vec![1.0, 0.0]).unwrap();
        index.insert(Chunk::new("b", "y", "doc1"), vec![0.0, 1.0]).unwrap();
        let stats = index.stats().unwrap();
        assert_eq!(stats.chunks_count, 2);
        assert_eq!(stats.sources_count, 1);
    }
}
