//! Knowledge type definitions.

use medbot_core::SimilarityMetric;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A retrievable unit of source text. Immutable once indexed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Unique chunk identifier within the index
    pub id: String,

    /// Text content
    pub text: String,

    /// Source document identifier (file name, URL, ...)
    pub source: String,

    /// Page within the source document, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,

    /// Character offset within the source document, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<u64>,
}

impl Chunk {
    /// Create a chunk without location metadata.
    pub fn new(id: impl Into<String>, text: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            source: source.into(),
            page: None,
            offset: None,
        }
    }

    /// Attach a page number.
    pub fn with_page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }

    /// Attach a character offset.
    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Human-readable location, e.g. "anemia.pdf p. 12".
    pub fn location(&self) -> String {
        match self.page {
            Some(page) => format!("{} p. {}", self.source, page),
            None => self.source.clone(),
        }
    }
}

/// A chunk paired with its similarity to the query.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: Arc<Chunk>,
    pub score: f32,
}

/// Ranked chunks for one query.
///
/// Sorted by descending score, ties in index insertion order, no chunk id
/// appears twice.
#[derive(Debug, Clone, Default)]
pub struct RetrievalResult {
    hits: Vec<ScoredChunk>,
}

impl RetrievalResult {
    /// Wrap hits that are already ranked.
    pub(crate) fn from_ranked(hits: Vec<ScoredChunk>) -> Self {
        Self { hits }
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn hits(&self) -> &[ScoredChunk] {
        &self.hits
    }

    /// Chunk handles in rank order.
    pub fn chunks(&self) -> Vec<Arc<Chunk>> {
        self.hits.iter().map(|hit| Arc::clone(&hit.chunk)).collect()
    }

    pub fn scores(&self) -> Vec<f32> {
        self.hits.iter().map(|hit| hit.score).collect()
    }

    /// Score of the best hit, if any.
    pub fn top_score(&self) -> Option<f32> {
        self.hits.first().map(|hit| hit.score)
    }
}

/// Build-time properties recorded inside a vector index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexMeta {
    /// Embedding vector dimensions
    pub dimensions: usize,

    /// Similarity metric the index was built for
    pub metric: SimilarityMetric,

    /// Embedding model used at build time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding_model: Option<String>,
}

/// Statistics for a vector index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexStats {
    /// Number of chunks
    pub chunks_count: usize,

    /// Number of distinct source documents
    pub sources_count: usize,

    /// Build-time metadata
    pub meta: IndexMeta,

    /// Size of the index file in bytes (0 for in-memory indexes)
    pub size_bytes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_location() {
        let chunk = Chunk::new("c1", "Iron deficiency", "anemia.pdf").with_page(12);
        assert_eq!(chunk.location(), "anemia.pdf p. 12");

        let bare = Chunk::new("c2", "text", "notes.txt");
        assert_eq!(bare.location(), "notes.txt");
    }

    #[test]
    fn test_retrieval_result_accessors() {
        let hits = vec![
            ScoredChunk {
                chunk: Arc::new(Chunk::new("a", "first", "doc")),
                score: 0.9,
            },
            ScoredChunk {
                chunk: Arc::new(Chunk::new("b", "second", "doc")),
                score: 0.4,
            },
        ];
        let result = RetrievalResult::from_ranked(hits);

        assert_eq!(result.len(), 2);
        assert_eq!(result.top_score(), Some(0.9));
        assert_eq!(result.scores(), vec![0.9, 0.4]);
        assert_eq!(result.chunks()[1].id, "b");
        assert!(RetrievalResult::default().top_score().is_none());
    }
}
