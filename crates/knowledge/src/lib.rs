//! Knowledge retrieval and answer synthesis.
//!
//! Provides the query side of retrieval-augmented answering: embedding a
//! question, ranking chunks from a prebuilt SQLite vector index, and running
//! the language model over the assembled prompt.

pub mod embeddings;
pub mod index;
pub mod memory_index;
pub mod rag;
pub mod retriever;
pub mod types;
pub mod vector_index;


// Re-export commonly used types
pub use embeddings::{create_provider, EmbeddingProvider};
pub use index::{IndexWriter, SqliteIndex};
pub use memory_index::MemoryIndex;
pub use rag::{
    AnswerEvent, AnswerPrefixFilter, AnswerResult, AnswerStream, Completion, GenerationParams,
    ModelOutput, SourceRef, Synthesizer, NO_RESULT,
};
pub use retriever::Retriever;
pub use types::{Chunk, IndexMeta, IndexStats, RetrievalResult, ScoredChunk};
pub use vector_index::VectorIndex;

use medbot_core::{AppResult, EmbeddingSettings};
use std::path::Path;

/// Statistics for the index at `path`, validated against `settings`.
pub fn stats(path: &Path, settings: &EmbeddingSettings) -> AppResult<IndexStats> {
    tracing::info!("Getting stats for vector index at {}", path.display());
    SqliteIndex::open(path, settings)?.stats()
}
