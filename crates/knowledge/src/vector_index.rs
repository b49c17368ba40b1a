//! Vector index abstraction.
//!
//! Indexes are read-only once a pipeline is serving: every session shares one
//! handle, so the trait only exposes queries. Writers are backend-specific.

use crate::types::{IndexMeta, IndexStats, ScoredChunk};
use medbot_core::{AppResult, SimilarityMetric};
use std::collections::HashSet;

/// Trait for vector index backends.
pub trait VectorIndex: Send + Sync {
    /// Build-time metadata (dimensions, metric, embedding model).
    fn meta(&self) -> &IndexMeta;

    /// Search for the `top_k` chunks most similar to `query`.
    ///
    /// Results are ordered by descending score with ties in insertion order,
    /// and never contain the same chunk id twice.
    ///
    /// # Errors
    /// `AppError::IndexUnavailable` if the backing store cannot be read.
    fn search(&self, query: &[f32], top_k: usize) -> AppResult<Vec<ScoredChunk>>;

    /// Collect statistics about the index.
    fn stats(&self) -> AppResult<IndexStats>;
}

/// Similarity between a query and a stored vector under `metric`.
///
/// Vectors of different length score 0. NaN scores are pushed to the bottom.
pub fn similarity(metric: SimilarityMetric, a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let score = match metric {
        SimilarityMetric::InnerProduct => dot,
        SimilarityMetric::Cosine => {
            let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
            let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
            if norm_a == 0.0 || norm_b == 0.0 {
                0.0
            } else {
                dot / (norm_a * norm_b)
            }
        }
    };

    if score.is_nan() {
        f32::NEG_INFINITY
    } else {
        score
    }
}

/// Rank candidates given in insertion order.
///
/// Stable sort by descending score, so equal scores keep insertion order.
/// Duplicate ids keep only their best-ranked occurrence.
pub fn rank_top_k(mut candidates: Vec<ScoredChunk>, top_k: usize) -> Vec<ScoredChunk> {
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut seen = HashSet::new();
    candidates.retain(|hit| seen.insert(hit.chunk.id.clone()));
    candidates.truncate(top_k);
    candidates
}
