//! Offline hashing embedder.

use crate::embeddings::provider::EmbeddingProvider;
use medbot_core::{AppError, AppResult};
use std::collections::BTreeMap;

const MODEL_NAME: &str = "hashing-v1";

/// Words too common to carry signal.
const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "are", "was", "were", "with", "from", "this", "that", "have", "has",
    "had", "its", "their", "they", "them", "what", "which", "who", "how", "can", "not", "but",
];

/// Deterministic feature-hashing embedder for offline use and tests.
///
/// Hashes lowercase word unigrams plus their character trigrams into a
/// fixed number of buckets and L2-normalises the result. Texts sharing
/// vocabulary land close together under cosine similarity; there is no
/// semantic understanding beyond that.
#[derive(Debug)]
pub struct HashingProvider {
    dimensions: usize,
}

impl HashingProvider {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    fn bucket(&self, feature: &str, seed: u64) -> usize {
        // FNV-1a
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325 ^ seed;
        for byte in feature.bytes() {
            hash ^= u64::from(byte);
            hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
        }
        (hash % self.dimensions as u64) as usize
    }

    fn embed_text(&self, text: &str) -> AppResult<Vec<f32>> {
        if self.dimensions == 0 {
            return Err(AppError::Embedding(
                "Hashing embedder configured with zero dimensions".to_string(),
            ));
        }

        let lower = text.to_lowercase();
        // Ordered so bucket sums accumulate identically on every call
        let mut counts: BTreeMap<&str, u32> = BTreeMap::new();
        for word in lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| w.chars().count() > 2 && !STOP_WORDS.contains(w))
        {
            *counts.entry(word).or_default() += 1;
        }

        let mut vector = vec![0.0f32; self.dimensions];
        for (word, count) in counts {
            let weight = (count as f32).sqrt();
            vector[self.bucket(word, 0)] += 2.0 * weight;

            let chars: Vec<char> = word.chars().collect();
            for window in chars.windows(3) {
                let trigram: String = window.iter().collect();
                vector[self.bucket(&trigram, 1)] += weight;
            }
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }

        Ok(vector)
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for HashingProvider {
    fn provider_name(&self) -> &str {
        "hashing"
    }

    fn model_name(&self) -> &str {
        MODEL_NAME
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        texts.iter().map(|text| self.embed_text(text)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[tokio::test]
    async fn test_unit_length_and_dimensions() {
        let provider = HashingProvider::new(128);
        let embedding = provider.embed("Iron deficiency anemia").await.unwrap();

        assert_eq!(embedding.len(), 128);
        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 0.001);
    }

    #[tokio::test]
    async fn test_deterministic() {
        let provider = HashingProvider::new(128);
        let a = provider.embed("fatigue and pallor").await.unwrap();
        let b = provider.embed("fatigue and pallor").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_bitwise_identical_when_buckets_collide() {
        let text = "Iron deficiency anemia causes fatigue pallor shortness breath \
                    and dizziness; chronic kidney disease reduces erythropoietin";
        let bits = |v: Vec<f32>| v.into_iter().map(f32::to_bits).collect::<Vec<u32>>();

        let expected = bits(HashingProvider::new(8).embed(text).await.unwrap());
        for _ in 0..20 {
            let again = bits(HashingProvider::new(8).embed(text).await.unwrap());
            assert_eq!(again, expected);
        }
    }

    #[tokio::test]
    async fn test_shared_vocabulary_scores_higher() {
        let provider = HashingProvider::new(256);
        let query = provider.embed("causes of anemia").await.unwrap();
        let related = provider
            .embed("Anemia is most often caused by iron deficiency")
            .await
            .unwrap();
        let unrelated = provider
            .embed("Sprained ankles heal with rest and elevation")
            .await
            .unwrap();

        assert!(cosine(&query, &related) > cosine(&query, &unrelated));
    }

    #[tokio::test]
    async fn test_empty_text_is_zero_vector() {
        let provider = HashingProvider::new(32);
        let embedding = provider.embed("").await.unwrap();
        assert!(embedding.iter().all(|&x| x == 0.0));
    }

    #[tokio::test]
    async fn test_zero_dimensions_is_embedding_error() {
        let provider = HashingProvider::new(0);
        let result = provider.embed("anything").await;
        assert!(matches!(result, Err(AppError::Embedding(_))));
    }

    #[tokio::test]
    async fn test_utf8_input() {
        let provider = HashingProvider::new(64);
        let embedding = provider.embed("Anämie und Müdigkeit ✓").await.unwrap();
        assert_eq!(embedding.len(), 64);
    }
}
