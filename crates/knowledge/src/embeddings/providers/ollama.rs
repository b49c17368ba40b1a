//! Ollama embedding provider.
//!
//! Calls `/api/embeddings` once per text. Failed calls are reported, not
//! retried: a query that cannot be embedded fails that turn only.

use crate::embeddings::EmbeddingProvider;
use async_trait::async_trait;
use medbot_core::{AppError, AppResult, EmbeddingSettings};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument};

const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
const EMBEDDING_ENDPOINT: &str = "/api/embeddings";

/// Request timeout in seconds
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Ollama embedding provider using the local API.
#[derive(Debug, Clone)]
pub struct OllamaProvider {
    client: Client,
    base_url: String,
    model: String,
    dimensions: usize,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
}

impl OllamaProvider {
    /// Build a provider without contacting the host.
    pub fn new(settings: &EmbeddingSettings) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build HTTP client: {}", e)))?;

        let base_url = settings
            .endpoint
            .as_deref()
            .unwrap_or(DEFAULT_OLLAMA_URL)
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            client,
            base_url,
            model: settings.model.clone(),
            dimensions: settings.dimensions,
        })
    }

    /// Build a provider and verify the model answers with the configured
    /// dimensions.
    ///
    /// # Errors
    /// `AppError::Config` if the host is unreachable, the model is missing,
    /// or the vectors have the wrong length.
    pub async fn connect(settings: &EmbeddingSettings) -> AppResult<Self> {
        let provider = Self::new(settings)?;
        provider.verify_connection().await?;
        Ok(provider)
    }

    #[instrument(skip(self), fields(model = %self.model))]
    async fn verify_connection(&self) -> AppResult<()> {
        debug!("Verifying Ollama embeddings at {}", self.base_url);

        let embedding = self.request_embedding("connection check").await.map_err(|e| {
            AppError::Config(format!(
                "Embedding model '{}' not available at {} ({}). Run: ollama pull {}",
                self.model, self.base_url, e, self.model
            ))
        })?;

        if embedding.len() != self.dimensions {
            return Err(AppError::Config(format!(
                "Embedding model '{}' returned {} dimensions, expected {}",
                self.model,
                embedding.len(),
                self.dimensions
            )));
        }

        debug!("Embedding model '{}' ready", self.model);
        Ok(())
    }

    async fn request_embedding(&self, text: &str) -> AppResult<Vec<f32>> {
        let url = format!("{}{}", self.base_url, EMBEDDING_ENDPOINT);
        let body = EmbeddingRequest {
            model: &self.model,
            prompt: text,
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Embedding(format!("Failed to reach Ollama: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            let message = serde_json::from_str::<ErrorResponse>(&error_text)
                .map(|parsed| parsed.error)
                .unwrap_or(error_text);
            return Err(AppError::Embedding(format!(
                "Ollama API error ({}): {}",
                status, message
            )));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| AppError::Embedding(format!("Failed to parse Ollama response: {}", e)))?;

        Ok(parsed.embedding)
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaProvider {
    fn provider_name(&self) -> &str {
        "ollama"
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    #[instrument(skip(self, text), fields(text_len = text.len(), model = %self.model))]
    async fn embed(&self, text: &str) -> AppResult<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(AppError::Embedding("Cannot embed empty text".to_string()));
        }

        let embedding = self.request_embedding(text).await?;
        if embedding.len() != self.dimensions {
            return Err(AppError::Embedding(format!(
                "Unexpected embedding dimensions: got {}, expected {}",
                embedding.len(),
                self.dimensions
            )));
        }
        Ok(embedding)
    }

    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        // No batch endpoint; embed sequentially
        let mut embeddings = Vec::with_capacity(texts.len());
        for text in texts {
            embeddings.push(self.embed(text).await?);
        }
        Ok(embeddings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(endpoint: &str) -> EmbeddingSettings {
        EmbeddingSettings {
            provider: "ollama".to_string(),
            model: "all-minilm".to_string(),
            dimensions: 384,
            endpoint: Some(endpoint.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_new_trims_endpoint() {
        let provider = OllamaProvider::new(&settings("http://gpu-box:11434/")).unwrap();
        assert_eq!(provider.base_url, "http://gpu-box:11434");
        assert_eq!(provider.model_name(), "all-minilm");
        assert_eq!(provider.dimensions(), 384);
    }

    #[tokio::test]
    async fn test_empty_text_rejected_without_request() {
        let provider = OllamaProvider::new(&settings("http://127.0.0.1:9")).unwrap();
        let result = provider.embed("   ").await;
        assert!(matches!(result, Err(AppError::Embedding(_))));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_embedding_error() {
        // Port 9 (discard) is not an Ollama server
        let provider = OllamaProvider::new(&settings("http://127.0.0.1:9")).unwrap();
        let result = provider.embed("anemia").await;
        assert!(matches!(result, Err(AppError::Embedding(_))));
    }

    #[tokio::test]
    async fn test_connect_to_unreachable_host_is_config_error() {
        let result = OllamaProvider::connect(&settings("http://127.0.0.1:9")).await;
        assert!(matches!(result, Err(AppError::Config(_))));
    }
}
