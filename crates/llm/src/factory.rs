//! LLM provider factory.
//!
//! Resolves a provider name from configuration into a shared client.

use crate::client::LlmClient;
use crate::providers::OllamaClient;
use medbot_core::{AppError, AppResult};
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

/// Create an LLM client based on the provider name.
///
/// # Arguments
/// * `provider` - Provider identifier ("ollama")
/// * `endpoint` - Optional custom endpoint URL
/// * `connect_timeout` - Optional bound on connection establishment
///
/// # Errors
/// Returns `AppError::Config` if the provider is unknown or the client
/// cannot be built. Both are startup failures.
pub fn create_client(
    provider: &str,
    endpoint: Option<&str>,
    connect_timeout: Option<Duration>,
) -> AppResult<Arc<dyn LlmClient>> {
    match provider.to_lowercase().as_str() {
        "ollama" => {
            let base_url = endpoint.unwrap_or(DEFAULT_OLLAMA_URL);
            let client = match connect_timeout {
                Some(timeout) => OllamaClient::with_connect_timeout(base_url, timeout)?,
                None => OllamaClient::with_base_url(base_url),
            };
            tracing::debug!(base_url, "Created Ollama client");
            Ok(Arc::new(client))
        }
        _ => Err(AppError::Config(format!("Unknown provider: {}", provider))),
    }
}
