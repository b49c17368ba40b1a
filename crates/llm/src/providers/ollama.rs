//! Ollama LLM provider implementation.
//!
//! Ollama API: https://github.com/ollama/ollama/blob/main/docs/api.md

use crate::client::{LlmClient, LlmRequest, LlmResponse, LlmStream, LlmStreamChunk, LlmUsage};
use futures::StreamExt;
use medbot_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// Ollama `/api/generate` request body.
#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    prompt: String,
    stream: bool,
    #[serde(skip_serializing_if = "OllamaOptions::is_empty")]
    options: OllamaOptions,
}

/// Generation parameters, nested under `options` by the Ollama API.
#[derive(Debug, Default, Serialize)]
struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

impl OllamaOptions {
    fn is_empty(&self) -> bool {
        self.temperature.is_none() && self.num_predict.is_none()
    }
}

/// Ollama API response line.
#[derive(Debug, Deserialize)]
struct OllamaResponse {
    model: String,
    response: String,
    done: bool,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

impl OllamaResponse {
    fn usage(&self) -> LlmUsage {
        LlmUsage::new(
            self.prompt_eval_count.unwrap_or(0),
            self.eval_count.unwrap_or(0),
        )
    }
}

/// Ollama LLM client.
pub struct OllamaClient {
    /// Base URL for Ollama API
    base_url: String,

    /// HTTP client
    client: reqwest::Client,
}

impl OllamaClient {
    /// Create a new Ollama client against http://localhost:11434.
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    /// Create a new Ollama client with a custom base URL.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Create a client whose connection attempts give up after `timeout`.
    ///
    /// Only connecting is bounded here; whole-call deadlines belong to the caller
    /// so that long streams are not cut off.
    pub fn with_connect_timeout(base_url: impl Into<String>, timeout: Duration) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    /// Convert LlmRequest to Ollama format.
    fn to_ollama_request(&self, request: &LlmRequest, stream: bool) -> OllamaRequest {
        OllamaRequest {
            model: request.model.clone(),
            prompt: request.prompt.clone(),
            stream,
            options: OllamaOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens,
            },
        }
    }

    async fn post_generate(&self, body: &OllamaRequest) -> AppResult<reqwest::Response> {
        let url = format!("{}/api/generate", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| AppError::Llm(format!("Failed to send request to Ollama: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::Llm(format!(
                "Ollama API error ({}): {}",
                status, error_text
            )));
        }

        Ok(response)
    }
}

impl Default for OllamaClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Split complete newline-terminated JSON lines off the front of `pending`.
///
/// Network chunks do not respect line boundaries, so a partial trailing line
/// stays in the buffer until the rest of it arrives.
fn drain_lines(pending: &mut Vec<u8>) -> Vec<AppResult<LlmStreamChunk>> {
    let mut chunks = Vec::new();

    while let Some(pos) = pending.iter().position(|b| *b == b'\n') {
        let line: Vec<u8> = pending.drain(..=pos).collect();
        let line = String::from_utf8_lossy(&line);
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        chunks.push(parse_stream_line(line));
    }

    chunks
}

fn parse_stream_line(line: &str) -> AppResult<LlmStreamChunk> {
    let parsed: OllamaResponse = serde_json::from_str(line)
        .map_err(|e| AppError::Llm(format!("Failed to parse chunk: {}", e)))?;

    let usage = parsed.done.then(|| parsed.usage());

    Ok(LlmStreamChunk {
        content: parsed.response,
        model: parsed.model,
        done: parsed.done,
        usage,
    })
}

#[async_trait::async_trait]
impl LlmClient for OllamaClient {
    fn provider_name(&self) -> &str {
        "ollama"
    }

    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
        tracing::debug!(model = %request.model, "Sending completion request to Ollama");

        let body = self.to_ollama_request(request, false);
        let response = self.post_generate(&body).await?;

        // Non-streaming requests come back as a single JSON object
        let parsed: OllamaResponse = response
            .json()
            .await
            .map_err(|e| AppError::Llm(format!("Failed to parse Ollama response: {}", e)))?;

        tracing::debug!(
            prompt_tokens = parsed.prompt_eval_count.unwrap_or(0),
            completion_tokens = parsed.eval_count.unwrap_or(0),
            "Received completion from Ollama"
        );

        let usage = parsed.usage();
        Ok(LlmResponse {
            content: parsed.response,
            model: parsed.model,
            usage,
            done: parsed.done,
        })
    }

    async fn stream(&self, request: &LlmRequest) -> AppResult<LlmStream> {
        tracing::debug!(model = %request.model, "Starting streaming request to Ollama");

        let body = self.to_ollama_request(request, true);
        let response = self.post_generate(&body).await?;

        let stream = response
            .bytes_stream()
            .scan(Vec::<u8>::new(), |pending, result| {
                let items = match result {
                    Ok(bytes) => {
                        pending.extend_from_slice(&bytes);
                        drain_lines(pending)
                    }
                    Err(e) => vec![Err(AppError::Llm(format!("Stream error: {}", e)))],
                };
                futures::future::ready(Some(futures::stream::iter(items)))
            })
            .flatten();

        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ollama_client_creation() {
        let client = OllamaClient::new();
        assert_eq!(client.provider_name(), "ollama");
        assert_eq!(client.base_url, "http://localhost:11434");

        let custom = OllamaClient::with_base_url("http://gpu-box:11434/");
        assert_eq!(custom.base_url, "http://gpu-box:11434");
    }

    #[test]
    fn test_ollama_request_conversion() {
        let client = OllamaClient::new();
        let request = LlmRequest::new("Hello", "llama2")
            .with_temperature(0.5)
            .with_max_tokens(512);

        let body = client.to_ollama_request(&request, true);
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["model"], "llama2");
        assert_eq!(json["prompt"], "Hello");
        assert_eq!(json["stream"], true);
        assert_eq!(json["options"]["num_predict"], 512);
        assert_eq!(json["options"]["temperature"], 0.5);
    }

    #[test]
    fn test_request_without_options_omits_them() {
        let client = OllamaClient::new();
        let body = client.to_ollama_request(&LlmRequest::new("Hi", "llama2"), false);
        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("options").is_none());
    }

    #[test]
    fn test_drain_lines_keeps_partial_tail() {
        let mut pending = br#"{"model":"llama2","response":"Iron","done":false}
{"model":"llama2","respo"#
            .to_vec();

        let chunks = drain_lines(&mut pending);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].as_ref().unwrap().content, "Iron");

        pending.extend_from_slice(
            b"nse\":\"\",\"done\":true,\"prompt_eval_count\":10,\"eval_count\":4}\n",
        );
        let chunks = drain_lines(&mut pending);
        assert_eq!(chunks.len(), 1);
        let last = chunks[0].as_ref().unwrap();
        assert!(last.done);
        assert_eq!(last.usage, Some(LlmUsage::new(10, 4)));
        assert!(pending.is_empty());
    }

    #[test]
    fn test_drain_lines_reports_malformed_json() {
        let mut pending = b"not json\n".to_vec();
        let chunks = drain_lines(&mut pending);
        assert!(matches!(chunks[0], Err(AppError::Llm(_))));
    }
}
