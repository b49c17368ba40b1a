//! Configuration management for medbot.
//!
//! Configuration is merged from several sources, later ones winning:
//! - Built-in defaults
//! - Config file (`.medbot/config.yaml` in the workspace)
//! - Environment variables
//! - Command-line flags
//!
//! The pipeline settings (index location, retrieval depth, context budget,
//! generation parameters) are fixed once at startup and never change per query.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{AppError, AppResult};

/// Provider names accepted for completions.
const KNOWN_LLM_PROVIDERS: [&str; 1] = ["ollama"];

/// Provider names accepted for embeddings.
const KNOWN_EMBEDDING_PROVIDERS: [&str; 2] = ["ollama", "hashing"];

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the workspace root (contains .medbot/)
    pub workspace: PathBuf,

    /// Optional config file path
    pub config_file: Option<PathBuf>,

    /// LLM provider for answer synthesis
    pub provider: String,

    /// Model identifier
    pub model: String,

    /// Log level override
    pub log_level: Option<String>,

    /// Verbose mode (enables debug logging)
    pub verbose: bool,

    /// Disable colored output
    pub no_color: bool,

    /// LLM provider configurations
    pub llm: Option<LlmConfig>,

    /// Retrieval and synthesis settings
    pub pipeline: PipelineConfig,
}

/// LLM configuration from config.yaml.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(rename = "activeProvider")]
    pub active_provider: String,

    pub providers: HashMap<String, ProviderConfig>,
}

/// Provider-specific configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProviderConfig {
    Ollama {
        endpoint: String,
        model: String,
        timeout: Option<u64>,
    },
}

/// Similarity metric used by the vector index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityMetric {
    Cosine,
    InnerProduct,
}

impl SimilarityMetric {
    /// Canonical name as stored in index metadata.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cosine => "cosine",
            Self::InnerProduct => "inner_product",
        }
    }

    /// Parse a metric name.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "cosine" => Some(Self::Cosine),
            "inner_product" | "ip" | "dot" => Some(Self::InnerProduct),
            _ => None,
        }
    }
}

/// Embedding service settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddingSettings {
    /// Provider name: "ollama" or "hashing"
    pub provider: String,

    /// Model identifier; must be the one the index was built with
    pub model: String,

    /// Embedding vector dimensions
    pub dimensions: usize,

    /// Similarity metric the index was built with
    #[serde(default = "default_metric")]
    pub metric: SimilarityMetric,

    /// Endpoint override for HTTP providers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

fn default_metric() -> SimilarityMetric {
    SimilarityMetric::Cosine
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            model: "all-minilm".to_string(),
            dimensions: 384,
            metric: default_metric(),
            endpoint: None,
        }
    }
}

/// Settings for one retrieval-augmented pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelineConfig {
    /// Vector index file, relative paths resolve against the workspace
    #[serde(rename = "indexPath", default = "default_index_path")]
    pub index_path: PathBuf,

    /// Number of chunks retrieved per question
    #[serde(rename = "topK", default = "default_top_k")]
    pub top_k: usize,

    /// Upper bound on the context block, in characters
    #[serde(rename = "maxContextChars", default = "default_max_context_chars")]
    pub max_context_chars: usize,

    /// Maximum tokens the model may generate
    #[serde(rename = "maxNewTokens", default = "default_max_new_tokens")]
    pub max_new_tokens: u32,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Tokens the model emits right before the real answer
    #[serde(rename = "answerPrefixTokens", default = "default_answer_prefix_tokens")]
    pub answer_prefix_tokens: Vec<String>,

    /// How long a stream may run without the answer marker before buffered
    /// text is released anyway
    #[serde(rename = "streamFallbackMs", default = "default_stream_fallback_ms")]
    pub stream_fallback_ms: u64,

    /// Timeout for a single model call
    #[serde(rename = "requestTimeoutSecs", default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Deliver answers incrementally
    #[serde(default = "default_streaming")]
    pub streaming: bool,

    /// Message sent when a session starts
    #[serde(default = "default_greeting")]
    pub greeting: String,

    /// Optional prompt definition id under `.medbot/prompts/`
    #[serde(rename = "promptId", default, skip_serializing_if = "Option::is_none")]
    pub prompt_id: Option<String>,

    /// Embedding service settings
    #[serde(default)]
    pub embedding: EmbeddingSettings,
}

fn default_index_path() -> PathBuf {
    PathBuf::from("vectorstore/db.sqlite")
}

fn default_top_k() -> usize {
    3
}

fn default_max_context_chars() -> usize {
    6000
}

fn default_max_new_tokens() -> u32 {
    512
}

fn default_temperature() -> f32 {
    0.5
}

fn default_answer_prefix_tokens() -> Vec<String> {
    vec!["FINAL".to_string(), "ANSWER".to_string()]
}

fn default_stream_fallback_ms() -> u64 {
    2000
}

fn default_request_timeout_secs() -> u64 {
    120
}

fn default_streaming() -> bool {
    true
}

fn default_greeting() -> String {
    "Hi, Welcome to Medical Bot. What is your query?".to_string()
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            index_path: default_index_path(),
            top_k: default_top_k(),
            max_context_chars: default_max_context_chars(),
            max_new_tokens: default_max_new_tokens(),
            temperature: default_temperature(),
            answer_prefix_tokens: default_answer_prefix_tokens(),
            stream_fallback_ms: default_stream_fallback_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            streaming: default_streaming(),
            greeting: default_greeting(),
            prompt_id: None,
            embedding: EmbeddingSettings::default(),
        }
    }
}

impl PipelineConfig {
    /// Validate value ranges.
    pub fn validate(&self) -> AppResult<()> {
        if self.top_k == 0 {
            return Err(AppError::Config("topK must be at least 1".to_string()));
        }

        if self.max_context_chars == 0 {
            return Err(AppError::Config(
                "maxContextChars must be greater than 0".to_string(),
            ));
        }

        if self.max_new_tokens == 0 {
            return Err(AppError::Config(
                "maxNewTokens must be greater than 0".to_string(),
            ));
        }

        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(AppError::Config(format!(
                "temperature must be within [0, 2], got {}",
                self.temperature
            )));
        }

        if self.embedding.dimensions == 0 {
            return Err(AppError::Config(
                "embedding.dimensions must be greater than 0".to_string(),
            ));
        }

        if !KNOWN_EMBEDDING_PROVIDERS.contains(&self.embedding.provider.as_str()) {
            return Err(AppError::Config(format!(
                "Unknown embedding provider: {}. Supported: {}",
                self.embedding.provider,
                KNOWN_EMBEDDING_PROVIDERS.join(", ")
            )));
        }

        Ok(())
    }
}

/// Full configuration file structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ConfigFile {
    llm: Option<LlmConfig>,
    pipeline: Option<PipelineConfig>,
    workspace: Option<WorkspaceConfig>,
    logging: Option<LoggingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WorkspaceConfig {
    path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LoggingConfig {
    level: Option<String>,
    color: Option<bool>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            workspace: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            config_file: None,
            provider: "ollama".to_string(),
            model: "llama2".to_string(),
            log_level: None,
            verbose: false,
            no_color: false,
            llm: None,
            pipeline: PipelineConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, the YAML file and environment variables.
    ///
    /// Environment variables:
    /// - `MEDBOT_WORKSPACE`: Override workspace path
    /// - `MEDBOT_CONFIG`: Path to config file
    /// - `MEDBOT_PROVIDER`: LLM provider
    /// - `MEDBOT_MODEL`: Model identifier
    /// - `MEDBOT_INDEX`: Vector index file
    /// - `RUST_LOG`: Log level
    /// - `NO_COLOR`: Disable colored output
    ///
    /// # Example
    /// ```no_run
    /// use medbot_core::config::AppConfig;
    ///
    /// let config = AppConfig::load().expect("Failed to load config");
    /// println!("Index: {:?}", config.index_path());
    /// ```
    pub fn load() -> AppResult<Self> {
        let mut config = Self::default();

        if let Ok(workspace) = std::env::var("MEDBOT_WORKSPACE") {
            config.workspace = PathBuf::from(workspace);
        }

        if let Ok(config_file) = std::env::var("MEDBOT_CONFIG") {
            config.config_file = Some(PathBuf::from(config_file));
        }

        if !config.workspace.exists() {
            return Err(AppError::Config(format!(
                "Workspace directory does not exist: {:?}",
                config.workspace
            )));
        }

        let config_path = config
            .config_file
            .clone()
            .unwrap_or_else(|| config.medbot_dir().join("config.yaml"));

        if config_path.exists() {
            config = config.merge_yaml(&config_path)?;
        }

        // Environment variables override YAML config
        if let Ok(provider) = std::env::var("MEDBOT_PROVIDER") {
            config.provider = provider;
        }

        if let Ok(model) = std::env::var("MEDBOT_MODEL") {
            config.model = model;
        }

        if let Ok(index) = std::env::var("MEDBOT_INDEX") {
            config.pipeline.index_path = PathBuf::from(index);
        }

        if let Ok(level) = std::env::var("RUST_LOG") {
            config.log_level = Some(level);
        }

        if std::env::var("NO_COLOR").is_ok() {
            config.no_color = true;
        }

        Ok(config)
    }

    /// Merge a YAML configuration file into this config.
    fn merge_yaml(&self, path: &Path) -> AppResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        self.merge_yaml_str(&contents)
            .map_err(|e| AppError::Config(format!("Failed to parse config file {:?}: {}", path, e)))
    }

    fn merge_yaml_str(&self, contents: &str) -> Result<Self, serde_yaml::Error> {
        let config_file: ConfigFile = serde_yaml::from_str(contents)?;

        let mut result = self.clone();

        if let Some(ws) = config_file.workspace {
            if let Some(path) = ws.path {
                result.workspace = PathBuf::from(path);
            }
        }

        if let Some(logging) = config_file.logging {
            if let Some(level) = logging.level {
                result.log_level = Some(level);
            }
            if let Some(color) = logging.color {
                result.no_color = !color;
            }
        }

        if let Some(pipeline) = config_file.pipeline {
            result.pipeline = pipeline;
        }

        if let Some(llm) = config_file.llm {
            result.provider = llm.active_provider.clone();

            if let Some(ProviderConfig::Ollama { model, .. }) =
                llm.providers.get(&llm.active_provider)
            {
                result.model = model.clone();
            }

            result.llm = Some(llm);
        }

        Ok(result)
    }

    /// Apply CLI overrides to the configuration.
    ///
    /// Command-line flags take precedence over environment variables.
    #[allow(clippy::too_many_arguments)]
    pub fn with_overrides(
        mut self,
        workspace: Option<PathBuf>,
        config_file: Option<PathBuf>,
        provider: Option<String>,
        model: Option<String>,
        index_path: Option<PathBuf>,
        log_level: Option<String>,
        verbose: bool,
        no_color: bool,
    ) -> Self {
        if let Some(workspace) = workspace {
            self.workspace = workspace;
        }

        if let Some(config_file) = config_file {
            self.config_file = Some(config_file);
        }

        if let Some(provider) = provider {
            self.provider = provider;
        }

        if let Some(model) = model {
            self.model = model;
        }

        if let Some(index_path) = index_path {
            self.pipeline.index_path = index_path;
        }

        if let Some(log_level) = log_level {
            self.log_level = Some(log_level);
        }

        if verbose {
            self.verbose = true;
            if self.log_level.is_none() {
                self.log_level = Some("debug".to_string());
            }
        }

        if no_color {
            self.no_color = true;
        }

        self
    }

    /// Get the path to the .medbot directory.
    pub fn medbot_dir(&self) -> PathBuf {
        self.workspace.join(".medbot")
    }

    /// Absolute location of the vector index file.
    pub fn index_path(&self) -> PathBuf {
        if self.pipeline.index_path.is_absolute() {
            self.pipeline.index_path.clone()
        } else {
            self.workspace.join(&self.pipeline.index_path)
        }
    }

    /// Get the configuration for a provider, if the YAML file declared one.
    pub fn get_provider_config(&self, provider: &str) -> Option<&ProviderConfig> {
        self.llm.as_ref().and_then(|llm| llm.providers.get(provider))
    }

    /// Endpoint for the active LLM provider, if configured.
    pub fn llm_endpoint(&self) -> Option<&str> {
        match self.get_provider_config(&self.provider) {
            Some(ProviderConfig::Ollama { endpoint, .. }) => Some(endpoint.as_str()),
            None => None,
        }
    }

    /// Validate configuration for the active provider and pipeline.
    pub fn validate(&self) -> AppResult<()> {
        if !KNOWN_LLM_PROVIDERS.contains(&self.provider.as_str()) {
            return Err(AppError::Config(format!(
                "Unknown provider: {}. Supported: {}",
                self.provider,
                KNOWN_LLM_PROVIDERS.join(", ")
            )));
        }

        if self.model.trim().is_empty() {
            return Err(AppError::Config("No model configured".to_string()));
        }

        self.pipeline.validate()
    }
}
