//! Process-wide resources and the per-session pipeline handle.
//!
//! `SharedResources` is built once before any session is accepted and is
//! read-only afterwards. Every session gets a [`Pipeline`], which only
//! clones the `Arc`.

use medbot_core::{AppConfig, AppResult, PipelineConfig};
use medbot_knowledge::{
    create_provider, AnswerResult, AnswerStream, Chunk, EmbeddingProvider, GenerationParams,
    RetrievalResult, Retriever, SqliteIndex, Synthesizer, VectorIndex,
};
use medbot_llm::{create_client, LlmClient};
use medbot_prompt::{BuiltPrompt, PromptAssembler};
use std::sync::Arc;
use std::time::Duration;

/// Bound on establishing a connection to the model host.
const LLM_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Embedder, index, model client and prompt assembler shared by all sessions.
pub struct SharedResources {
    retriever: Retriever,
    assembler: PromptAssembler,
    synthesizer: Synthesizer,
    settings: PipelineConfig,
}

impl std::fmt::Debug for SharedResources {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedResources")
            .field("embedder", &self.retriever.embedder().model_name())
            .field("dimensions", &self.retriever.index().meta().dimensions)
            .field("model", &self.synthesizer.params().model)
            .field("prompt_id", &self.assembler.prompt_id())
            .finish()
    }
}

impl SharedResources {
    /// Load everything the pipeline needs from configuration.
    ///
    /// # Errors
    /// `AppError::Config` for anything that makes serving impossible: an
    /// unknown provider, a missing or mismatched index, an unreachable
    /// embedding host, an invalid prompt override.
    pub async fn load(config: &AppConfig) -> AppResult<Arc<Self>> {
        config.validate()?;
        let settings = config.pipeline.clone();

        let embedder = create_provider(&settings.embedding).await?;

        let index_path = config.index_path();
        let index = SqliteIndex::open(&index_path, &settings.embedding)?;
        tracing::info!(path = %index_path.display(), "Opened vector index");

        let llm = create_client(&config.provider, config.llm_endpoint(), Some(LLM_CONNECT_TIMEOUT))?;

        let assembler = PromptAssembler::load(
            &config.workspace,
            settings.prompt_id.as_deref(),
            settings.max_context_chars,
        )?;

        let params = GenerationParams::from_config(config.model.clone(), &settings);

        let resources = Self::from_parts(embedder, Arc::new(index), llm, assembler, params, settings)?;
        tracing::info!(?resources, "Shared resources ready");
        Ok(resources)
    }

    /// Assemble resources from already-built parts.
    ///
    /// # Errors
    /// `AppError::Config` if the embedder and index disagree on dimensions.
    pub fn from_parts(
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
        llm: Arc<dyn LlmClient>,
        assembler: PromptAssembler,
        params: GenerationParams,
        settings: PipelineConfig,
    ) -> AppResult<Arc<Self>> {
        Ok(Arc::new(Self {
            retriever: Retriever::new(embedder, index)?,
            assembler,
            synthesizer: Synthesizer::new(llm, params),
            settings,
        }))
    }

    pub fn settings(&self) -> &PipelineConfig {
        &self.settings
    }
}

/// One session's view of the shared pipeline.
#[derive(Debug, Clone)]
pub struct Pipeline {
    resources: Arc<SharedResources>,
}

impl Pipeline {
    pub fn new(resources: Arc<SharedResources>) -> Self {
        Self { resources }
    }

    pub fn settings(&self) -> &PipelineConfig {
        &self.resources.settings
    }

    /// Retrieve the `k` chunks closest to `question`.
    pub async fn retrieve(&self, question: &str, k: usize) -> AppResult<RetrievalResult> {
        let result = self.resources.retriever.retrieve(question, k).await?;
        tracing::info!(hits = result.len(), top_score = ?result.top_score(), "Retrieved context");
        Ok(result)
    }

    /// Render the prompt for `question` over ranked `chunks`.
    pub fn assemble(&self, chunks: &[Arc<Chunk>], question: &str) -> AppResult<BuiltPrompt> {
        self.resources.assembler.assemble(chunks, question)
    }

    async fn prepare(&self, question: &str, k: usize) -> AppResult<BuiltPrompt> {
        let retrieved = self.retrieve(question, k).await?;
        self.assemble(&retrieved.chunks(), question)
    }

    /// Answer with the configured retrieval depth, in one piece.
    pub async fn answer(&self, question: &str) -> AppResult<AnswerResult> {
        self.answer_with_k(question, self.settings().top_k).await
    }

    /// Answer using `k` retrieved chunks.
    ///
    /// # Errors
    /// Retrieval and prompt failures are returned as `Err`. Model failures
    /// come back as a `Failed` result.
    pub async fn answer_with_k(&self, question: &str, k: usize) -> AppResult<AnswerResult> {
        let prompt = self.prepare(question, k).await?;
        Ok(self
            .resources
            .synthesizer
            .synthesize(&prompt.text, prompt.sources)
            .await)
    }

    /// Answer with the configured retrieval depth, streaming surfaced text.
    ///
    /// Retrieval happens before this returns; the model is only called once
    /// the stream is polled.
    pub async fn answer_stream(&self, question: &str) -> AppResult<AnswerStream> {
        let prompt = self.prepare(question, self.settings().top_k).await?;
        Ok(self
            .resources
            .synthesizer
            .synthesize_stream(&prompt.text, prompt.sources))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use medbot_core::{AppError, SimilarityMetric};
    use medbot_knowledge::embeddings::providers::HashingProvider;
    use medbot_knowledge::{Completion, IndexMeta, MemoryIndex};
    use medbot_llm::{LlmRequest, LlmResponse, LlmStream, LlmStreamChunk, LlmUsage};
    use std::sync::Mutex;

    #[derive(Default)]
    struct EchoClient {
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait::async_trait]
    impl LlmClient for EchoClient {
        fn provider_name(&self) -> &str {
            "echo"
        }

        async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
            self.prompts.lock().unwrap().push(request.prompt.clone());
            Ok(LlmResponse {
                content: "FINAL ANSWER: iron deficiency".to_string(),
                model: request.model.clone(),
                usage: LlmUsage::default(),
                done: true,
            })
        }

        async fn stream(&self, request: &LlmRequest) -> AppResult<LlmStream> {
            self.prompts.lock().unwrap().push(request.prompt.clone());
            let chunks = vec![
                Ok(LlmStreamChunk::text("FINAL ANSWER: iron", &request.model)),
                Ok(LlmStreamChunk::text(" deficiency", &request.model)),
                Ok(LlmStreamChunk::finished(&request.model, LlmUsage::new(1, 2))),
            ];
            Ok(Box::pin(futures::stream::iter(chunks)))
        }
    }

    async fn resources(dims: usize, client: Arc<EchoClient>) -> AppResult<Arc<SharedResources>> {
        let embedder = Arc::new(HashingProvider::new(64));
        let mut index = MemoryIndex::new(IndexMeta {
            dimensions: dims,
            metric: SimilarityMetric::Cosine,
            embedding_model: None,
        });
        if dims == 64 {
            let embed = HashingProvider::new(64);
            for (id, text) in [
                ("a1", "Iron deficiency is the most common cause of anemia."),
                ("b1", "Hypertension is persistently raised blood pressure."),
            ] {
                let vector = embed.embed(text).await?;
                index.insert(Chunk::new(id, text, "handbook.pdf"), vector)?;
            }
        }

        let settings = PipelineConfig::default();
        SharedResources::from_parts(
            embedder,
            Arc::new(index),
            client,
            PromptAssembler::new(settings.max_context_chars)?,
            GenerationParams::from_config("test-model", &settings),
            settings,
        )
    }

    #[tokio::test]
    async fn test_answer_uses_retrieved_context() {
        let client = Arc::new(EchoClient::default());
        let pipeline = Pipeline::new(resources(64, Arc::clone(&client)).await.unwrap());

        let result = pipeline.answer_with_k("What causes anemia?", 1).await.unwrap();
        assert_eq!(result.answer, "iron deficiency");
        assert_eq!(result.completion, Completion::Complete);
        assert_eq!(result.sources.len(), 1);
        assert_eq!(result.sources[0].id, "a1");

        let prompts = client.prompts.lock().unwrap();
        assert!(prompts[0].contains("Iron deficiency is the most common cause"));
        assert!(!prompts[0].contains("Hypertension"));
    }

    #[tokio::test]
    async fn test_stream_is_lazy_until_polled() {
        use futures::StreamExt;

        let client = Arc::new(EchoClient::default());
        let pipeline = Pipeline::new(resources(64, Arc::clone(&client)).await.unwrap());

        let stream = pipeline.answer_stream("What causes anemia?").await.unwrap();
        assert!(client.prompts.lock().unwrap().is_empty());

        let events: Vec<_> = stream.collect().await;
        assert_eq!(client.prompts.lock().unwrap().len(), 1);
        assert!(matches!(events.last(), Some(medbot_knowledge::AnswerEvent::Finished(_))));
    }

    #[tokio::test]
    async fn test_empty_question_is_rejected_before_model_call() {
        let client = Arc::new(EchoClient::default());
        let pipeline = Pipeline::new(resources(64, Arc::clone(&client)).await.unwrap());

        let result = pipeline.answer("   ").await;
        assert!(matches!(result, Err(AppError::InvalidInput(_))));
        assert!(client.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_dimension_mismatch_is_config_error() {
        let result = resources(32, Arc::new(EchoClient::default())).await;
        assert!(matches!(result, Err(AppError::Config(_))));
    }
}
