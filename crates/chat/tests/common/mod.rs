//! Deterministic fakes for session tests.

#![allow(dead_code)]

use medbot_chat::{ChannelTransport, Envelope, OutboundEvent, SessionManager, SharedResources};
use medbot_core::{AppError, AppResult, PipelineConfig, SimilarityMetric};
use medbot_knowledge::embeddings::providers::HashingProvider;
use medbot_knowledge::{Chunk, EmbeddingProvider, GenerationParams, IndexMeta, MemoryIndex};
use medbot_llm::{LlmClient, LlmRequest, LlmResponse, LlmStream, LlmStreamChunk, LlmUsage};
use medbot_prompt::PromptAssembler;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

pub const DIMS: usize = 128;

pub const ANEMIA_CHUNKS: [(&str, &str); 3] = [
    ("anemia-1", "Iron deficiency is the most common cause of anemia worldwide."),
    ("anemia-2", "Vitamin B12 deficiency leads to macrocytic anemia and fatigue."),
    ("anemia-3", "Chronic kidney disease reduces erythropoietin and can cause anemia."),
];

/// How the fake model picks its reply.
#[derive(Debug, Clone)]
pub enum Reply {
    /// Always the same text.
    Fixed(String),
    /// `FINAL ANSWER: answer to <question>`, read back from the prompt.
    EchoQuestion,
}

/// Language model double that records prompts and answers from a script.
pub struct FakeLlm {
    reply: Reply,
    first_call_delay: Duration,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl FakeLlm {
    pub fn new(reply: Reply) -> Self {
        Self {
            reply,
            first_call_delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn fixed(text: &str) -> Self {
        Self::new(Reply::Fixed(text.to_string()))
    }

    /// Make the first call slower than the rest.
    pub fn with_first_call_delay(mut self, delay: Duration) -> Self {
        self.first_call_delay = delay;
        self
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn reply_for(&self, prompt: &str) -> String {
        match &self.reply {
            Reply::Fixed(text) => text.clone(),
            Reply::EchoQuestion => {
                let question = prompt
                    .lines()
                    .find_map(|line| line.strip_prefix("Question: "))
                    .unwrap_or_default();
                format!("FINAL ANSWER: answer to {}", question)
            }
        }
    }

    async fn begin(&self, prompt: &str) -> String {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());

        if call == 0 && !self.first_call_delay.is_zero() {
            tokio::time::sleep(self.first_call_delay).await;
        }
        self.reply_for(prompt)
    }

    fn end(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl LlmClient for FakeLlm {
    fn provider_name(&self) -> &str {
        "fake"
    }

    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
        let content = self.begin(&request.prompt).await;
        self.end();
        Ok(LlmResponse {
            content,
            model: request.model.clone(),
            usage: LlmUsage::new(10, 5),
            done: true,
        })
    }

    async fn stream(&self, request: &LlmRequest) -> AppResult<LlmStream> {
        let content = self.begin(&request.prompt).await;
        self.end();

        let mut chunks: Vec<AppResult<LlmStreamChunk>> = content
            .split_inclusive(' ')
            .map(|piece| Ok(LlmStreamChunk::text(piece, &request.model)))
            .collect();
        chunks.push(Ok(LlmStreamChunk::finished(&request.model, LlmUsage::new(10, 5))));
        Ok(Box::pin(futures::stream::iter(chunks)))
    }
}

/// Embedding service that is always down.
#[derive(Debug)]
pub struct FailingEmbedder;

#[async_trait::async_trait]
impl EmbeddingProvider for FailingEmbedder {
    fn provider_name(&self) -> &str {
        "failing"
    }

    fn model_name(&self) -> &str {
        "failing"
    }

    fn dimensions(&self) -> usize {
        DIMS
    }

    async fn embed_batch(&self, _texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        Err(AppError::Embedding("connection refused".to_string()))
    }
}

pub async fn index_of(chunks: &[(&str, &str)]) -> MemoryIndex {
    let embedder = HashingProvider::new(DIMS);
    let mut index = MemoryIndex::new(IndexMeta {
        dimensions: DIMS,
        metric: SimilarityMetric::Cosine,
        embedding_model: Some(embedder.model_name().to_string()),
    });

    for (id, text) in chunks {
        let vector = embedder.embed(text).await.unwrap();
        index
            .insert(Chunk::new(*id, *text, "hematology.pdf"), vector)
            .unwrap();
    }
    index
}

pub fn settings(streaming: bool) -> PipelineConfig {
    PipelineConfig {
        streaming,
        ..PipelineConfig::default()
    }
}

pub fn resources(
    embedder: Arc<dyn EmbeddingProvider>,
    index: MemoryIndex,
    llm: Arc<FakeLlm>,
    settings: PipelineConfig,
) -> Arc<SharedResources> {
    SharedResources::from_parts(
        embedder,
        Arc::new(index),
        llm,
        PromptAssembler::new(settings.max_context_chars).unwrap(),
        GenerationParams::from_config("fake-model", &settings),
        settings,
    )
    .unwrap()
}

pub fn hashing() -> Arc<dyn EmbeddingProvider> {
    Arc::new(HashingProvider::new(DIMS))
}

pub fn manager(resources: Arc<SharedResources>) -> (SessionManager, mpsc::UnboundedReceiver<Envelope>) {
    let (transport, rx) = ChannelTransport::new();
    (SessionManager::new(resources, Arc::new(transport)), rx)
}

/// Receive events until `finals` answers or errors have arrived.
pub async fn collect_until_final(
    rx: &mut mpsc::UnboundedReceiver<Envelope>,
    finals: usize,
) -> Vec<OutboundEvent> {
    let mut events = Vec::new();
    let mut seen = 0;

    while seen < finals {
        let envelope = tokio::time::timeout(Duration::from_secs(10), rx.recv())
            .await
            .expect("timed out waiting for session events")
            .expect("transport closed");
        if envelope.event.is_final() {
            seen += 1;
        }
        events.push(envelope.event);
    }
    events
}
