//! Answer synthesis: run the language model over an assembled prompt.

use crate::rag::filter::{text_after_marker, AnswerPrefixFilter};
use crate::rag::types::{AnswerEvent, AnswerResult, AnswerStream, NO_RESULT};
use crate::types::Chunk;
use futures::StreamExt;
use medbot_core::PipelineConfig;
use medbot_llm::{LlmClient, LlmRequest, LlmStream};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout_at, Instant};

/// Generation parameters, fixed when the pipeline is configured.
#[derive(Debug, Clone)]
pub struct GenerationParams {
    pub model: String,
    pub max_new_tokens: u32,
    pub temperature: f32,
    /// Bound on one whole model call, streaming included
    pub request_timeout: Duration,
    /// Marker preceding the final answer; empty disables filtering
    pub answer_prefix_tokens: Vec<String>,
    /// How long to hold streamed text back waiting for the marker
    pub stream_fallback: Duration,
}

impl GenerationParams {
    pub fn from_config(model: impl Into<String>, config: &PipelineConfig) -> Self {
        Self {
            model: model.into(),
            max_new_tokens: config.max_new_tokens,
            temperature: config.temperature,
            request_timeout: Duration::from_secs(config.request_timeout_secs),
            answer_prefix_tokens: config.answer_prefix_tokens.clone(),
            stream_fallback: Duration::from_millis(config.stream_fallback_ms),
        }
    }
}

/// What the model produced, in order of preference for the answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelOutput {
    /// Text following the final-answer marker
    Result(String),
    /// The whole generated text
    OutputText(String),
    /// Nothing usable
    Empty,
}

impl ModelOutput {
    pub fn interpret(text: &str, answer_prefix_tokens: &[String]) -> Self {
        if let Some(rest) = text_after_marker(text, answer_prefix_tokens) {
            let rest = rest.trim();
            if !rest.is_empty() {
                return Self::Result(rest.to_string());
            }
        }

        let text = text.trim();
        if text.is_empty() {
            Self::Empty
        } else {
            Self::OutputText(text.to_string())
        }
    }

    pub fn into_answer(self) -> String {
        match self {
            Self::Result(text) | Self::OutputText(text) => text,
            Self::Empty => NO_RESULT.to_string(),
        }
    }
}

/// Turns prompts into answers using a shared language model client.
#[derive(Clone)]
pub struct Synthesizer {
    client: Arc<dyn LlmClient>,
    params: GenerationParams,
}

impl Synthesizer {
    pub fn new(client: Arc<dyn LlmClient>, params: GenerationParams) -> Self {
        Self { client, params }
    }

    pub fn params(&self) -> &GenerationParams {
        &self.params
    }

    fn request(&self, prompt: &str) -> LlmRequest {
        LlmRequest::new(prompt, &self.params.model)
            .with_max_tokens(self.params.max_new_tokens)
            .with_temperature(self.params.temperature)
    }

    /// Generate a complete answer in one call.
    ///
    /// Model errors and timeouts become a `Failed` result, never a panic or
    /// an `Err`.
    pub async fn synthesize(&self, prompt: &str, sources: Vec<Arc<Chunk>>) -> AnswerResult {
        let request = self.request(prompt);
        tracing::debug!(model = %request.model, prompt_len = prompt.len(), "Synthesizing answer");

        let response = match tokio::time::timeout(
            self.params.request_timeout,
            self.client.complete(&request),
        )
        .await
        {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Language model call failed");
                return AnswerResult::failed(e.to_string(), sources);
            }
            Err(_) => {
                tracing::warn!("Language model call timed out");
                return AnswerResult::failed(timeout_message(self.params.request_timeout), sources);
            }
        };

        let answer = ModelOutput::interpret(&response.content, &self.params.answer_prefix_tokens)
            .into_answer();

        tracing::info!(
            completion_tokens = response.usage.completion_tokens,
            done = response.done,
            "Answer synthesized"
        );

        if response.done {
            AnswerResult::complete(answer, sources)
        } else {
            AnswerResult::partial(
                answer,
                sources,
                Some("model stopped before finishing".to_string()),
            )
        }
    }

    /// Generate an answer as a stream of deltas followed by the final result.
    ///
    /// The stream is lazy: the model is not called until it is first polled.
    /// Dropping it abandons the model call.
    pub fn synthesize_stream(&self, prompt: &str, sources: Vec<Arc<Chunk>>) -> AnswerStream {
        let state = StreamState {
            client: Arc::clone(&self.client),
            request: self.request(prompt).with_streaming(),
            phase: Phase::Connecting,
            filter: AnswerPrefixFilter::new(&self.params.answer_prefix_tokens),
            pending: VecDeque::new(),
            sources,
            timeout: self.params.request_timeout,
            fallback: self.params.stream_fallback,
            deadline: Instant::now(),
            fallback_at: None,
        };

        Box::pin(futures::stream::unfold(state, next_event))
    }
}

fn timeout_message(timeout: Duration) -> String {
    format!("language model did not answer within {}s", timeout.as_secs_f32())
}

enum Phase {
    Connecting,
    Streaming(LlmStream),
    Done,
}

struct StreamState {
    client: Arc<dyn LlmClient>,
    request: LlmRequest,
    phase: Phase,
    filter: AnswerPrefixFilter,
    pending: VecDeque<AnswerEvent>,
    sources: Vec<Arc<Chunk>>,
    timeout: Duration,
    fallback: Duration,
    deadline: Instant,
    fallback_at: Option<Instant>,
}

impl StreamState {
    fn push_delta(&mut self, text: Option<String>) {
        if let Some(text) = text {
            self.pending.push_back(AnswerEvent::Delta(text));
        }
    }

    fn fail(&mut self, diagnostic: String) {
        tracing::warn!(error = %diagnostic, "Answer stream failed");
        let sources = std::mem::take(&mut self.sources);
        self.pending
            .push_back(AnswerEvent::Finished(AnswerResult::failed(diagnostic, sources)));
    }

    fn finish(&mut self, model_done: bool) {
        let trailing = self.filter.finish();
        self.push_delta(trailing);

        let sources = std::mem::take(&mut self.sources);
        let result = if self.filter.is_active() && !self.filter.marker_seen() {
            // Released or not, the marker never arrived
            let text = if self.filter.is_holding() {
                self.filter.held()
            } else {
                self.filter.surfaced()
            };
            AnswerResult::partial(
                text,
                sources,
                Some("answer marker not observed before the stream ended".to_string()),
            )
        } else if !model_done {
            AnswerResult::partial(
                self.filter.surfaced(),
                sources,
                Some("model stream ended before completion".to_string()),
            )
        } else {
            AnswerResult::complete(self.filter.surfaced(), sources)
        };

        tracing::info!(
            completion = ?result.completion,
            marker_seen = self.filter.marker_seen(),
            released = self.filter.released(),
            "Answer stream finished"
        );
        self.pending.push_back(AnswerEvent::Finished(result));
    }
}

async fn next_event(mut state: StreamState) -> Option<(AnswerEvent, StreamState)> {
    loop {
        if let Some(event) = state.pending.pop_front() {
            return Some((event, state));
        }

        match std::mem::replace(&mut state.phase, Phase::Done) {
            Phase::Done => return None,

            Phase::Connecting => {
                let now = Instant::now();
                state.deadline = now + state.timeout;
                state.fallback_at = state.filter.is_holding().then(|| now + state.fallback);

                match timeout_at(state.deadline, state.client.stream(&state.request)).await {
                    Ok(Ok(stream)) => state.phase = Phase::Streaming(stream),
                    Ok(Err(e)) => state.fail(e.to_string()),
                    Err(_) => state.fail(timeout_message(state.timeout)),
                }
            }

            Phase::Streaming(mut stream) => {
                let fallback_due = matches!(state.fallback_at, Some(at) if at < state.deadline);
                let wake = match state.fallback_at {
                    Some(at) if fallback_due => at,
                    _ => state.deadline,
                };

                match timeout_at(wake, stream.next()).await {
                    Ok(Some(Ok(chunk))) => {
                        let surfaced = state.filter.push(&chunk.content);
                        state.push_delta(surfaced);
                        if !state.filter.is_holding() {
                            state.fallback_at = None;
                        }

                        if chunk.done {
                            state.finish(true);
                        } else {
                            state.phase = Phase::Streaming(stream);
                        }
                    }
                    Ok(Some(Err(e))) => state.fail(e.to_string()),
                    Ok(None) => state.finish(false),
                    Err(_) if fallback_due => {
                        tracing::debug!("No answer marker yet; releasing held text");
                        state.fallback_at = None;
                        let released = state.filter.release();
                        state.push_delta(released);
                        state.phase = Phase::Streaming(stream);
                    }
                    Err(_) => state.fail(timeout_message(state.timeout)),
                }
            }
        }
    }
}
