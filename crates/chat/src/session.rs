//! One conversation: a worker task answering queued messages in order.
//!
//! ```text
//! Uninitialized -> Ready -> Processing -> Ready ... -> Closed
//! ```
//!
//! The worker owns the session's [`Pipeline`]. Messages arrive on an
//! unbounded queue and are handled one at a time, so a session never has
//! more than one model call in flight. Closing races the close signal
//! against the current message; the losing future is dropped, which
//! abandons any model call it was driving.

use crate::resources::Pipeline;
use crate::transport::{OutboundEvent, SessionId, Transport};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use medbot_core::{AppError, AppResult};
use medbot_knowledge::{AnswerEvent, AnswerResult};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::Instrument;

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Worker spawned, greeting not yet sent.
    Uninitialized,
    /// Waiting for a message.
    Ready,
    /// Answering a message.
    Processing,
    /// Ended; further messages are rejected.
    Closed,
}

/// Manager-side handle to a running session.
pub(crate) struct SessionHandle {
    id: SessionId,
    inbox: mpsc::UnboundedSender<String>,
    close: watch::Sender<bool>,
    state: watch::Receiver<SessionState>,
    worker: JoinHandle<()>,
    started_at: DateTime<Utc>,
}

impl SessionHandle {
    /// Spawn the worker for `id`. The greeting is its first outbound event.
    pub(crate) fn spawn(id: SessionId, pipeline: Pipeline, transport: Arc<dyn Transport>) -> Self {
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        let (close_tx, close_rx) = watch::channel(false);
        let (state_tx, state_rx) = watch::channel(SessionState::Uninitialized);

        let worker = SessionWorker {
            id: id.clone(),
            pipeline,
            transport,
            inbox: inbox_rx,
            state: state_tx,
        };

        let span = tracing::info_span!("session", id = %id);
        let worker = tokio::spawn(worker.run(close_rx).instrument(span));

        Self {
            id,
            inbox: inbox_tx,
            close: close_tx,
            state: state_rx,
            worker,
            started_at: Utc::now(),
        }
    }

    /// Queue a message for the worker.
    pub(crate) fn enqueue(&self, text: String) -> AppResult<()> {
        self.inbox
            .send(text)
            .map_err(|_| AppError::Session(format!("Session {} is closed", self.id)))
    }

    pub(crate) fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    /// Signal the worker to stop and wait for it to finish.
    pub(crate) async fn close(self) {
        self.close.send_replace(true);

        if let Err(e) = self.worker.await {
            tracing::warn!(session = %self.id, "Session worker ended abnormally: {}", e);
        }

        let lasted = Utc::now().signed_duration_since(self.started_at);
        tracing::info!(
            session = %self.id,
            duration_secs = lasted.num_seconds(),
            "Session ended"
        );
    }
}

struct SessionWorker {
    id: SessionId,
    pipeline: Pipeline,
    transport: Arc<dyn Transport>,
    inbox: mpsc::UnboundedReceiver<String>,
    state: watch::Sender<SessionState>,
}

impl SessionWorker {
    async fn run(mut self, mut close: watch::Receiver<bool>) {
        let greeting = self.pipeline.settings().greeting.clone();
        self.deliver(OutboundEvent::Greeting { text: greeting }).await;
        self.state.send_replace(SessionState::Ready);
        tracing::info!("Session started");

        loop {
            let text = tokio::select! {
                biased;
                _ = close.changed() => break,
                message = self.inbox.recv() => match message {
                    Some(text) => text,
                    None => break,
                },
            };

            self.state.send_replace(SessionState::Processing);

            let finished = tokio::select! {
                biased;
                _ = close.changed() => false,
                _ = self.handle(&text) => true,
            };

            if !finished {
                tracing::debug!("In-flight message abandoned");
                break;
            }
            self.state.send_replace(SessionState::Ready);
        }

        self.inbox.close();
        let mut discarded = 0usize;
        while self.inbox.try_recv().is_ok() {
            discarded += 1;
        }

        self.state.send_replace(SessionState::Closed);
        tracing::debug!(discarded, "Session worker stopped");
    }

    async fn handle(&self, text: &str) {
        tracing::info!(chars = text.chars().count(), "Handling message");

        if self.pipeline.settings().streaming {
            let mut stream = match self.pipeline.answer_stream(text).await {
                Ok(stream) => stream,
                Err(e) => return self.fail(e).await,
            };

            while let Some(event) = stream.next().await {
                match event {
                    AnswerEvent::Delta(text) => self.deliver(OutboundEvent::Delta { text }).await,
                    AnswerEvent::Finished(result) => self.finish(&result).await,
                }
            }
        } else {
            match self.pipeline.answer(text).await {
                Ok(result) => self.finish(&result).await,
                Err(e) => self.fail(e).await,
            }
        }
    }

    async fn finish(&self, result: &AnswerResult) {
        match &result.diagnostic {
            Some(diagnostic) if result.is_failed() => {
                tracing::warn!(%diagnostic, "Answer generation failed")
            }
            _ => tracing::info!(
                completion = ?result.completion,
                sources = result.sources.len(),
                "Answered"
            ),
        }
        self.deliver(OutboundEvent::from_result(result)).await;
    }

    async fn fail(&self, error: AppError) {
        tracing::warn!(error = %error, "Could not answer message");
        self.deliver(OutboundEvent::error(&error)).await;
    }

    async fn deliver(&self, event: OutboundEvent) {
        if let Err(e) = self.transport.send(&self.id, event).await {
            tracing::warn!("Failed to deliver event: {}", e);
        }
    }
}
