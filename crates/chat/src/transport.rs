//! Session identifiers, outbound events and the transport boundary.

use medbot_core::{AppError, AppResult};
use medbot_knowledge::{AnswerResult, Completion, SourceRef};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Prefix of every user-visible failure message.
pub const ERROR_PREFIX: &str = "Sorry, I couldn't answer that";

/// Opaque identifier for a conversation, assigned by the transport.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Fresh random identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for SessionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Event delivered to the user of a session.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundEvent {
    /// Sent once when the session starts.
    Greeting { text: String },

    /// A piece of answer text, in order.
    Delta { text: String },

    /// The final answer for one message.
    Answer {
        text: String,
        sources: Vec<SourceRef>,
        completion: Completion,
    },

    /// A message could not be answered; the session stays usable.
    Error { message: String },
}

impl OutboundEvent {
    /// Visible message for a per-query failure.
    pub fn error(reason: impl std::fmt::Display) -> Self {
        Self::Error {
            message: format!("{}: {}", ERROR_PREFIX, reason),
        }
    }

    /// `Answer` for a usable result, `Error` for a failed one.
    pub fn from_result(result: &AnswerResult) -> Self {
        if result.is_failed() {
            let reason = result.diagnostic.as_deref().unwrap_or("no answer was produced");
            return Self::error(reason);
        }

        Self::Answer {
            text: result.answer.clone(),
            sources: result.source_refs(),
            completion: result.completion,
        }
    }

    /// Whether this event ends the handling of one message.
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Answer { .. } | Self::Error { .. })
    }
}

/// Outbound event addressed to a session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Envelope {
    pub session_id: SessionId,
    pub event: OutboundEvent,
}

/// Delivers events to whatever is on the other end of a session.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, session_id: &SessionId, event: OutboundEvent) -> AppResult<()>;
}

/// Transport that forwards every event into an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    tx: mpsc::UnboundedSender<Envelope>,
}

impl ChannelTransport {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Envelope>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait::async_trait]
impl Transport for ChannelTransport {
    async fn send(&self, session_id: &SessionId, event: OutboundEvent) -> AppResult<()> {
        self.tx
            .send(Envelope {
                session_id: session_id.clone(),
                event,
            })
            .map_err(|_| AppError::Session(format!("Transport for session {} is closed", session_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use medbot_knowledge::Chunk;
    use std::sync::Arc;

    #[test]
    fn test_error_event_wording() {
        let event = OutboundEvent::error(AppError::Embedding("service down".to_string()));
        assert_eq!(
            event,
            OutboundEvent::Error {
                message: "Sorry, I couldn't answer that: Embedding error: service down".to_string()
            }
        );
        assert!(event.is_final());
    }

    #[test]
    fn test_failed_result_becomes_error() {
        let result = AnswerResult::failed("model timed out", Vec::new());
        match OutboundEvent::from_result(&result) {
            OutboundEvent::Error { message } => assert!(message.ends_with("model timed out")),
            other => panic!("expected error, got {:?}", other),
        }
    }

    #[test]
    fn test_answer_event_carries_sources() {
        let chunk = Arc::new(Chunk::new("c1", "Iron deficiency causes anemia.", "a.pdf").with_page(4));
        let result = AnswerResult::complete("Iron deficiency.", vec![chunk]);

        let event = OutboundEvent::from_result(&result);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "answer");
        assert_eq!(json["text"], "Iron deficiency.");
        assert_eq!(json["completion"], "complete");
        assert_eq!(json["sources"][0]["id"], "c1");
        assert_eq!(json["sources"][0]["page"], 4);
    }

    #[test]
    fn test_generated_session_ids_are_unique() {
        assert_ne!(SessionId::generate(), SessionId::generate());
        assert_eq!(SessionId::from("abc").to_string(), "abc");
    }

    #[tokio::test]
    async fn test_channel_transport_forwards_and_reports_closed() {
        let (transport, mut rx) = ChannelTransport::new();
        let id = SessionId::from("s1");

        transport
            .send(&id, OutboundEvent::Delta { text: "Iron".to_string() })
            .await
            .unwrap();
        let envelope = rx.recv().await.unwrap();
        assert_eq!(envelope.session_id, id);
        assert_eq!(envelope.event, OutboundEvent::Delta { text: "Iron".to_string() });

        drop(rx);
        let result = transport.send(&id, OutboundEvent::error("x")).await;
        assert!(matches!(result, Err(AppError::Session(_))));
    }
}
