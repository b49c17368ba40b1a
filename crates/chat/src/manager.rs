//! Session registry driven by transport hooks.

use crate::resources::{Pipeline, SharedResources};
use crate::session::{SessionHandle, SessionState};
use crate::transport::{SessionId, Transport};
use medbot_core::{AppError, AppResult};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{watch, RwLock};

/// Tracks live sessions and routes transport events to them.
///
/// Sessions are independent: a failure while answering in one never
/// touches another.
pub struct SessionManager {
    resources: Arc<SharedResources>,
    transport: Arc<dyn Transport>,
    sessions: RwLock<HashMap<SessionId, SessionHandle>>,
}

impl SessionManager {
    pub fn new(resources: Arc<SharedResources>, transport: Arc<dyn Transport>) -> Self {
        Self {
            resources,
            transport,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// A new conversation began. Binds a pipeline handle and sends the greeting.
    ///
    /// # Errors
    /// `AppError::Session` if `id` is already active.
    pub async fn on_session_start(&self, id: SessionId) -> AppResult<()> {
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&id) {
            return Err(AppError::Session(format!("Session {} is already active", id)));
        }

        let pipeline = Pipeline::new(Arc::clone(&self.resources));
        let handle = SessionHandle::spawn(id.clone(), pipeline, Arc::clone(&self.transport));
        sessions.insert(id, handle);
        Ok(())
    }

    /// A user message arrived. Returns once it is queued; the answer is
    /// delivered through the transport.
    ///
    /// # Errors
    /// `AppError::Session` if the session is unknown or closed.
    pub async fn on_message(&self, id: &SessionId, text: impl Into<String>) -> AppResult<()> {
        let sessions = self.sessions.read().await;
        let handle = sessions
            .get(id)
            .ok_or_else(|| AppError::Session(format!("Unknown session: {}", id)))?;
        handle.enqueue(text.into())
    }

    /// The conversation ended. Cancels any in-flight answer and discards
    /// queued messages.
    ///
    /// # Errors
    /// `AppError::Session` if the session is unknown.
    pub async fn on_session_end(&self, id: &SessionId) -> AppResult<()> {
        let handle = self
            .sessions
            .write()
            .await
            .remove(id)
            .ok_or_else(|| AppError::Session(format!("Unknown session: {}", id)))?;
        handle.close().await;
        Ok(())
    }

    pub async fn state(&self, id: &SessionId) -> Option<SessionState> {
        self.sessions.read().await.get(id).map(SessionHandle::state)
    }

    /// Follow state changes of a session.
    pub async fn watch_state(&self, id: &SessionId) -> Option<watch::Receiver<SessionState>> {
        self.sessions.read().await.get(id).map(SessionHandle::subscribe)
    }

    pub async fn active_sessions(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// End every session.
    pub async fn shutdown(&self) {
        let sessions: Vec<_> = self.sessions.write().await.drain().map(|(_, h)| h).collect();
        tracing::info!(count = sessions.len(), "Shutting down sessions");
        for handle in sessions {
            handle.close().await;
        }
    }
}
