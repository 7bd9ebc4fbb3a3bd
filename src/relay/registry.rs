use super::event::SessionEvent;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};

/// Address of a live session's event channel
#[derive(Clone)]
pub struct SessionHandle {
    pub id: String,
    events: mpsc::Sender<SessionEvent>,
}

impl SessionHandle {
    pub fn new(id: String, events: mpsc::Sender<SessionEvent>) -> Self {
        Self { id, events }
    }

    /// Returns `false` if the session has already terminated.
    pub async fn send(&self, event: SessionEvent) -> bool {
        self.events.send(event).await.is_ok()
    }

    /// Deliver the explicit call-terminated signal.
    pub async fn disconnect(&self) -> bool {
        self.send(SessionEvent::CallDisconnected).await
    }
}

/// Live sessions by id. Inserted when the caller transport connects,
/// removed after the session task finishes.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    inner: Arc<RwLock<HashMap<String, SessionHandle>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, handle: SessionHandle) {
        self.inner.write().await.insert(handle.id.clone(), handle);
    }

    pub async fn get(&self, session_id: &str) -> Option<SessionHandle> {
        self.inner.read().await.get(session_id).cloned()
    }

    pub async fn remove(&self, session_id: &str) -> Option<SessionHandle> {
        self.inner.write().await.remove(session_id)
    }

    pub async fn active_count(&self) -> usize {
        self.inner.read().await.len()
    }
}
