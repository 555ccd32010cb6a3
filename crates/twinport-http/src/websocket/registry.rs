//! Session registry shared by all connections

use super::session::Session;
use super::types::{SessionId, SessionState, WebSocketError, WebSocketMessage};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Live sessions in the order they were opened.
///
/// One lock serializes every add, remove and snapshot, so all connection
/// tasks observe the same order of opens and closes.
pub struct SessionRegistry {
    sessions: RwLock<Vec<Arc<Session>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(Vec::new()),
        }
    }

    /// Register a session; returns `false` if its id is already present
    pub async fn add(&self, session: Arc<Session>) -> bool {
        let id = session.id();
        let mut sessions = self.sessions.write().await;
        if sessions.iter().any(|s| s.id() == id) {
            debug!("Session {} already registered", id);
            return false;
        }
        sessions.push(session);
        info!("Added session to registry: {} ({} open)", id, sessions.len());
        true
    }

    /// Unregister a session, returning it if it was present
    pub async fn remove(&self, id: SessionId) -> Option<Arc<Session>> {
        let mut sessions = self.sessions.write().await;
        let index = sessions.iter().position(|s| s.id() == id)?;
        let session = sessions.remove(index);
        info!("Removed session from registry: {} ({} open)", id, sessions.len());
        Some(session)
    }

    pub async fn get(&self, id: SessionId) -> Option<Arc<Session>> {
        let sessions = self.sessions.read().await;
        sessions.iter().find(|s| s.id() == id).cloned()
    }

    /// Point-in-time copy of the registered sessions, in open order
    pub async fn snapshot(&self) -> Vec<Arc<Session>> {
        self.sessions.read().await.clone()
    }

    pub async fn ids(&self) -> Vec<SessionId> {
        let sessions = self.sessions.read().await;
        sessions.iter().map(|s| s.id()).collect()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Send `message` to every registered session except `exclude`.
    ///
    /// Targets are fixed by a snapshot taken before the first send; the lock
    /// is not held while sending. A failed target never stops the others.
    pub async fn broadcast(
        &self,
        message: WebSocketMessage,
        exclude: Option<SessionId>,
    ) -> BroadcastResult {
        let targets = self.snapshot().await;
        let mut result = BroadcastResult::default();

        for session in targets {
            if Some(session.id()) == exclude {
                continue;
            }
            match session.send(message.clone()).await {
                Ok(()) => result.delivered += 1,
                Err(e) => result.failed.push((session.id(), e)),
            }
        }

        if result.has_failures() {
            debug!(
                "Broadcast reached {} of {} sessions",
                result.delivered,
                result.total_attempted()
            );
        }
        result
    }

    pub async fn broadcast_text<T: Into<String>>(
        &self,
        text: T,
        exclude: Option<SessionId>,
    ) -> BroadcastResult {
        self.broadcast(WebSocketMessage::text(text), exclude).await
    }

    /// Close every registered session.
    ///
    /// Sessions stay registered until their connection tasks observe the
    /// close and run the normal close path.
    pub async fn close_all(&self) -> CloseAllResult {
        let sessions = self.snapshot().await;
        let mut result = CloseAllResult::default();

        for session in sessions {
            match session.close().await {
                Ok(()) => result.closed += 1,
                Err(e) => result.failed.push((session.id(), e)),
            }
        }

        info!("Closed {} sessions", result.closed);
        result
    }

    /// Count registered sessions by state
    pub async fn stats(&self) -> RegistryStats {
        let sessions = self.snapshot().await;
        let mut stats = RegistryStats {
            total: sessions.len(),
            ..RegistryStats::default()
        };

        for session in sessions {
            match session.state().await {
                SessionState::Open => stats.open += 1,
                SessionState::Closing => stats.closing += 1,
                SessionState::Closed => stats.closed += 1,
            }
        }

        stats
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of a broadcast
#[derive(Debug, Default)]
pub struct BroadcastResult {
    pub delivered: usize,
    pub failed: Vec<(SessionId, WebSocketError)>,
}

impl BroadcastResult {
    pub fn total_attempted(&self) -> usize {
        self.delivered + self.failed.len()
    }

    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }
}

/// Outcome of closing every session
#[derive(Debug, Default)]
pub struct CloseAllResult {
    pub closed: usize,
    pub failed: Vec<(SessionId, WebSocketError)>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RegistryStats {
    pub total: usize,
    pub open: usize,
    pub closing: usize,
    pub closed: usize,
}
