use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::frame::event_frame;
use super::sink::EventSink;
use crate::error::SessionError;

/// Upper bound on a single frame write before the session counts as dead
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// One live event stream
pub struct Session {
    pub id: String,
    pub sink: Arc<dyn EventSink>,
    pub created_at: DateTime<Utc>,
    /// Cancelled when the registry drops the session, so its owner can
    /// tear down
    evicted: CancellationToken,
}

impl Session {
    pub fn new(id: impl Into<String>, sink: Arc<dyn EventSink>) -> Self {
        Self {
            id: id.into(),
            sink,
            created_at: Utc::now(),
            evicted: CancellationToken::new(),
        }
    }

    /// Token cancelled once this session has been removed from the registry
    pub fn eviction(&self) -> CancellationToken {
        self.evicted.clone()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// Outcome of [`SessionRegistry::broadcast`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Set of active sessions, keyed by session id.
///
/// Clones share the same map. The lock is only held to read or mutate the
/// map, never across a write to a sink.
#[derive(Clone)]
pub struct SessionRegistry {
    inner: Arc<Mutex<HashMap<String, Arc<Session>>>>,
    write_timeout: Duration,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::with_write_timeout(DEFAULT_WRITE_TIMEOUT)
    }

    pub fn with_write_timeout(write_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
            write_timeout,
        }
    }

    pub fn write_timeout(&self) -> Duration {
        self.write_timeout
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<String, Arc<Session>>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn connect(&self, session: Arc<Session>) {
        let id = session.id.clone();
        let total = {
            let mut sessions = self.sessions();
            sessions.insert(id.clone(), session);
            sessions.len()
        };
        tracing::info!(session_id = %id, total, "Session connected");
    }

    /// Remove a session and signal its eviction. Unknown ids are a no-op.
    pub fn disconnect(&self, id: &str) -> bool {
        let (removed, total) = {
            let mut sessions = self.sessions();
            let removed = sessions.remove(id);
            (removed, sessions.len())
        };

        match removed {
            Some(session) => {
                session.evicted.cancel();
                tracing::info!(session_id = %id, total, "Session disconnected");
                true
            }
            None => false,
        }
    }

    /// Drop every session, e.g. on shutdown. Returns how many were removed.
    pub fn disconnect_all(&self) -> usize {
        let drained: Vec<Arc<Session>> = self.sessions().drain().map(|(_, s)| s).collect();
        for session in &drained {
            session.evicted.cancel();
        }
        if !drained.is_empty() {
            tracing::info!(count = drained.len(), "Disconnected all sessions");
        }
        drained.len()
    }

    pub fn get(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions().get(id).cloned()
    }

    /// Write one frame to `session`, bounded by the write timeout.
    pub async fn deliver(&self, session: &Session, frame: &str) -> Result<(), SessionError> {
        match tokio::time::timeout(self.write_timeout, session.sink.write(frame)).await {
            Ok(result) => result,
            Err(_) => Err(SessionError::WriteTimeout(self.write_timeout)),
        }
    }

    /// Send one event to one session.
    ///
    /// Returns `false` if the id is unknown or the write failed; a failed
    /// session is disconnected.
    pub async fn send_to(&self, id: &str, event: &str, payload: &Value) -> bool {
        let Some(session) = self.get(id) else {
            tracing::debug!(session_id = %id, event, "Send to unknown session");
            return false;
        };

        let frame = event_frame(event, payload);
        match self.deliver(&session, &frame).await {
            Ok(()) => {
                tracing::debug!(session_id = %id, event, "Event sent");
                true
            }
            Err(e) => {
                tracing::warn!(session_id = %id, event, error = %e, "Event write failed, dropping session");
                self.disconnect(id);
                false
            }
        }
    }

    /// Send one event to every session concurrently.
    ///
    /// Each failing session is disconnected without affecting the others.
    pub async fn broadcast(&self, event: &str, payload: &Value) -> BroadcastReport {
        let targets: Vec<Arc<Session>> = self.sessions().values().cloned().collect();
        let frame = event_frame(event, payload);
        let frame = frame.as_str();

        let results = join_all(targets.iter().map(|session| async move {
            let result = self.deliver(session, frame).await;
            (session.id.as_str(), result)
        }))
        .await;

        let mut report = BroadcastReport::default();
        for (id, result) in results {
            match result {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    tracing::warn!(session_id = %id, event, error = %e, "Broadcast write failed, dropping session");
                    self.disconnect(id);
                    report.failed += 1;
                }
            }
        }

        tracing::debug!(event, delivered = report.delivered, failed = report.failed, "Broadcast complete");
        report
    }

    pub fn count(&self) -> usize {
        self.sessions().len()
    }

    pub fn list_ids(&self) -> Vec<String> {
        self.sessions().keys().cloned().collect()
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("sessions", &self.count())
            .field("write_timeout", &self.write_timeout)
            .finish()
    }
}
