use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use crate::runtime::Runtime;

/// An isolated runtime seeded from the bootstrap runtime's globals.
#[derive(Clone)]
pub struct Session {
    pub id: Uuid,
    pub user: Option<String>,
    pub runtime: Arc<Runtime>,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
}

impl Session {
    fn new(user: Option<&str>, runtime: Arc<Runtime>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user: user.map(str::to_string),
            runtime,
            created_at: now,
            last_active: now,
        }
    }

    fn expired(&self, timeout: chrono::Duration, now: DateTime<Utc>) -> bool {
        now - self.last_active > timeout
    }
}

/// Manages all live sessions.
#[derive(Clone)]
pub struct SessionManager {
    bootstrap: Arc<Runtime>,
    sessions: Arc<RwLock<HashMap<Uuid, Session>>>,
    timeout: chrono::Duration,
}

impl SessionManager {
    pub fn new(bootstrap: Arc<Runtime>, timeout: Duration) -> Self {
        Self {
            bootstrap,
            sessions: Arc::new(RwLock::new(HashMap::new())),
            timeout: chrono::Duration::from_std(timeout).unwrap_or(chrono::Duration::MAX),
        }
    }

    /// The runtime every session is cloned from.
    pub fn bootstrap(&self) -> &Arc<Runtime> {
        &self.bootstrap
    }

    /// Clone a new session runtime from the bootstrap's current state.
    pub async fn create(&self, user: Option<&str>) -> Uuid {
        let session = Session::new(user, self.bootstrap.clone_for_session());
        let id = session.id;
        self.sessions.write().await.insert(id, session);
        debug!(session = %id, "session created");
        id
    }

    /// The session's runtime, sliding its expiry forward.
    pub async fn get(&self, id: Uuid) -> Option<Arc<Runtime>> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.get_mut(&id)?;
        session.last_active = Utc::now();
        Some(Arc::clone(&session.runtime))
    }

    pub async fn session(&self, id: Uuid) -> Option<Session> {
        self.sessions.read().await.get(&id).cloned()
    }

    pub async fn end(&self, id: Uuid) -> bool {
        let removed = self.sessions.write().await.remove(&id).is_some();
        if removed {
            debug!(session = %id, "session ended");
        }
        removed
    }

    pub async fn list(&self) -> Vec<Uuid> {
        self.sessions.read().await.keys().copied().collect()
    }

    pub async fn active_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Drop every session idle for longer than the timeout.
    pub async fn cleanup_expired(&self) -> usize {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| !s.expired(self.timeout, now));
        let removed = before - sessions.len();
        if removed > 0 {
            info!(removed, remaining = sessions.len(), "expired sessions cleaned up");
        }
        removed
    }

    /// Sweep expired sessions every `interval` until `cancel` fires.
    pub async fn run_cleanup(&self, interval: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.cleanup_expired().await;
                }
            }
        }
        debug!("session cleanup loop stopped");
    }
}
