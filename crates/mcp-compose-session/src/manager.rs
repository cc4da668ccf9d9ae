//! The session table.
//!
//! Readers (the bridge, discovery) take the table lock shared; reload takes
//! it exclusive and swaps the whole map in one critical section, so requests
//! never observe a half-rebuilt table.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::session::{BackendSession, SessionConfig, SessionSnapshot};

#[derive(Default)]
pub struct SessionManager {
    sessions: RwLock<HashMap<String, Arc<BackendSession>>>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and register a session, connecting in the background so one
    /// slow backend does not serialize startup.
    pub async fn attach(&self, name: &str, config: SessionConfig) -> Arc<BackendSession> {
        let session = Arc::new(BackendSession::new(name, config));
        {
            let mut sessions = self.sessions.write().await;
            if let Some(previous) = sessions.insert(name.to_string(), session.clone()) {
                warn!(server = %name, "replacing existing session");
                let previous = previous.clone();
                tokio::spawn(async move { previous.close().await });
            }
        }
        {
            let session = session.clone();
            let name = name.to_string();
            tokio::spawn(async move {
                if let Err(e) = session.connect().await {
                    warn!(server = %name, "initial connect failed: {e}");
                }
            });
        }
        session
    }

    /// Close and remove one session.
    pub async fn detach(&self, name: &str) -> bool {
        let removed = {
            let mut sessions = self.sessions.write().await;
            sessions.remove(name)
        };
        match removed {
            Some(session) => {
                session.close().await;
                info!(server = %name, "session detached");
                true
            }
            None => false,
        }
    }

    pub async fn get(&self, name: &str) -> Option<Arc<BackendSession>> {
        let sessions = self.sessions.read().await;
        sessions.get(name).cloned()
    }

    pub async fn names(&self) -> Vec<String> {
        let sessions = self.sessions.read().await;
        let mut names: Vec<String> = sessions.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    pub async fn snapshots(&self) -> Vec<SessionSnapshot> {
        let sessions: Vec<Arc<BackendSession>> = {
            let table = self.sessions.read().await;
            table.values().cloned().collect()
        };
        let mut snapshots = Vec::with_capacity(sessions.len());
        for session in sessions {
            snapshots.push(session.snapshot().await);
        }
        snapshots.sort_by(|a, b| a.name.cmp(&b.name));
        snapshots
    }

    /// Atomically replace the whole table. Returned sessions are the ones
    /// displaced; reload closes them after the swap so inflight requests
    /// against removed backends fail with a closed session, not a torn map.
    pub async fn swap(
        &self,
        replacement: HashMap<String, Arc<BackendSession>>,
    ) -> Vec<Arc<BackendSession>> {
        let mut sessions = self.sessions.write().await;
        let old = std::mem::replace(&mut *sessions, replacement);
        old.into_values().collect()
    }

    /// Close every session, giving inflight work a drain window first.
    pub async fn shutdown(&self, drain: Duration) {
        let deadline = tokio::time::Instant::now() + drain;
        loop {
            let inflight: usize = {
                let sessions = self.sessions.read().await;
                let mut total = 0;
                for session in sessions.values() {
                    total += session.snapshot().await.inflight;
                }
                total
            };
            if inflight == 0 || tokio::time::Instant::now() >= deadline {
                if inflight > 0 {
                    warn!(inflight, "drain window elapsed with work in flight");
                }
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        let sessions = self.swap(HashMap::new()).await;
        for session in sessions {
            session.close().await;
        }
        info!("all sessions closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TransportConfig;

    fn noop_config() -> SessionConfig {
        SessionConfig::new(TransportConfig::Stdio {
            command: "cat".to_string(),
            args: vec![],
            env: Default::default(),
        })
    }

    #[tokio::test]
    async fn attach_get_detach() {
        let manager = SessionManager::new();
        manager.attach("a", noop_config()).await;
        assert!(manager.get("a").await.is_some());
        assert_eq!(manager.names().await, vec!["a"]);
        assert!(manager.detach("a").await);
        assert!(!manager.detach("a").await);
        assert!(manager.is_empty().await);
    }

    #[tokio::test]
    async fn swap_replaces_table_atomically() {
        let manager = SessionManager::new();
        manager.attach("old", noop_config()).await;
        let mut replacement = HashMap::new();
        replacement.insert(
            "new".to_string(),
            Arc::new(BackendSession::new("new", noop_config())),
        );
        let displaced = manager.swap(replacement).await;
        assert_eq!(displaced.len(), 1);
        assert_eq!(displaced[0].name(), "old");
        assert_eq!(manager.names().await, vec!["new"]);
    }

    #[tokio::test]
    async fn shutdown_empties_table() {
        let manager = SessionManager::new();
        manager.attach("a", noop_config()).await;
        manager.attach("b", noop_config()).await;
        manager.shutdown(Duration::from_millis(200)).await;
        assert!(manager.is_empty().await);
    }
}
