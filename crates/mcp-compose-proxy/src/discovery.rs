//! Capability discovery across the fleet.
//!
//! Polls every `Ready` session for its tool/resource/prompt inventory and
//! caches the merged result for a short TTL so dashboard and OpenAPI reads
//! do not hammer the backends. `POST /api/discovery/refresh` invalidates.

use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use mcp_compose_core::protocol::methods;
use mcp_compose_core::types::{ListPromptsResponse, ListResourcesResponse, ListToolsResponse};
use mcp_compose_core::types::{Prompt, Resource, Tool};
use mcp_compose_session::{SessionManager, SessionState};

/// Default inventory cache TTL.
pub const DEFAULT_TTL: Duration = Duration::from_secs(30);

/// Probed health of one backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded(String),
    Unhealthy(String),
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Degraded(reason) => write!(f, "degraded: {reason}"),
            HealthStatus::Unhealthy(reason) => write!(f, "unhealthy: {reason}"),
        }
    }
}

/// Everything one backend advertises.
#[derive(Debug, Clone, Serialize)]
pub struct ServerInventory {
    pub name: String,
    pub state: SessionState,
    pub health: HealthStatus,
    pub tools: Vec<Tool>,
    pub resources: Vec<Resource>,
    pub prompts: Vec<Prompt>,
}

/// The merged fleet inventory.
#[derive(Debug, Clone, Serialize, Default)]
pub struct DiscoverySnapshot {
    pub servers: Vec<ServerInventory>,
}

impl DiscoverySnapshot {
    pub fn tool_count(&self) -> usize {
        self.servers.iter().map(|s| s.tools.len()).sum()
    }
}

pub struct DiscoveryService {
    manager: Arc<SessionManager>,
    ttl: Duration,
    cache: RwLock<Option<(Instant, DiscoverySnapshot)>>,
}

impl DiscoveryService {
    pub fn new(manager: Arc<SessionManager>) -> Self {
        Self::with_ttl(manager, DEFAULT_TTL)
    }

    pub fn with_ttl(manager: Arc<SessionManager>, ttl: Duration) -> Self {
        Self {
            manager,
            ttl,
            cache: RwLock::new(None),
        }
    }

    /// Current inventory, from cache when fresh.
    pub async fn inventory(&self) -> DiscoverySnapshot {
        {
            let cache = self.cache.read().await;
            if let Some((stamped, snapshot)) = cache.as_ref() {
                if stamped.elapsed() < self.ttl {
                    return snapshot.clone();
                }
            }
        }

        let snapshot = self.poll().await;
        *self.cache.write().await = Some((Instant::now(), snapshot.clone()));
        snapshot
    }

    /// Drop the cache; the next read polls the fleet.
    pub async fn invalidate(&self) {
        *self.cache.write().await = None;
        debug!("discovery cache invalidated");
    }

    async fn poll(&self) -> DiscoverySnapshot {
        let mut servers = Vec::new();
        for name in self.manager.names().await {
            let Some(session) = self.manager.get(&name).await else {
                continue;
            };
            let state = session.state().await;
            let mut inventory = ServerInventory {
                name: name.clone(),
                state,
                health: health_for(state),
                tools: Vec::new(),
                resources: Vec::new(),
                prompts: Vec::new(),
            };

            if state == SessionState::Ready {
                let capabilities = session.capabilities().await.unwrap_or_default();
                if capabilities.supports_tools() {
                    match session.call(methods::TOOLS_LIST, None, None).await {
                        Ok(result) => {
                            match serde_json::from_value::<ListToolsResponse>(result) {
                                Ok(response) => inventory.tools = response.tools,
                                Err(e) => warn!(server = %name, "bad tools/list payload: {e}"),
                            }
                        }
                        Err(e) => {
                            warn!(server = %name, "tools/list failed: {e}");
                            inventory.health =
                                HealthStatus::Degraded(format!("tools/list failed: {e}"));
                        }
                    }
                }
                if capabilities.supports_resources() {
                    if let Ok(result) = session.call(methods::RESOURCES_LIST, None, None).await {
                        if let Ok(response) =
                            serde_json::from_value::<ListResourcesResponse>(result)
                        {
                            inventory.resources = response.resources;
                        }
                    }
                }
                if capabilities.supports_prompts() {
                    if let Ok(result) = session.call(methods::PROMPTS_LIST, None, None).await {
                        if let Ok(response) = serde_json::from_value::<ListPromptsResponse>(result)
                        {
                            inventory.prompts = response.prompts;
                        }
                    }
                }
            }

            servers.push(inventory);
        }
        DiscoverySnapshot { servers }
    }
}

fn health_for(state: SessionState) -> HealthStatus {
    match state {
        SessionState::Ready => HealthStatus::Healthy,
        SessionState::Init | SessionState::Handshaking => {
            HealthStatus::Degraded("starting".to_string())
        }
        SessionState::Degraded => HealthStatus::Degraded("reconnecting".to_string()),
        SessionState::Closed => HealthStatus::Unhealthy("closed".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_mapping() {
        assert_eq!(health_for(SessionState::Ready), HealthStatus::Healthy);
        assert!(matches!(
            health_for(SessionState::Degraded),
            HealthStatus::Degraded(_)
        ));
        assert!(matches!(
            health_for(SessionState::Closed),
            HealthStatus::Unhealthy(_)
        ));
    }

    #[tokio::test]
    async fn cache_serves_within_ttl() {
        let manager = Arc::new(SessionManager::new());
        let discovery = DiscoveryService::with_ttl(manager.clone(), Duration::from_secs(60));
        let first = discovery.inventory().await;
        assert!(first.servers.is_empty());
        // a new session appears, but the cache still answers
        manager
            .attach(
                "late",
                mcp_compose_session::SessionConfig::new(
                    mcp_compose_session::TransportConfig::Stdio {
                        command: "cat".to_string(),
                        args: vec![],
                        env: Default::default(),
                    },
                ),
            )
            .await;
        assert!(discovery.inventory().await.servers.is_empty());
        discovery.invalidate().await;
        assert_eq!(discovery.inventory().await.servers.len(), 1);
    }
}
