//! Manifest reload: diff and atomically swap the session table.
//!
//! The live table is compared against the re-read manifest by server name
//! and content hash. Unchanged sessions are carried over untouched; added
//! and changed servers get fresh sessions; removed and replaced sessions are
//! closed after a single rebuild-and-swap under the manager's write lock, so
//! a request either sees the old table or the new one, never a mix.

use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

use mcp_compose_core::config::{ComposeConfig, ConnectionsConfig};
use mcp_compose_core::error::{ComposeError, ComposeResult};
use mcp_compose_session::{BackendSession, SessionConfig, SessionManager};

use crate::transport_for;

#[derive(Debug, Clone, Serialize, Default, PartialEq, Eq)]
pub struct ReloadReport {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub changed: Vec<String>,
    pub unchanged: Vec<String>,
}

impl ReloadReport {
    pub fn is_noop(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }
}

pub struct ReloadController {
    manifest_path: PathBuf,
    manager: Arc<SessionManager>,
    config: Arc<RwLock<ComposeConfig>>,
}

impl ReloadController {
    pub fn new(
        manifest_path: PathBuf,
        manager: Arc<SessionManager>,
        config: Arc<RwLock<ComposeConfig>>,
    ) -> Self {
        Self {
            manifest_path,
            manager,
            config,
        }
    }

    /// Re-read the manifest from disk and apply the delta.
    pub async fn reload(&self) -> ComposeResult<ReloadReport> {
        let fresh = ComposeConfig::load(&self.manifest_path)?;
        let report = self.apply(&fresh).await?;
        *self.config.write().await = fresh;
        info!(
            added = report.added.len(),
            removed = report.removed.len(),
            changed = report.changed.len(),
            "manifest reloaded"
        );
        Ok(report)
    }

    /// Build the replacement session table for `fresh` and swap it in. Also
    /// used at startup with the initial manifest (everything is "added").
    pub async fn apply(&self, fresh: &ComposeConfig) -> ComposeResult<ReloadReport> {
        let current = self.config.read().await;
        let mut report = ReloadReport::default();
        let mut replacement: HashMap<String, Arc<BackendSession>> = HashMap::new();

        let connections = fresh.connections.clone();
        for (name, server) in &fresh.servers {
            let Some(transport) = transport_for(server) else {
                warn!(server = %name, "no usable transport; server not proxied");
                continue;
            };
            let carried = match current.servers.get(name) {
                Some(existing) if existing.content_hash() == server.content_hash() => {
                    self.manager.get(name).await
                }
                Some(_) => {
                    report.changed.push(name.clone());
                    None
                }
                None => {
                    report.added.push(name.clone());
                    None
                }
            };

            let session = match carried {
                Some(session) => {
                    report.unchanged.push(name.clone());
                    session
                }
                None => new_session(name, transport, &connections),
            };
            replacement.insert(name.clone(), session);
        }

        for name in current.servers.keys() {
            if !fresh.servers.contains_key(name) {
                report.removed.push(name.clone());
            }
        }
        drop(current);

        report.added.sort();
        report.removed.sort();
        report.changed.sort();
        report.unchanged.sort();

        // single swap: readers see old or new, nothing in between
        let displaced = self.manager.swap(replacement).await;
        for session in displaced {
            // carried-over sessions appear in both tables; close only the
            // ones that are actually gone
            if self.manager.get(session.name()).await.is_none()
                || report.changed.iter().any(|n| n == session.name())
            {
                session.close().await;
            }
        }

        Ok(report)
    }
}

fn new_session(
    name: &str,
    transport: mcp_compose_session::TransportConfig,
    connections: &ConnectionsConfig,
) -> Arc<BackendSession> {
    let config = SessionConfig {
        transport,
        request_timeout: std::time::Duration::from_secs(connections.request_timeout_secs),
        max_inflight: connections.max_inflight,
    };
    let session = Arc::new(BackendSession::new(name, config));
    {
        let session = session.clone();
        let name = name.to_string();
        tokio::spawn(async move {
            if let Err(e) = session.connect().await {
                warn!(server = %name, "connect failed: {e}");
            }
        });
    }
    session
}

/// Validate that a manifest loads and proxies something; the CLI `validate`
/// command and pre-reload checks share this.
pub fn validate_manifest(path: &std::path::Path) -> ComposeResult<ComposeConfig> {
    let config = ComposeConfig::load(path)?;
    if config.servers.is_empty() {
        return Err(ComposeError::config("manifest defines no servers"));
    }
    Ok(config)
}
