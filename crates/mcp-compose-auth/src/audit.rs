//! Append-only audit log with bounded memory.
//!
//! Authorization decisions and token lifecycle events land here. The ring
//! holds at most `max_entries`; a background task additionally prunes by age
//! every hour. Readers always receive copies.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, SystemTime};
use tokio::sync::watch;
use tracing::{info, warn};

use mcp_compose_core::config::AuditConfig;
use mcp_compose_core::error::ComposeError;

/// Interval between age-based cleanup passes.
pub const CLEANUP_INTERVAL: Duration = Duration::from_secs(3600);

/// How long `shutdown` waits for the cleanup task.
pub const SHUTDOWN_WAIT: Duration = Duration::from_secs(5);

/// Event tags recorded by the authorization server and middleware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEvent {
    AuthorizeGranted,
    AuthorizeDenied,
    TokenIssued,
    TokenRefreshed,
    TokenRevoked,
    TokenIntrospected,
    CodeReplayed,
    ClientRegistered,
    AuthSuccess,
    AuthFailure,
    ScopeDenied,
    ApiKeyUsed,
}

impl AuditEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditEvent::AuthorizeGranted => "authorize_granted",
            AuditEvent::AuthorizeDenied => "authorize_denied",
            AuditEvent::TokenIssued => "token_issued",
            AuditEvent::TokenRefreshed => "token_refreshed",
            AuditEvent::TokenRevoked => "token_revoked",
            AuditEvent::TokenIntrospected => "token_introspected",
            AuditEvent::CodeReplayed => "code_replayed",
            AuditEvent::ClientRegistered => "client_registered",
            AuditEvent::AuthSuccess => "auth_success",
            AuditEvent::AuthFailure => "auth_failure",
            AuditEvent::ScopeDenied => "scope_denied",
            AuditEvent::ApiKeyUsed => "api_key_used",
        }
    }
}

/// One recorded event. External readers receive clones.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: u64,
    pub timestamp: SystemTime,
    pub event: AuditEvent,
    pub user_id: String,
    pub client_id: String,
    pub ip: String,
    pub user_agent: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub details: serde_json::Value,
}

/// Query filter; `None` fields are wildcards.
#[derive(Debug, Clone, Default)]
pub struct AuditQuery {
    pub event: Option<AuditEvent>,
    pub user_id: Option<String>,
    pub client_id: Option<String>,
    pub success: Option<bool>,
    pub since: Option<SystemTime>,
    pub until: Option<SystemTime>,
}

impl AuditQuery {
    fn matches(&self, entry: &AuditEntry) -> bool {
        if let Some(event) = self.event {
            if entry.event != event {
                return false;
            }
        }
        if let Some(user) = &self.user_id {
            if &entry.user_id != user {
                return false;
            }
        }
        if let Some(client) = &self.client_id {
            if &entry.client_id != client {
                return false;
            }
        }
        if let Some(success) = self.success {
            if entry.success != success {
                return false;
            }
        }
        if let Some(since) = self.since {
            if entry.timestamp < since {
                return false;
            }
        }
        if let Some(until) = self.until {
            if entry.timestamp > until {
                return false;
            }
        }
        true
    }
}

struct CleanupTask {
    shutdown: watch::Sender<bool>,
    task: tokio::task::JoinHandle<()>,
}

/// Bounded in-memory audit log.
pub struct AuditLog {
    config: AuditConfig,
    entries: Mutex<VecDeque<AuditEntry>>,
    next_id: AtomicU64,
    active: AtomicBool,
    cleanup: Mutex<Option<CleanupTask>>,
}

impl AuditLog {
    pub fn new(config: AuditConfig) -> Self {
        Self {
            config,
            entries: Mutex::new(VecDeque::new()),
            next_id: AtomicU64::new(1),
            active: AtomicBool::new(true),
            cleanup: Mutex::new(None),
        }
    }

    fn event_enabled(&self, event: AuditEvent) -> bool {
        self.config.events.is_empty()
            || self.config.events.iter().any(|e| e == event.as_str())
    }

    /// Record an event. No-op when the log is disabled, the event tag is not
    /// enabled, or the log has been shut down.
    #[allow(clippy::too_many_arguments)]
    pub fn log(
        &self,
        event: AuditEvent,
        user_id: &str,
        client_id: &str,
        ip: &str,
        user_agent: &str,
        success: bool,
        details: serde_json::Value,
        error: Option<&str>,
    ) {
        if !self.config.enabled
            || !self.active.load(Ordering::Acquire)
            || !self.event_enabled(event)
        {
            return;
        }

        let entry = AuditEntry {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            timestamp: SystemTime::now(),
            event,
            user_id: user_id.to_string(),
            client_id: client_id.to_string(),
            ip: ip.to_string(),
            user_agent: user_agent.to_string(),
            success,
            error: error.map(str::to_string),
            details,
        };

        info!(
            target: "audit",
            event = event.as_str(),
            user = %entry.user_id,
            client = %entry.client_id,
            success,
            "audit event"
        );

        let mut entries = self.entries.lock().expect("audit lock poisoned");
        entries.push_back(entry);
        while entries.len() > self.config.max_entries {
            entries.pop_front();
        }
    }

    /// Scan the ring with `filter`, returning one page and the total match
    /// count.
    pub fn query(&self, limit: usize, offset: usize, filter: &AuditQuery) -> (Vec<AuditEntry>, usize) {
        let entries = self.entries.lock().expect("audit lock poisoned");
        let matched: Vec<&AuditEntry> = entries.iter().filter(|e| filter.matches(e)).collect();
        let total = matched.len();
        let page = matched
            .into_iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect();
        (page, total)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("audit lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop entries older than the configured `max_age`.
    pub fn prune_aged(&self) -> usize {
        let cutoff = SystemTime::now() - Duration::from_secs(self.config.max_age_secs);
        let mut entries = self.entries.lock().expect("audit lock poisoned");
        let before = entries.len();
        entries.retain(|e| e.timestamp >= cutoff);
        before - entries.len()
    }

    /// Start the hourly cleanup task.
    pub fn spawn_cleanup(self: &std::sync::Arc<Self>) {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let log = self.clone();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(CLEANUP_INTERVAL);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let dropped = log.prune_aged();
                        if dropped > 0 {
                            info!(dropped, "audit log age cleanup");
                        }
                    }
                    _ = shutdown_rx.changed() => break,
                }
            }
        });
        let mut cleanup = self.cleanup.lock().expect("audit lock poisoned");
        *cleanup = Some(CleanupTask {
            shutdown: shutdown_tx,
            task,
        });
    }

    /// Stop accepting entries and wait for the cleanup task, up to
    /// [`SHUTDOWN_WAIT`].
    pub async fn shutdown(&self) -> Result<(), ComposeError> {
        self.active.store(false, Ordering::Release);
        let cleanup = {
            let mut guard = self.cleanup.lock().expect("audit lock poisoned");
            guard.take()
        };
        if let Some(cleanup) = cleanup {
            let _ = cleanup.shutdown.send(true);
            if tokio::time::timeout(SHUTDOWN_WAIT, cleanup.task)
                .await
                .is_err()
            {
                warn!("audit cleanup task did not stop in time");
                return Err(ComposeError::ShutdownTimeout(SHUTDOWN_WAIT));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    fn config(max_entries: usize) -> AuditConfig {
        AuditConfig {
            enabled: true,
            max_entries,
            max_age_secs: 3600,
            events: Vec::new(),
        }
    }

    fn log_n(log: &AuditLog, n: usize, success: bool) {
        for i in 0..n {
            log.log(
                AuditEvent::TokenIssued,
                &format!("user{i}"),
                "client",
                "127.0.0.1",
                "test-agent",
                success,
                json!({}),
                None,
            );
        }
    }

    #[test]
    fn ring_stays_bounded() {
        let log = AuditLog::new(config(5));
        log_n(&log, 20, true);
        assert_eq!(log.len(), 5);
        // the survivors are the newest
        let (page, total) = log.query(10, 0, &AuditQuery::default());
        assert_eq!(total, 5);
        assert_eq!(page[0].user_id, "user15");
    }

    #[test]
    fn query_filters_and_paginates() {
        let log = AuditLog::new(config(100));
        log_n(&log, 6, true);
        log_n(&log, 4, false);
        let (failures, total) = log.query(
            2,
            0,
            &AuditQuery {
                success: Some(false),
                ..Default::default()
            },
        );
        assert_eq!(total, 4);
        assert_eq!(failures.len(), 2);
        let (page2, _) = log.query(
            2,
            2,
            &AuditQuery {
                success: Some(false),
                ..Default::default()
            },
        );
        assert_eq!(page2.len(), 2);
        assert_ne!(failures[0].id, page2[0].id);
    }

    #[test]
    fn disabled_event_set_filters() {
        let mut cfg = config(100);
        cfg.events = vec!["token_revoked".to_string()];
        let log = AuditLog::new(cfg);
        log_n(&log, 3, true); // token_issued, not enabled
        assert_eq!(log.len(), 0);
        log.log(
            AuditEvent::TokenRevoked,
            "u",
            "c",
            "",
            "",
            true,
            json!({}),
            None,
        );
        assert_eq!(log.len(), 1);
    }

    #[tokio::test]
    async fn shutdown_makes_log_noop() {
        let log = Arc::new(AuditLog::new(config(100)));
        log.spawn_cleanup();
        log_n(&log, 2, true);
        log.shutdown().await.unwrap();
        log_n(&log, 2, true);
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn prune_aged_drops_old_entries() {
        let mut cfg = config(100);
        cfg.max_age_secs = 0;
        let log = AuditLog::new(cfg);
        log_n(&log, 3, true);
        // everything is older than a zero-second horizon on the next tick
        std::thread::sleep(Duration::from_millis(10));
        assert_eq!(log.prune_aged(), 3);
        assert!(log.is_empty());
    }
}
