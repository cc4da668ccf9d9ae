//! Token storage: authorization codes, access tokens, refresh tokens.
//!
//! [`MemoryTokenStore`] is the in-tree implementation; a durable deployment
//! plugs a different [`TokenStore`] behind the same trait. Each table has its
//! own lock; reads take it shared, mutations exclusive. `consume_code` and
//! `consume_refresh` are atomic test-and-mark operations — the double-exchange
//! race is settled inside one write guard, never by the caller.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tracing::{debug, info, warn};

use crate::error::AuthError;
use crate::types::{AccessToken, AuthorizationCode, RefreshToken};
use crate::AuthResult;

/// Interval between background sweeps.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(300);

/// Counts removed by one sweep pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    pub codes: usize,
    pub access_tokens: usize,
    pub refresh_tokens: usize,
}

impl SweepStats {
    pub fn total(&self) -> usize {
        self.codes + self.access_tokens + self.refresh_tokens
    }
}

/// Storage contract consumed by the authorization server and middleware.
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn put_code(&self, code: AuthorizationCode) -> AuthResult<()>;

    /// Fetch a code and mark it used in the same critical section. A second
    /// consumption within the code's lifetime fails with
    /// [`AuthError::CodeAlreadyUsed`].
    async fn consume_code(&self, code: &str) -> AuthResult<AuthorizationCode>;

    /// Remember which tokens were minted from a consumed code, so a replay
    /// can revoke them.
    async fn bind_code_tokens(&self, code: &str, tokens: &[String]) -> AuthResult<()>;

    /// Revoke every access token previously bound to `code`. Used as replay
    /// hardening; missing codes are a no-op.
    async fn revoke_code_tokens(&self, code: &str) -> AuthResult<usize>;

    async fn put_access(&self, token: AccessToken) -> AuthResult<()>;

    async fn get_access(&self, token: &str) -> AuthResult<AccessToken>;

    /// Idempotent.
    async fn revoke_access(&self, token: &str) -> AuthResult<()>;

    async fn put_refresh(&self, token: RefreshToken) -> AuthResult<()>;

    /// Fetch a refresh token for rotation, marking it revoked in the same
    /// critical section. The lookup requires a matching `client_id`
    /// (cross-client refresh is indistinguishable from an unknown token).
    /// Replaying an already-rotated token revokes its successor.
    async fn consume_refresh(&self, token: &str, client_id: &str) -> AuthResult<RefreshToken>;

    /// Record the successor of a rotated refresh token.
    async fn mark_rotated(&self, old: &str, new: &str) -> AuthResult<()>;

    /// Idempotent.
    async fn revoke_refresh(&self, token: &str) -> AuthResult<()>;

    /// Drop expired, used, and revoked entries from all tables.
    async fn sweep(&self) -> AuthResult<SweepStats>;
}

/// In-memory store; the default for a single-process deployment.
#[derive(Default)]
pub struct MemoryTokenStore {
    codes: RwLock<HashMap<String, AuthorizationCode>>,
    access: RwLock<HashMap<String, AccessToken>>,
    refresh: RwLock<HashMap<String, RefreshToken>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn the periodic sweeper. The returned handle stops it.
    pub fn spawn_sweeper(store: Arc<Self>, interval: Duration) -> SweeperHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // interval fires immediately once; skip that tick
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match store.sweep().await {
                            Ok(stats) if stats.total() > 0 => {
                                debug!(
                                    codes = stats.codes,
                                    access = stats.access_tokens,
                                    refresh = stats.refresh_tokens,
                                    "token store sweep"
                                );
                            }
                            Ok(_) => {}
                            Err(e) => warn!("token store sweep failed: {e}"),
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        info!("token store sweeper stopping");
                        break;
                    }
                }
            }
        });
        SweeperHandle {
            shutdown: shutdown_tx,
            task,
        }
    }
}

/// Handle to the background sweeper task.
pub struct SweeperHandle {
    shutdown: watch::Sender<bool>,
    task: tokio::task::JoinHandle<()>,
}

impl SweeperHandle {
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.task.await;
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn put_code(&self, code: AuthorizationCode) -> AuthResult<()> {
        let mut codes = self.codes.write().await;
        codes.insert(code.code.clone(), code);
        Ok(())
    }

    async fn consume_code(&self, code: &str) -> AuthResult<AuthorizationCode> {
        let mut codes = self.codes.write().await;
        let entry = codes.get_mut(code).ok_or(AuthError::NotFound)?;
        if entry.used {
            return Err(AuthError::CodeAlreadyUsed);
        }
        if entry.is_expired() {
            return Err(AuthError::TokenExpired);
        }
        // marked before the guard drops; a concurrent exchange sees `used`
        entry.used = true;
        Ok(entry.clone())
    }

    async fn bind_code_tokens(&self, code: &str, tokens: &[String]) -> AuthResult<()> {
        let mut codes = self.codes.write().await;
        if let Some(entry) = codes.get_mut(code) {
            entry.issued_tokens.extend(tokens.iter().cloned());
        }
        Ok(())
    }

    async fn revoke_code_tokens(&self, code: &str) -> AuthResult<usize> {
        let issued = {
            let codes = self.codes.read().await;
            match codes.get(code) {
                Some(entry) => entry.issued_tokens.clone(),
                None => return Ok(0),
            }
        };
        let mut revoked = 0;
        let mut access = self.access.write().await;
        for token in &issued {
            if let Some(entry) = access.get_mut(token) {
                if !entry.revoked {
                    entry.revoked = true;
                    revoked += 1;
                }
            }
        }
        drop(access);
        let mut refresh = self.refresh.write().await;
        for token in &issued {
            if let Some(entry) = refresh.get_mut(token) {
                if !entry.revoked {
                    entry.revoked = true;
                    revoked += 1;
                }
            }
        }
        Ok(revoked)
    }

    async fn put_access(&self, token: AccessToken) -> AuthResult<()> {
        let mut access = self.access.write().await;
        access.insert(token.token.clone(), token);
        Ok(())
    }

    async fn get_access(&self, token: &str) -> AuthResult<AccessToken> {
        let access = self.access.read().await;
        let entry = access.get(token).ok_or(AuthError::NotFound)?;
        if entry.revoked {
            return Err(AuthError::TokenRevoked);
        }
        if entry.is_expired() {
            return Err(AuthError::TokenExpired);
        }
        Ok(entry.clone())
    }

    async fn revoke_access(&self, token: &str) -> AuthResult<()> {
        let mut access = self.access.write().await;
        if let Some(entry) = access.get_mut(token) {
            entry.revoked = true;
        }
        Ok(())
    }

    async fn put_refresh(&self, token: RefreshToken) -> AuthResult<()> {
        let mut refresh = self.refresh.write().await;
        refresh.insert(token.token.clone(), token);
        Ok(())
    }

    async fn consume_refresh(&self, token: &str, client_id: &str) -> AuthResult<RefreshToken> {
        let mut refresh = self.refresh.write().await;
        let entry = refresh.get(token).ok_or(AuthError::NotFound)?;
        if entry.client_id != client_id {
            // do not reveal that the token exists for another client
            return Err(AuthError::NotFound);
        }
        if entry.revoked {
            // rotation replay: kill the successor too
            let successor = entry.rotated_to.clone();
            if let Some(successor) = successor {
                warn!("refresh token replay detected; revoking successor");
                if let Some(next) = refresh.get_mut(&successor) {
                    next.revoked = true;
                }
            }
            return Err(AuthError::TokenRevoked);
        }
        if entry.is_expired() {
            return Err(AuthError::TokenExpired);
        }
        let entry = refresh.get_mut(token).ok_or(AuthError::NotFound)?;
        entry.revoked = true;
        Ok(entry.clone())
    }

    async fn mark_rotated(&self, old: &str, new: &str) -> AuthResult<()> {
        let mut refresh = self.refresh.write().await;
        if let Some(entry) = refresh.get_mut(old) {
            entry.rotated_to = Some(new.to_string());
        }
        Ok(())
    }

    async fn revoke_refresh(&self, token: &str) -> AuthResult<()> {
        let mut refresh = self.refresh.write().await;
        if let Some(entry) = refresh.get_mut(token) {
            entry.revoked = true;
        }
        Ok(())
    }

    async fn sweep(&self) -> AuthResult<SweepStats> {
        let mut stats = SweepStats::default();
        {
            let mut codes = self.codes.write().await;
            let before = codes.len();
            codes.retain(|_, c| !c.used && !c.is_expired());
            stats.codes = before - codes.len();
        }
        {
            let mut access = self.access.write().await;
            let before = access.len();
            access.retain(|_, t| !t.revoked && !t.is_expired());
            stats.access_tokens = before - access.len();
        }
        {
            let mut refresh = self.refresh.write().await;
            let before = refresh.len();
            refresh.retain(|_, t| !t.revoked && !t.is_expired());
            stats.refresh_tokens = before - refresh.len();
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::SystemTime;

    fn code(value: &str) -> AuthorizationCode {
        AuthorizationCode {
            code: value.to_string(),
            client_id: "c1".to_string(),
            user_id: "u1".to_string(),
            redirect_uri: "http://localhost/cb".to_string(),
            scope: "mcp:tools".to_string(),
            code_challenge: None,
            code_challenge_method: None,
            expires_at: SystemTime::now() + Duration::from_secs(600),
            used: false,
            issued_tokens: Vec::new(),
        }
    }

    fn access(value: &str) -> AccessToken {
        AccessToken {
            token: value.to_string(),
            client_id: "c1".to_string(),
            user_id: "u1".to_string(),
            scope: "mcp:tools".to_string(),
            issued_at: SystemTime::now(),
            expires_at: SystemTime::now() + Duration::from_secs(3600),
            revoked: false,
        }
    }

    fn refresh(value: &str) -> RefreshToken {
        RefreshToken {
            token: value.to_string(),
            client_id: "c1".to_string(),
            user_id: "u1".to_string(),
            scope: "mcp:tools".to_string(),
            expires_at: SystemTime::now() + Duration::from_secs(3600),
            revoked: false,
            rotated_to: None,
        }
    }

    #[tokio::test]
    async fn code_consumed_at_most_once() {
        let store = MemoryTokenStore::new();
        store.put_code(code("abc")).await.unwrap();
        assert!(store.consume_code("abc").await.is_ok());
        assert_eq!(
            store.consume_code("abc").await,
            Err(AuthError::CodeAlreadyUsed)
        );
    }

    #[tokio::test]
    async fn expired_code_rejected() {
        let store = MemoryTokenStore::new();
        let mut expired = code("old");
        expired.expires_at = SystemTime::now() - Duration::from_secs(1);
        store.put_code(expired).await.unwrap();
        assert_eq!(store.consume_code("old").await, Err(AuthError::TokenExpired));
    }

    #[tokio::test]
    async fn concurrent_exchange_single_winner() {
        let store = Arc::new(MemoryTokenStore::new());
        store.put_code(code("race")).await.unwrap();
        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(
                async move { store.consume_code("race").await },
            ));
        }
        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn revoked_access_inactive() {
        let store = MemoryTokenStore::new();
        store.put_access(access("tok")).await.unwrap();
        assert!(store.get_access("tok").await.is_ok());
        store.revoke_access("tok").await.unwrap();
        assert_eq!(store.get_access("tok").await, Err(AuthError::TokenRevoked));
        // idempotent
        store.revoke_access("tok").await.unwrap();
    }

    #[tokio::test]
    async fn refresh_rotation_replay_revokes_successor() {
        let store = MemoryTokenStore::new();
        store.put_refresh(refresh("r1")).await.unwrap();
        let consumed = store.consume_refresh("r1", "c1").await.unwrap();
        assert_eq!(consumed.token, "r1");
        store.put_refresh(refresh("r2")).await.unwrap();
        store.mark_rotated("r1", "r2").await.unwrap();
        // replay of r1 kills r2
        assert_eq!(
            store.consume_refresh("r1", "c1").await,
            Err(AuthError::TokenRevoked)
        );
        assert_eq!(
            store.consume_refresh("r2", "c1").await,
            Err(AuthError::TokenRevoked)
        );
    }

    #[tokio::test]
    async fn cross_client_refresh_hidden() {
        let store = MemoryTokenStore::new();
        store.put_refresh(refresh("r1")).await.unwrap();
        assert_eq!(
            store.consume_refresh("r1", "other-client").await,
            Err(AuthError::NotFound)
        );
        // original owner still fine
        assert!(store.consume_refresh("r1", "c1").await.is_ok());
    }

    #[tokio::test]
    async fn replayed_code_revokes_bound_tokens() {
        let store = MemoryTokenStore::new();
        store.put_code(code("c")).await.unwrap();
        store.consume_code("c").await.unwrap();
        store.put_access(access("a1")).await.unwrap();
        store
            .bind_code_tokens("c", &["a1".to_string()])
            .await
            .unwrap();
        assert_eq!(store.revoke_code_tokens("c").await.unwrap(), 1);
        assert_eq!(store.get_access("a1").await, Err(AuthError::TokenRevoked));
    }

    #[tokio::test]
    async fn sweep_drops_dead_entries() {
        let store = MemoryTokenStore::new();
        store.put_code(code("used")).await.unwrap();
        store.consume_code("used").await.unwrap();
        let mut dead = access("dead");
        dead.revoked = true;
        store.put_access(dead).await.unwrap();
        store.put_access(access("live")).await.unwrap();
        let stats = store.sweep().await.unwrap();
        assert_eq!(stats.codes, 1);
        assert_eq!(stats.access_tokens, 1);
        assert!(store.get_access("live").await.is_ok());
    }
}
