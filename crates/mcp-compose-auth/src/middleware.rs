//! Request authentication for the proxy surface.
//!
//! Every inbound request (except CORS preflight) passes through
//! [`AuthMiddleware::authenticate`]: bearer extraction, OAuth validation
//! against the token store, and an optional legacy API-key fallback. Scope
//! enforcement happens per route via [`AuthMiddleware::require_scope`].

use axum::http::HeaderMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::AuthError;
use crate::store::TokenStore;
use crate::types::split_scopes;
use crate::{AuthResult, WILDCARD_SCOPE};

const MAX_TOKEN_LENGTH: usize = 4096;

/// How a request authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthKind {
    OAuth,
    /// Legacy shared secret; bypasses scope checks.
    ApiKey,
    /// Authentication disabled in the manifest.
    Anonymous,
}

/// Identity attached to a request after authentication.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub kind: AuthKind,
    pub client_id: String,
    pub user_id: String,
    pub scope: String,
}

impl AuthContext {
    fn api_key() -> Self {
        Self {
            kind: AuthKind::ApiKey,
            client_id: "api_key".to_string(),
            user_id: "api_key".to_string(),
            scope: String::new(),
        }
    }

    fn anonymous() -> Self {
        Self {
            kind: AuthKind::Anonymous,
            client_id: String::new(),
            user_id: String::new(),
            scope: String::new(),
        }
    }

    pub fn has_scope(&self, required: &str) -> bool {
        match self.kind {
            // documented legacy behavior: the shared key grants everything
            AuthKind::ApiKey | AuthKind::Anonymous => true,
            AuthKind::OAuth => has_scope(&self.scope, required),
        }
    }
}

/// Whether a space-separated grant covers `required`, directly or through
/// the `mcp:*` wildcard.
pub fn has_scope(granted: &str, required: &str) -> bool {
    let granted = split_scopes(granted);
    granted.contains(&required) || granted.contains(&WILDCARD_SCOPE)
}

/// Pull the token out of an `Authorization: Bearer …` header value.
pub fn extract_bearer_token(auth_header: &str) -> AuthResult<&str> {
    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or_else(|| AuthError::InvalidToken("not a Bearer token".to_string()))?
        .trim();
    if token.is_empty() {
        return Err(AuthError::InvalidToken("empty token".to_string()));
    }
    if token.len() > MAX_TOKEN_LENGTH {
        return Err(AuthError::InvalidToken(format!(
            "token too long ({} > {MAX_TOKEN_LENGTH})",
            token.len()
        )));
    }
    Ok(token)
}

pub struct AuthMiddleware {
    store: Arc<dyn TokenStore>,
    api_key: Option<String>,
    enabled: bool,
}

impl AuthMiddleware {
    pub fn new(store: Arc<dyn TokenStore>, api_key: Option<String>, enabled: bool) -> Self {
        if api_key.is_some() {
            warn!("API-key authentication is enabled; API-key requests bypass scope checks");
        }
        Self {
            store,
            api_key,
            enabled,
        }
    }

    /// Authenticate one request from its headers.
    ///
    /// OAuth validation is attempted first; if it fails and an API key is
    /// configured, the bearer value is compared against it before giving up.
    pub async fn authenticate(&self, headers: &HeaderMap) -> AuthResult<AuthContext> {
        if !self.enabled {
            return Ok(AuthContext::anonymous());
        }

        let header = headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or(AuthError::MissingToken)?;
        let token = extract_bearer_token(header)?;

        match self.store.get_access(token).await {
            Ok(access) => {
                debug!(client = %access.client_id, "bearer token accepted");
                Ok(AuthContext {
                    kind: AuthKind::OAuth,
                    client_id: access.client_id,
                    user_id: access.user_id,
                    scope: access.scope,
                })
            }
            Err(oauth_err) => {
                if let Some(api_key) = &self.api_key {
                    if token == api_key {
                        debug!("request authenticated with legacy API key");
                        return Ok(AuthContext::api_key());
                    }
                }
                Err(oauth_err)
            }
        }
    }

    /// Enforce a scope on an authenticated request.
    pub fn require_scope(&self, context: &AuthContext, scope: &str) -> AuthResult<()> {
        if context.has_scope(scope) {
            Ok(())
        } else {
            Err(AuthError::MissingScope {
                scope: scope.to_string(),
            })
        }
    }
}
