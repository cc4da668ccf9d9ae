//! OAuth client registry.
//!
//! Clients arrive two ways: provisioned from the manifest, or through
//! dynamic registration (RFC 7591) when enabled. The registry owns the client
//! table; token tables live in the [`crate::store`].

use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::RwLock;
use tracing::info;

use mcp_compose_core::config::StaticClientConfig;
use mcp_compose_core::utils::{generate_client_id, generate_secure_token, SECURE_TOKEN_LENGTH};

use crate::error::AuthError;
use crate::types::{ClientRegistrationRequest, ClientRegistrationResponse, OAuthClientRecord};
use crate::AuthResult;

const SECRET_LIFETIME: Duration = Duration::from_secs(365 * 24 * 3600);

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs()
}

pub struct ClientRegistry {
    clients: RwLock<HashMap<String, OAuthClientRecord>>,
    dynamic_registration: bool,
}

impl ClientRegistry {
    pub fn new(static_clients: &[StaticClientConfig], dynamic_registration: bool) -> Self {
        let mut clients = HashMap::new();
        for config in static_clients {
            let public = config.client_secret.is_none();
            let mut grant_types = if config.grant_types.is_empty() {
                vec![
                    "authorization_code".to_string(),
                    "refresh_token".to_string(),
                ]
            } else {
                config.grant_types.clone()
            };
            if public {
                // public clients never hold the credentials grant
                grant_types.retain(|g| g != "client_credentials");
            }
            let record = OAuthClientRecord {
                client_id: config.client_id.clone(),
                client_secret: config.client_secret.clone(),
                redirect_uris: config.redirect_uris.clone(),
                grant_types,
                response_types: vec!["code".to_string()],
                scopes: config.scopes.clone(),
                token_endpoint_auth_method: if public {
                    "none".to_string()
                } else {
                    "client_secret_basic".to_string()
                },
                public,
                allow_plain_pkce: config.allow_plain_pkce,
                issued_at: unix_now(),
                secret_expires_at: None,
            };
            clients.insert(record.client_id.clone(), record);
        }
        Self {
            clients: RwLock::new(clients),
            dynamic_registration,
        }
    }

    pub async fn get(&self, client_id: &str) -> Option<OAuthClientRecord> {
        let clients = self.clients.read().await;
        clients.get(client_id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.clients.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.clients.read().await.is_empty()
    }

    /// Dynamic client registration (RFC 7591).
    ///
    /// A registration without a secret and with `token_endpoint_auth_method`
    /// of `none` produces a public client; anything else gets a generated
    /// secret that expires in one year.
    pub async fn register(
        &self,
        request: ClientRegistrationRequest,
    ) -> AuthResult<ClientRegistrationResponse> {
        if !self.dynamic_registration {
            return Err(AuthError::RegistrationDisabled);
        }
        if request.redirect_uris.is_empty() {
            return Err(AuthError::InvalidRequest(
                "at least one redirect_uri is required".to_string(),
            ));
        }
        for uri in &request.redirect_uris {
            let parsed = url::Url::parse(uri).map_err(|e| {
                AuthError::InvalidRequest(format!("invalid redirect_uri '{uri}': {e}"))
            })?;
            if !parsed.has_host() {
                return Err(AuthError::InvalidRequest(format!(
                    "redirect_uri '{uri}' must have a scheme and host"
                )));
            }
        }

        let auth_method = request
            .token_endpoint_auth_method
            .clone()
            .unwrap_or_else(|| "client_secret_basic".to_string());
        let public = auth_method == "none";

        let mut grant_types = request.grant_types.clone().unwrap_or_else(|| {
            vec![
                "authorization_code".to_string(),
                "refresh_token".to_string(),
            ]
        });
        if public {
            grant_types.retain(|g| g != "client_credentials");
        }
        let response_types = request
            .response_types
            .clone()
            .unwrap_or_else(|| vec!["code".to_string()]);

        let client_id = generate_client_id();
        let issued_at = unix_now();
        let (client_secret, secret_expires_at) = if public {
            (None, None)
        } else {
            (
                Some(generate_secure_token(SECURE_TOKEN_LENGTH)),
                Some(issued_at + SECRET_LIFETIME.as_secs()),
            )
        };

        let record = OAuthClientRecord {
            client_id: client_id.clone(),
            client_secret: client_secret.clone(),
            redirect_uris: request.redirect_uris.clone(),
            grant_types: grant_types.clone(),
            response_types: response_types.clone(),
            scopes: request
                .scope
                .as_deref()
                .map(|s| s.split_whitespace().map(str::to_string).collect())
                .unwrap_or_default(),
            token_endpoint_auth_method: auth_method.clone(),
            public,
            allow_plain_pkce: false,
            issued_at,
            secret_expires_at,
        };

        {
            let mut clients = self.clients.write().await;
            clients.insert(client_id.clone(), record);
        }
        info!(client_id = %client_id, public, "registered oauth client");

        Ok(ClientRegistrationResponse {
            client_id,
            client_secret,
            client_id_issued_at: issued_at,
            client_secret_expires_at: secret_expires_at,
            redirect_uris: request.redirect_uris,
            grant_types,
            response_types,
            token_endpoint_auth_method: auth_method,
        })
    }

    /// Authenticate a token-endpoint caller. Public clients present no
    /// secret; confidential clients must present a matching, unexpired one.
    pub async fn authenticate(
        &self,
        client_id: &str,
        client_secret: Option<&str>,
    ) -> AuthResult<OAuthClientRecord> {
        let record = self
            .get(client_id)
            .await
            .ok_or_else(|| AuthError::InvalidClient(format!("unknown client: {client_id}")))?;

        match (&record.client_secret, client_secret) {
            (None, _) => Ok(record),
            (Some(expected), Some(presented)) if expected == presented => {
                if let Some(expiry) = record.secret_expires_at {
                    if unix_now() >= expiry {
                        return Err(AuthError::InvalidClient(
                            "client secret expired".to_string(),
                        ));
                    }
                }
                Ok(record)
            }
            (Some(_), Some(_)) => Err(AuthError::InvalidClient(
                "client secret mismatch".to_string(),
            )),
            (Some(_), None) => Err(AuthError::InvalidClient(
                "client secret required".to_string(),
            )),
        }
    }
}
