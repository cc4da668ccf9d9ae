//! OAuth 2.1 authorization server.
//!
//! Implements RFC 6749 (authorization-code, client-credentials,
//! refresh-token grants), RFC 7636 (PKCE), RFC 7591 (dynamic registration),
//! RFC 7662 (introspection), RFC 7009 (revocation), and RFC 8414 (server
//! metadata) over a single axum router mounted into the proxy.
//!
//! Redirect-URI handling is deliberately strict: an unknown client or a
//! redirect URI that is not an exact registered match gets a 400 and never a
//! redirect — redirecting an unvalidated URI is an open redirect.

use axum::{
    extract::{Form, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

use base64::Engine;
use mcp_compose_core::config::OAuthServerConfig;
use mcp_compose_core::utils::{generate_secure_token, SECURE_TOKEN_LENGTH};

use crate::audit::{AuditEvent, AuditLog};
use crate::clients::ClientRegistry;
use crate::error::AuthError;
use crate::pkce::verify_code_challenge;
use crate::store::TokenStore;
use crate::types::{
    scopes_subset, AccessToken, AuthorizationCode, AuthorizationServerMetadata, AuthorizeParams,
    ClientRegistrationRequest, IntrospectionResponse, OAuthClientRecord, OAuthErrorResponse,
    RefreshToken, TokenRequestForm, TokenResponse, UserInfoResponse,
};
use crate::{AuthResult, DEFAULT_USER_ID};

/// Authorization code length; 64 characters of alphanumeric entropy is well
/// above the 32-byte floor.
const CODE_LENGTH: usize = 64;

pub struct AuthorizationServer {
    config: OAuthServerConfig,
    clients: ClientRegistry,
    store: Arc<dyn TokenStore>,
    audit: Arc<AuditLog>,
}

impl AuthorizationServer {
    pub fn new(
        config: OAuthServerConfig,
        store: Arc<dyn TokenStore>,
        audit: Arc<AuditLog>,
    ) -> Self {
        let clients = ClientRegistry::new(&config.clients, config.dynamic_registration);
        Self {
            config,
            clients,
            store,
            audit,
        }
    }

    pub fn clients(&self) -> &ClientRegistry {
        &self.clients
    }

    pub fn store(&self) -> &Arc<dyn TokenStore> {
        &self.store
    }

    pub fn issuer(&self) -> &str {
        &self.config.issuer
    }

    /// The OAuth endpoints as a router to merge into the proxy.
    pub fn router(self: Arc<Self>) -> Router {
        Router::new()
            .route(
                "/.well-known/oauth-authorization-server",
                get(handle_metadata),
            )
            .route(
                "/oauth/authorize",
                get(handle_authorize_get).post(handle_authorize_post),
            )
            .route("/oauth/token", post(handle_token))
            .route("/oauth/register", post(handle_register))
            .route("/oauth/introspect", post(handle_introspect))
            .route("/oauth/revoke", post(handle_revoke))
            .route("/oauth/userinfo", get(handle_userinfo))
            .with_state(self)
    }

    pub fn metadata(&self) -> AuthorizationServerMetadata {
        let issuer = self.config.issuer.trim_end_matches('/');
        AuthorizationServerMetadata {
            issuer: issuer.to_string(),
            authorization_endpoint: format!("{issuer}/oauth/authorize"),
            token_endpoint: format!("{issuer}/oauth/token"),
            registration_endpoint: format!("{issuer}/oauth/register"),
            introspection_endpoint: format!("{issuer}/oauth/introspect"),
            revocation_endpoint: format!("{issuer}/oauth/revoke"),
            userinfo_endpoint: format!("{issuer}/oauth/userinfo"),
            response_types_supported: vec!["code".to_string()],
            grant_types_supported: vec![
                "authorization_code".to_string(),
                "client_credentials".to_string(),
                "refresh_token".to_string(),
            ],
            token_endpoint_auth_methods_supported: vec![
                "client_secret_basic".to_string(),
                "client_secret_post".to_string(),
                "none".to_string(),
            ],
            code_challenge_methods_supported: vec!["plain".to_string(), "S256".to_string()],
            scopes_supported: self.config.scopes_supported.clone(),
        }
    }

    fn scope_supported(&self, scope: &str) -> bool {
        scope
            .split_whitespace()
            .all(|s| self.config.scopes_supported.iter().any(|sup| sup == s))
    }

    fn mint_access(&self, client_id: &str, user_id: &str, scope: &str) -> AccessToken {
        let now = SystemTime::now();
        AccessToken {
            token: generate_secure_token(SECURE_TOKEN_LENGTH),
            client_id: client_id.to_string(),
            user_id: user_id.to_string(),
            scope: scope.to_string(),
            issued_at: now,
            expires_at: now + Duration::from_secs(self.config.access_token_ttl_secs),
            revoked: false,
        }
    }

    fn mint_refresh(&self, client_id: &str, user_id: &str, scope: &str) -> RefreshToken {
        RefreshToken {
            token: generate_secure_token(SECURE_TOKEN_LENGTH),
            client_id: client_id.to_string(),
            user_id: user_id.to_string(),
            scope: scope.to_string(),
            expires_at: SystemTime::now()
                + Duration::from_secs(self.config.refresh_token_ttl_secs),
            revoked: false,
            rotated_to: None,
        }
    }

    /// Validate an `/oauth/authorize` request and mint a code.
    ///
    /// The end user is the pluggable-consent placeholder [`DEFAULT_USER_ID`];
    /// production deployments front this with a real login step.
    async fn authorize(&self, params: &AuthorizeParams) -> Result<String, AuthorizeRejection> {
        let client = self
            .clients
            .get(&params.client_id)
            .await
            .ok_or(AuthorizeRejection::Direct(AuthError::InvalidClient(
                format!("unknown client: {}", params.client_id),
            )))?;

        // never redirect to an unregistered URI
        if !client.redirect_uri_allowed(&params.redirect_uri) {
            return Err(AuthorizeRejection::Direct(AuthError::InvalidRequest(
                "redirect_uri is not registered for this client".to_string(),
            )));
        }

        if params.response_type != "code" || !client.supports_response_type(&params.response_type)
        {
            return Err(AuthorizeRejection::Redirect(
                AuthError::UnsupportedResponseType(params.response_type.clone()),
            ));
        }

        let scope = params.scope.clone().unwrap_or_default();
        if !scope.is_empty() && !self.scope_supported(&scope) {
            return Err(AuthorizeRejection::Redirect(AuthError::InvalidScope(
                scope,
            )));
        }

        if client.public && params.code_challenge.is_none() {
            return Err(AuthorizeRejection::Redirect(AuthError::InvalidRequest(
                "public clients must send a code_challenge".to_string(),
            )));
        }

        let code = AuthorizationCode {
            code: generate_secure_token(CODE_LENGTH),
            client_id: client.client_id.clone(),
            user_id: DEFAULT_USER_ID.to_string(),
            redirect_uri: params.redirect_uri.clone(),
            scope,
            code_challenge: params.code_challenge.clone(),
            code_challenge_method: params
                .code_challenge_method
                .clone()
                .or_else(|| params.code_challenge.as_ref().map(|_| "plain".to_string())),
            expires_at: SystemTime::now() + Duration::from_secs(self.config.code_ttl_secs),
            used: false,
            issued_tokens: Vec::new(),
        };
        let value = code.code.clone();
        self.store
            .put_code(code)
            .await
            .map_err(AuthorizeRejection::Direct)?;
        Ok(value)
    }

    async fn exchange_authorization_code(
        &self,
        client: &OAuthClientRecord,
        form: &TokenRequestForm,
    ) -> AuthResult<TokenResponse> {
        let code_value = form
            .code
            .as_deref()
            .ok_or_else(|| AuthError::InvalidRequest("code is required".to_string()))?;

        let code = match self.store.consume_code(code_value).await {
            Ok(code) => code,
            Err(AuthError::CodeAlreadyUsed) => {
                // replay: defensively revoke whatever the first exchange got
                let revoked = self.store.revoke_code_tokens(code_value).await?;
                warn!(client = %client.client_id, revoked, "authorization code replay");
                self.audit.log(
                    AuditEvent::CodeReplayed,
                    "",
                    &client.client_id,
                    "",
                    "",
                    false,
                    serde_json::json!({ "revoked_tokens": revoked }),
                    Some("code replay"),
                );
                return Err(AuthError::CodeAlreadyUsed);
            }
            Err(e) => return Err(e),
        };

        if code.client_id != client.client_id {
            return Err(AuthError::InvalidGrant(
                "code was issued to a different client".to_string(),
            ));
        }
        match form.redirect_uri.as_deref() {
            Some(uri) if uri == code.redirect_uri => {}
            _ => {
                return Err(AuthError::InvalidGrant(
                    "redirect_uri does not match the authorization request".to_string(),
                ))
            }
        }

        if let Some(challenge) = &code.code_challenge {
            let verifier = form.code_verifier.as_deref().ok_or_else(|| {
                AuthError::InvalidGrant("code_verifier is required".to_string())
            })?;
            let method = code.code_challenge_method.as_deref().unwrap_or("plain");
            verify_code_challenge(verifier, challenge, method, client.allow_plain_pkce)?;
        }

        let access = self.mint_access(&client.client_id, &code.user_id, &code.scope);
        self.store.put_access(access.clone()).await?;
        let mut issued = vec![access.token.clone()];

        let refresh = if client.supports_grant("refresh_token") {
            let refresh = self.mint_refresh(&client.client_id, &code.user_id, &code.scope);
            self.store.put_refresh(refresh.clone()).await?;
            issued.push(refresh.token.clone());
            Some(refresh.token)
        } else {
            None
        };
        self.store.bind_code_tokens(code_value, &issued).await?;

        Ok(TokenResponse {
            access_token: access.token,
            token_type: "Bearer".to_string(),
            expires_in: self.config.access_token_ttl_secs,
            refresh_token: refresh,
            scope: access.scope,
        })
    }

    async fn exchange_client_credentials(
        &self,
        client: &OAuthClientRecord,
        form: &TokenRequestForm,
    ) -> AuthResult<TokenResponse> {
        if client.public {
            return Err(AuthError::UnauthorizedClient);
        }
        if !client.supports_grant("client_credentials") {
            return Err(AuthError::UnauthorizedClient);
        }
        let scope = form.scope.clone().unwrap_or_default();
        if !scope.is_empty() && !self.scope_supported(&scope) {
            return Err(AuthError::InvalidScope(scope));
        }
        if !client.scopes.is_empty() {
            let granted = client.scopes.join(" ");
            if !scopes_subset(&scope, &granted) {
                return Err(AuthError::InvalidScope(scope));
            }
        }

        // no user, no refresh token for machine credentials
        let access = self.mint_access(&client.client_id, "", &scope);
        self.store.put_access(access.clone()).await?;
        Ok(TokenResponse {
            access_token: access.token,
            token_type: "Bearer".to_string(),
            expires_in: self.config.access_token_ttl_secs,
            refresh_token: None,
            scope: access.scope,
        })
    }

    async fn exchange_refresh_token(
        &self,
        client: &OAuthClientRecord,
        form: &TokenRequestForm,
    ) -> AuthResult<TokenResponse> {
        if !client.supports_grant("refresh_token") {
            return Err(AuthError::UnauthorizedClient);
        }
        let presented = form
            .refresh_token
            .as_deref()
            .ok_or_else(|| AuthError::InvalidRequest("refresh_token is required".to_string()))?;

        let old = self
            .store
            .consume_refresh(presented, &client.client_id)
            .await?;

        let scope = match form.scope.as_deref() {
            Some(requested) if !requested.is_empty() => {
                if !scopes_subset(requested, &old.scope) {
                    return Err(AuthError::InvalidScope(requested.to_string()));
                }
                requested.to_string()
            }
            _ => old.scope.clone(),
        };

        let access = self.mint_access(&client.client_id, &old.user_id, &scope);
        self.store.put_access(access.clone()).await?;
        let next = self.mint_refresh(&client.client_id, &old.user_id, &old.scope);
        self.store.put_refresh(next.clone()).await?;
        self.store.mark_rotated(presented, &next.token).await?;

        Ok(TokenResponse {
            access_token: access.token,
            token_type: "Bearer".to_string(),
            expires_in: self.config.access_token_ttl_secs,
            refresh_token: Some(next.token),
            scope,
        })
    }

    async fn introspect(&self, token: &str) -> IntrospectionResponse {
        match self.store.get_access(token).await {
            Ok(access) => IntrospectionResponse {
                active: true,
                username: (!access.user_id.is_empty()).then(|| access.user_id.clone()),
                client_id: Some(access.client_id.clone()),
                scope: Some(access.scope.clone()),
                exp: Some(access.expires_at_unix()),
            },
            // inactive tokens reveal nothing, including why they are inactive
            Err(_) => IntrospectionResponse::inactive(),
        }
    }

    async fn revoke(&self, client: &OAuthClientRecord, token: &str) -> AuthResult<()> {
        if let Ok(access) = self.store.get_access(token).await {
            if access.client_id == client.client_id {
                self.store.revoke_access(token).await?;
            }
            return Ok(());
        }
        // not an access token (or already inactive); try refresh
        self.store.revoke_refresh(token).await?;
        Ok(())
    }
}

/// How an authorize failure is delivered: direct 400, or error redirect once
/// the redirect URI has been validated.
enum AuthorizeRejection {
    Direct(AuthError),
    Redirect(AuthError),
}

/// Client credentials from Basic auth or the form body; Basic wins when both
/// are present.
fn extract_client_credentials(
    headers: &HeaderMap,
    form: &TokenRequestForm,
) -> AuthResult<(String, Option<String>)> {
    if let Some(value) = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
    {
        if let Some(encoded) = value.strip_prefix("Basic ") {
            let decoded = base64::engine::general_purpose::STANDARD
                .decode(encoded.trim())
                .map_err(|_| {
                    AuthError::InvalidClient("malformed Basic credentials".to_string())
                })?;
            let decoded = String::from_utf8(decoded).map_err(|_| {
                AuthError::InvalidClient("malformed Basic credentials".to_string())
            })?;
            let (id, secret) = decoded.split_once(':').ok_or_else(|| {
                AuthError::InvalidClient("malformed Basic credentials".to_string())
            })?;
            return Ok((id.to_string(), Some(secret.to_string())));
        }
    }

    let client_id = form
        .client_id
        .clone()
        .ok_or_else(|| AuthError::InvalidClient("client_id is required".to_string()))?;
    Ok((client_id, form.client_secret.clone()))
}

fn client_ip(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(',').next().unwrap_or(v).trim().to_string())
        .unwrap_or_default()
}

fn user_agent(headers: &HeaderMap) -> String {
    headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

fn error_status(err: &AuthError) -> StatusCode {
    match err {
        AuthError::InvalidClient(_) | AuthError::MissingToken | AuthError::InvalidToken(_) => {
            StatusCode::UNAUTHORIZED
        }
        AuthError::ServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::BAD_REQUEST,
    }
}

fn oauth_error(err: &AuthError) -> Response {
    let body = OAuthErrorResponse {
        error: err.oauth_error_code().to_string(),
        error_description: Some(err.to_string()),
    };
    (error_status(err), Json(body)).into_response()
}

fn error_redirect(redirect_uri: &str, err: &AuthError, state: Option<&str>) -> Response {
    let mut target = format!(
        "{redirect_uri}{}error={}",
        if redirect_uri.contains('?') { "&" } else { "?" },
        urlencoding::encode(err.oauth_error_code())
    );
    if let Some(state) = state {
        target.push_str(&format!("&state={}", urlencoding::encode(state)));
    }
    found_redirect(&target)
}

/// 302 Found, the status OAuth flows conventionally use.
fn found_redirect(target: &str) -> Response {
    match target.parse::<axum::http::HeaderValue>() {
        Ok(location) => {
            (StatusCode::FOUND, [(header::LOCATION, location)]).into_response()
        }
        Err(_) => StatusCode::BAD_REQUEST.into_response(),
    }
}

async fn handle_metadata(
    State(server): State<Arc<AuthorizationServer>>,
) -> Json<AuthorizationServerMetadata> {
    Json(server.metadata())
}

async fn handle_authorize_get(
    State(server): State<Arc<AuthorizationServer>>,
    headers: HeaderMap,
    Query(params): Query<AuthorizeParams>,
) -> Response {
    handle_authorize(server, headers, params).await
}

async fn handle_authorize_post(
    State(server): State<Arc<AuthorizationServer>>,
    headers: HeaderMap,
    Form(params): Form<AuthorizeParams>,
) -> Response {
    handle_authorize(server, headers, params).await
}

async fn handle_authorize(
    server: Arc<AuthorizationServer>,
    headers: HeaderMap,
    params: AuthorizeParams,
) -> Response {
    let ip = client_ip(&headers);
    let agent = user_agent(&headers);
    match server.authorize(&params).await {
        Ok(code) => {
            server.audit.log(
                AuditEvent::AuthorizeGranted,
                DEFAULT_USER_ID,
                &params.client_id,
                &ip,
                &agent,
                true,
                serde_json::json!({ "scope": params.scope }),
                None,
            );
            let mut target = format!(
                "{}{}code={}",
                params.redirect_uri,
                if params.redirect_uri.contains('?') { "&" } else { "?" },
                urlencoding::encode(&code)
            );
            if let Some(state) = &params.state {
                target.push_str(&format!("&state={}", urlencoding::encode(state)));
            }
            found_redirect(&target)
        }
        Err(rejection) => {
            let err = match &rejection {
                AuthorizeRejection::Direct(e) | AuthorizeRejection::Redirect(e) => e.to_string(),
            };
            server.audit.log(
                AuditEvent::AuthorizeDenied,
                DEFAULT_USER_ID,
                &params.client_id,
                &ip,
                &agent,
                false,
                serde_json::Value::Null,
                Some(&err),
            );
            match rejection {
                AuthorizeRejection::Direct(e) => oauth_error(&e),
                AuthorizeRejection::Redirect(e) => {
                    error_redirect(&params.redirect_uri, &e, params.state.as_deref())
                }
            }
        }
    }
}

async fn handle_token(
    State(server): State<Arc<AuthorizationServer>>,
    headers: HeaderMap,
    Form(form): Form<TokenRequestForm>,
) -> Response {
    let ip = client_ip(&headers);
    let agent = user_agent(&headers);

    let result = async {
        let (client_id, client_secret) = extract_client_credentials(&headers, &form)?;
        let client = server
            .clients
            .authenticate(&client_id, client_secret.as_deref())
            .await?;

        match form.grant_type.as_str() {
            "authorization_code" => server.exchange_authorization_code(&client, &form).await,
            "client_credentials" => server.exchange_client_credentials(&client, &form).await,
            "refresh_token" => server.exchange_refresh_token(&client, &form).await,
            other => Err(AuthError::UnsupportedGrantType(other.to_string())),
        }
        .map(|response| (client.client_id.clone(), response))
    }
    .await;

    match result {
        Ok((client_id, response)) => {
            let event = if form.grant_type == "refresh_token" {
                AuditEvent::TokenRefreshed
            } else {
                AuditEvent::TokenIssued
            };
            server.audit.log(
                event,
                "",
                &client_id,
                &ip,
                &agent,
                true,
                serde_json::json!({ "grant_type": form.grant_type, "scope": response.scope }),
                None,
            );
            debug!(client = %client_id, grant = %form.grant_type, "token issued");
            (
                StatusCode::OK,
                [
                    (header::CACHE_CONTROL, "no-store"),
                    (header::PRAGMA, "no-cache"),
                ],
                Json(response),
            )
                .into_response()
        }
        Err(err) => {
            server.audit.log(
                AuditEvent::AuthFailure,
                "",
                form.client_id.as_deref().unwrap_or(""),
                &ip,
                &agent,
                false,
                serde_json::json!({ "grant_type": form.grant_type }),
                Some(&err.to_string()),
            );
            oauth_error(&err)
        }
    }
}

async fn handle_register(
    State(server): State<Arc<AuthorizationServer>>,
    headers: HeaderMap,
    Json(request): Json<ClientRegistrationRequest>,
) -> Response {
    match server.clients.register(request).await {
        Ok(response) => {
            server.audit.log(
                AuditEvent::ClientRegistered,
                "",
                &response.client_id,
                &client_ip(&headers),
                &user_agent(&headers),
                true,
                serde_json::json!({ "redirect_uris": response.redirect_uris }),
                None,
            );
            (StatusCode::CREATED, Json(response)).into_response()
        }
        Err(err) => oauth_error(&err),
    }
}

#[derive(Debug, Deserialize)]
struct IntrospectForm {
    token: String,
    #[serde(default)]
    client_id: Option<String>,
    #[serde(default)]
    client_secret: Option<String>,
}

async fn handle_introspect(
    State(server): State<Arc<AuthorizationServer>>,
    headers: HeaderMap,
    Form(form): Form<IntrospectForm>,
) -> Response {
    let token_form = TokenRequestForm {
        grant_type: String::new(),
        code: None,
        redirect_uri: None,
        client_id: form.client_id.clone(),
        client_secret: form.client_secret.clone(),
        code_verifier: None,
        refresh_token: None,
        scope: None,
    };
    let authenticated = match extract_client_credentials(&headers, &token_form) {
        Ok((id, secret)) => server.clients.authenticate(&id, secret.as_deref()).await,
        Err(e) => Err(e),
    };
    let client = match authenticated {
        Ok(client) => client,
        Err(err) => return oauth_error(&err),
    };

    let response = server.introspect(&form.token).await;
    server.audit.log(
        AuditEvent::TokenIntrospected,
        "",
        &client.client_id,
        &client_ip(&headers),
        &user_agent(&headers),
        response.active,
        serde_json::Value::Null,
        None,
    );
    Json(response).into_response()
}

#[derive(Debug, Deserialize)]
struct RevokeForm {
    token: String,
    #[serde(default)]
    client_id: Option<String>,
    #[serde(default)]
    client_secret: Option<String>,
}

async fn handle_revoke(
    State(server): State<Arc<AuthorizationServer>>,
    headers: HeaderMap,
    Form(form): Form<RevokeForm>,
) -> Response {
    let token_form = TokenRequestForm {
        grant_type: String::new(),
        code: None,
        redirect_uri: None,
        client_id: form.client_id.clone(),
        client_secret: form.client_secret.clone(),
        code_verifier: None,
        refresh_token: None,
        scope: None,
    };
    let authenticated = match extract_client_credentials(&headers, &token_form) {
        Ok((id, secret)) => server.clients.authenticate(&id, secret.as_deref()).await,
        Err(e) => Err(e),
    };
    let client = match authenticated {
        Ok(client) => client,
        Err(err) => return oauth_error(&err),
    };

    match server.revoke(&client, &form.token).await {
        Ok(()) => {
            server.audit.log(
                AuditEvent::TokenRevoked,
                "",
                &client.client_id,
                &client_ip(&headers),
                &user_agent(&headers),
                true,
                serde_json::Value::Null,
                None,
            );
            StatusCode::OK.into_response()
        }
        Err(err) => oauth_error(&err),
    }
}

async fn handle_userinfo(
    State(server): State<Arc<AuthorizationServer>>,
    headers: HeaderMap,
) -> Response {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim);
    let token = match token {
        Some(token) if !token.is_empty() => token,
        _ => return oauth_error(&AuthError::MissingToken),
    };
    match server.store.get_access(token).await {
        Ok(access) => {
            info!(client = %access.client_id, "userinfo lookup");
            Json(UserInfoResponse {
                sub: access.user_id,
                client_id: access.client_id,
                scope: access.scope,
            })
            .into_response()
        }
        Err(err) => oauth_error(&err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryTokenStore;
    use mcp_compose_core::config::{AuditConfig, StaticClientConfig};

    fn test_server(clients: Vec<StaticClientConfig>) -> Arc<AuthorizationServer> {
        let config = OAuthServerConfig {
            clients,
            ..Default::default()
        };
        Arc::new(AuthorizationServer::new(
            config,
            Arc::new(MemoryTokenStore::new()),
            Arc::new(AuditLog::new(AuditConfig::default())),
        ))
    }

    fn public_client() -> StaticClientConfig {
        StaticClientConfig {
            client_id: "pub1".to_string(),
            client_secret: None,
            redirect_uris: vec!["http://c/cb".to_string()],
            grant_types: vec![
                "authorization_code".to_string(),
                "refresh_token".to_string(),
            ],
            scopes: Vec::new(),
            allow_plain_pkce: false,
        }
    }

    fn authorize_params() -> AuthorizeParams {
        AuthorizeParams {
            response_type: "code".to_string(),
            client_id: "pub1".to_string(),
            redirect_uri: "http://c/cb".to_string(),
            scope: Some("mcp:tools".to_string()),
            state: Some("xyz".to_string()),
            code_challenge: Some("E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM".to_string()),
            code_challenge_method: Some("S256".to_string()),
        }
    }

    #[tokio::test]
    async fn authorize_mints_code() {
        let server = test_server(vec![public_client()]);
        let code = server.authorize(&authorize_params()).await;
        assert!(code.is_ok());
    }

    #[tokio::test]
    async fn authorize_rejects_unregistered_redirect_without_redirecting() {
        let server = test_server(vec![public_client()]);
        let mut params = authorize_params();
        params.redirect_uri = "http://evil/cb".to_string();
        match server.authorize(&params).await {
            Err(AuthorizeRejection::Direct(AuthError::InvalidRequest(_))) => {}
            other => panic!("expected direct rejection, got {:?}", other.is_ok()),
        }
    }

    #[tokio::test]
    async fn authorize_requires_pkce_for_public_clients() {
        let server = test_server(vec![public_client()]);
        let mut params = authorize_params();
        params.code_challenge = None;
        params.code_challenge_method = None;
        assert!(matches!(
            server.authorize(&params).await,
            Err(AuthorizeRejection::Redirect(AuthError::InvalidRequest(_)))
        ));
    }

    #[tokio::test]
    async fn authorize_rejects_unknown_scope_via_redirect() {
        let server = test_server(vec![public_client()]);
        let mut params = authorize_params();
        params.scope = Some("mcp:launch-missiles".to_string());
        assert!(matches!(
            server.authorize(&params).await,
            Err(AuthorizeRejection::Redirect(AuthError::InvalidScope(_)))
        ));
    }

    #[tokio::test]
    async fn full_code_exchange_with_pkce() {
        let server = test_server(vec![public_client()]);
        let code = server.authorize(&authorize_params()).await;
        let code = match code {
            Ok(c) => c,
            Err(_) => panic!("authorize failed"),
        };
        let client = server.clients.get("pub1").await.unwrap();
        let form = TokenRequestForm {
            grant_type: "authorization_code".to_string(),
            code: Some(code),
            redirect_uri: Some("http://c/cb".to_string()),
            client_id: Some("pub1".to_string()),
            client_secret: None,
            code_verifier: Some("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk".to_string()),
            refresh_token: None,
            scope: None,
        };
        let response = server
            .exchange_authorization_code(&client, &form)
            .await
            .unwrap();
        assert_eq!(response.token_type, "Bearer");
        assert!(response.refresh_token.is_some());
        assert_eq!(response.scope, "mcp:tools");

        // token is live
        let introspection = server.introspect(&response.access_token).await;
        assert!(introspection.active);
        assert_eq!(introspection.username.as_deref(), Some(DEFAULT_USER_ID));
    }

    #[tokio::test]
    async fn wrong_verifier_fails_exchange() {
        let server = test_server(vec![public_client()]);
        let code = match server.authorize(&authorize_params()).await {
            Ok(c) => c,
            Err(_) => panic!("authorize failed"),
        };
        let client = server.clients.get("pub1").await.unwrap();
        let form = TokenRequestForm {
            grant_type: "authorization_code".to_string(),
            code: Some(code),
            redirect_uri: Some("http://c/cb".to_string()),
            client_id: Some("pub1".to_string()),
            client_secret: None,
            code_verifier: Some("wrong-verifier-wrong-verifier-wrong-verifier-123".to_string()),
            refresh_token: None,
            scope: None,
        };
        assert_eq!(
            server
                .exchange_authorization_code(&client, &form)
                .await
                .unwrap_err(),
            AuthError::PkceChallengeFailed
        );
    }

    #[tokio::test]
    async fn client_credentials_denied_for_public_client() {
        let server = test_server(vec![public_client()]);
        let client = server.clients.get("pub1").await.unwrap();
        let form = TokenRequestForm {
            grant_type: "client_credentials".to_string(),
            code: None,
            redirect_uri: None,
            client_id: Some("pub1".to_string()),
            client_secret: None,
            code_verifier: None,
            refresh_token: None,
            scope: None,
        };
        assert_eq!(
            server
                .exchange_client_credentials(&client, &form)
                .await
                .unwrap_err(),
            AuthError::UnauthorizedClient
        );
    }

    #[test]
    fn basic_credentials_take_precedence() {
        let mut headers = HeaderMap::new();
        let encoded = base64::engine::general_purpose::STANDARD.encode("basic-id:basic-secret");
        headers.insert(
            header::AUTHORIZATION,
            format!("Basic {encoded}").parse().unwrap(),
        );
        let form = TokenRequestForm {
            grant_type: "authorization_code".to_string(),
            code: None,
            redirect_uri: None,
            client_id: Some("form-id".to_string()),
            client_secret: Some("form-secret".to_string()),
            code_verifier: None,
            refresh_token: None,
            scope: None,
        };
        let (id, secret) = extract_client_credentials(&headers, &form).unwrap();
        assert_eq!(id, "basic-id");
        assert_eq!(secret.as_deref(), Some("basic-secret"));
    }

    #[test]
    fn metadata_lists_grants_and_methods() {
        let server = test_server(vec![]);
        let metadata = server.metadata();
        assert!(metadata
            .grant_types_supported
            .contains(&"refresh_token".to_string()));
        assert!(metadata
            .code_challenge_methods_supported
            .contains(&"S256".to_string()));
        assert!(metadata.token_endpoint.ends_with("/oauth/token"));
    }
}
