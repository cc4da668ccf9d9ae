//! Records owned by the authorization server and token store, plus the wire
//! DTOs of the OAuth endpoints (RFC 6749/7591/7662/8414 shapes).

use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// A registered OAuth client, static or dynamically registered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthClientRecord {
    pub client_id: String,

    /// Absent for public clients, which must use PKCE.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,

    pub redirect_uris: Vec<String>,

    pub grant_types: Vec<String>,

    pub response_types: Vec<String>,

    /// Scopes this client may request; empty means any server-supported
    /// scope.
    #[serde(default)]
    pub scopes: Vec<String>,

    pub token_endpoint_auth_method: String,

    pub public: bool,

    /// Whether the `plain` PKCE method is honored for this client.
    #[serde(default)]
    pub allow_plain_pkce: bool,

    pub issued_at: u64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret_expires_at: Option<u64>,
}

impl OAuthClientRecord {
    pub fn supports_grant(&self, grant: &str) -> bool {
        self.grant_types.iter().any(|g| g == grant)
    }

    pub fn supports_response_type(&self, response_type: &str) -> bool {
        self.response_types.iter().any(|r| r == response_type)
    }

    /// Exact string match against the registered list. Prefix and pattern
    /// matching are rejected outright (open-redirect risk).
    pub fn redirect_uri_allowed(&self, uri: &str) -> bool {
        self.redirect_uris.iter().any(|r| r == uri)
    }
}

/// One-shot authorization code.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthorizationCode {
    pub code: String,
    pub client_id: String,
    pub user_id: String,
    pub redirect_uri: String,
    pub scope: String,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
    pub expires_at: SystemTime,
    pub used: bool,
    /// Access tokens minted from this code, revoked defensively on replay.
    pub issued_tokens: Vec<String>,
}

impl AuthorizationCode {
    pub fn is_expired(&self) -> bool {
        SystemTime::now() > self.expires_at
    }
}

/// Bearer access token record.
#[derive(Debug, Clone, PartialEq)]
pub struct AccessToken {
    pub token: String,
    pub client_id: String,
    /// Empty for client-credentials tokens.
    pub user_id: String,
    pub scope: String,
    pub issued_at: SystemTime,
    pub expires_at: SystemTime,
    pub revoked: bool,
}

impl AccessToken {
    pub fn is_expired(&self) -> bool {
        SystemTime::now() > self.expires_at
    }

    pub fn is_active(&self) -> bool {
        !self.revoked && !self.is_expired()
    }

    pub fn expires_at_unix(&self) -> u64 {
        self.expires_at
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
            .as_secs()
    }
}

/// Refresh token record, bound to the issuing client.
#[derive(Debug, Clone, PartialEq)]
pub struct RefreshToken {
    pub token: String,
    pub client_id: String,
    pub user_id: String,
    pub scope: String,
    pub expires_at: SystemTime,
    pub revoked: bool,
    /// Successor minted when this token was rotated; revoked if this token
    /// is replayed.
    pub rotated_to: Option<String>,
}

impl RefreshToken {
    pub fn is_expired(&self) -> bool {
        SystemTime::now() > self.expires_at
    }
}

/// `/oauth/token` success body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub scope: String,
}

/// `/oauth/token` and `/oauth/authorize` error body (RFC 6749 §5.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

/// `/oauth/introspect` body (RFC 7662). Inactive tokens expose nothing but
/// `active: false`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct IntrospectionResponse {
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<u64>,
}

impl IntrospectionResponse {
    pub fn inactive() -> Self {
        Self::default()
    }
}

/// `/.well-known/oauth-authorization-server` body (RFC 8414).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationServerMetadata {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub registration_endpoint: String,
    pub introspection_endpoint: String,
    pub revocation_endpoint: String,
    pub userinfo_endpoint: String,
    pub response_types_supported: Vec<String>,
    pub grant_types_supported: Vec<String>,
    pub token_endpoint_auth_methods_supported: Vec<String>,
    pub code_challenge_methods_supported: Vec<String>,
    pub scopes_supported: Vec<String>,
}

/// Dynamic client registration request (RFC 7591).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientRegistrationRequest {
    pub redirect_uris: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_endpoint_auth_method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grant_types: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_types: Option<Vec<String>>,
}

/// Dynamic client registration response (RFC 7591).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientRegistrationResponse {
    pub client_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    pub client_id_issued_at: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret_expires_at: Option<u64>,
    pub redirect_uris: Vec<String>,
    pub grant_types: Vec<String>,
    pub response_types: Vec<String>,
    pub token_endpoint_auth_method: String,
}

/// `/oauth/userinfo` body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserInfoResponse {
    pub sub: String,
    pub client_id: String,
    pub scope: String,
}

/// Split a space-separated scope string.
pub fn split_scopes(scope: &str) -> Vec<&str> {
    scope.split_whitespace().collect()
}

/// Whether `requested` is a subset of `granted` (both space-separated).
pub fn scopes_subset(requested: &str, granted: &str) -> bool {
    let granted: Vec<&str> = split_scopes(granted);
    split_scopes(requested).iter().all(|s| granted.contains(s))
}

/// Form parameters accepted by `/oauth/token`. Unknown keys are ignored per
/// RFC 6749.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenRequestForm {
    #[serde(default)]
    pub grant_type: String,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub redirect_uri: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub code_verifier: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

/// Parameters of `/oauth/authorize` (query on GET, form on POST).
#[derive(Debug, Clone, Deserialize)]
pub struct AuthorizeParams {
    pub response_type: String,
    pub client_id: String,
    pub redirect_uri: String,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub code_challenge: Option<String>,
    #[serde(default)]
    pub code_challenge_method: Option<String>,
}
