//! Authentication and authorization errors.

use thiserror::Error;

/// Errors across the token store, authorization server, and middleware.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("invalid client: {0}")]
    InvalidClient(String),

    #[error("invalid grant: {0}")]
    InvalidGrant(String),

    #[error("unauthorized client")]
    UnauthorizedClient,

    #[error("unsupported grant type: {0}")]
    UnsupportedGrantType(String),

    #[error("unsupported response type: {0}")]
    UnsupportedResponseType(String),

    #[error("invalid scope: {0}")]
    InvalidScope(String),

    #[error("missing token")]
    MissingToken,

    #[error("invalid token: {0}")]
    InvalidToken(String),

    #[error("token expired")]
    TokenExpired,

    #[error("token revoked")]
    TokenRevoked,

    #[error("authorization code already used")]
    CodeAlreadyUsed,

    #[error("not found")]
    NotFound,

    #[error("missing required scope: {scope}")]
    MissingScope { scope: String },

    #[error("PKCE verification failed")]
    PkceChallengeFailed,

    #[error("registration disabled")]
    RegistrationDisabled,

    #[error("server error: {0}")]
    ServerError(String),
}

impl AuthError {
    /// RFC 6749 error code for the token/authorize endpoints.
    pub fn oauth_error_code(&self) -> &'static str {
        match self {
            AuthError::InvalidRequest(_) => "invalid_request",
            AuthError::InvalidClient(_) => "invalid_client",
            AuthError::InvalidGrant(_)
            | AuthError::CodeAlreadyUsed
            | AuthError::PkceChallengeFailed
            | AuthError::TokenExpired
            | AuthError::TokenRevoked
            | AuthError::NotFound => "invalid_grant",
            AuthError::UnauthorizedClient => "unauthorized_client",
            AuthError::UnsupportedGrantType(_) => "unsupported_grant_type",
            AuthError::UnsupportedResponseType(_) => "unsupported_response_type",
            AuthError::InvalidScope(_) => "invalid_scope",
            AuthError::MissingScope { .. } => "insufficient_scope",
            AuthError::MissingToken | AuthError::InvalidToken(_) => "invalid_token",
            AuthError::RegistrationDisabled => "invalid_request",
            AuthError::ServerError(_) => "server_error",
        }
    }
}
