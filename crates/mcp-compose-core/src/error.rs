//! Error taxonomy shared across the workspace.
//!
//! The kinds mirror how errors are recovered: configuration problems abort
//! startup, transport problems degrade a session and retry, protocol problems
//! force a re-handshake, auth problems surface to the caller, and container
//! problems are reported in the lifecycle summary without stopping peers.

use thiserror::Error;

/// Canonical result type for compose operations.
pub type ComposeResult<T> = Result<T, ComposeError>;

#[derive(Debug, Error)]
pub enum ComposeError {
    /// Manifest is invalid or unreadable; the process refuses to start.
    #[error("config error: {0}")]
    Config(String),

    /// I/O failure talking to a backend; the session is marked degraded and
    /// reconnected with backoff.
    #[error("transport error: {0}")]
    Transport(String),

    /// Well-formed I/O carrying a malformed or incompatible payload; the
    /// session is closed and re-handshaken.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A call exceeded its deadline. Never retried implicitly.
    #[error("timeout after {0:?}")]
    Timeout(std::time::Duration),

    /// Authentication or authorization failure, surfaced to the caller.
    #[error("auth error: {0}")]
    Auth(String),

    /// Per-session inflight cap exceeded.
    #[error("rate limited: {0}")]
    RateLimit(String),

    /// Container runtime failure for one server; peers continue.
    #[error("container error for '{server}': {message}")]
    Container { server: String, message: String },

    /// A background task did not stop within its drain window.
    #[error("shutdown timed out after {0:?}")]
    ShutdownTimeout(std::time::Duration),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ComposeError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    pub fn container(server: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Container {
            server: server.into(),
            message: message.into(),
        }
    }

    /// Whether the session manager may recover from this error locally.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Protocol(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recoverable_kinds() {
        assert!(ComposeError::transport("broken pipe").is_recoverable());
        assert!(ComposeError::protocol("bad frame").is_recoverable());
        assert!(!ComposeError::config("bad yaml").is_recoverable());
        assert!(!ComposeError::Timeout(std::time::Duration::from_secs(1)).is_recoverable());
    }

    #[test]
    fn container_error_names_server() {
        let err = ComposeError::container("weather", "image not found");
        assert!(err.to_string().contains("weather"));
    }
}
