//! # mcp-compose
//!
//! One crate pulling the whole system together: give it a manifest and you
//! get dependency-ordered container lifecycle, a protocol-bridging reverse
//! proxy over every MCP transport, and an OAuth 2.1 authorization server
//! guarding the single origin.
//!
//! Library users embed the pieces directly:
//!
//! ```rust,no_run
//! use mcp_compose::prelude::*;
//! use std::path::PathBuf;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ComposeConfig::load(&PathBuf::from("mcp-compose.yaml"))?;
//!     let mut proxy = ProxyServer::new(
//!         config,
//!         PathBuf::from("mcp-compose.yaml"),
//!         ProxySettings::from_env(),
//!     );
//!     proxy.start().await?;
//!     proxy.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! Operators use the `mcp-compose` binary from `mcp-compose-cli` instead.

pub use mcp_compose_auth as auth;
pub use mcp_compose_core as core;
pub use mcp_compose_proxy as proxy;
pub use mcp_compose_runtime as runtime;
pub use mcp_compose_session as session;

pub mod prelude {
    //! The commonly used surface in one import.

    pub use mcp_compose_auth::{
        AuditLog, AuthMiddleware, AuthorizationServer, MemoryTokenStore, TokenStore,
    };
    pub use mcp_compose_core::{ComposeConfig, ComposeError, ComposeResult, ServerConfig};
    pub use mcp_compose_proxy::{ProxyServer, ProxySettings};
    pub use mcp_compose_runtime::{
        ContainerRuntime, DockerRuntime, LifecycleScheduler, NullRuntime, PodmanRuntime,
    };
    pub use mcp_compose_session::{BackendSession, SessionManager, SessionState};
}
