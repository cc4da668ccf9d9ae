//! # mcp-compose runtime
//!
//! The container-runtime seam and the lifecycle scheduler. The scheduler
//! levels the manifest's `depends_on` graph and drives any
//! [`ContainerRuntime`] implementation; Docker and Podman are driven through
//! their CLIs, and [`NullRuntime`] records calls for tests and dry runs.

pub mod cli_driver;
pub mod lifecycle;
pub mod null;

pub use cli_driver::{DockerRuntime, PodmanRuntime};
pub use lifecycle::{compute_levels, LevelPlan, LifecycleScheduler, LifecycleSummary};
pub use null::NullRuntime;

use async_trait::async_trait;
use thiserror::Error;

use mcp_compose_core::config::ServerConfig;

/// Result type for runtime operations.
pub type Result<T> = std::result::Result<T, RuntimeError>;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("container command failed: {command}: {stderr}")]
    CommandFailed { command: String, stderr: String },

    #[error("container not found: {0}")]
    NotFound(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Observed container state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerStatus {
    Running,
    Exited,
    NotCreated,
    Unknown(String),
}

impl std::fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContainerStatus::Running => write!(f, "running"),
            ContainerStatus::Exited => write!(f, "exited"),
            ContainerStatus::NotCreated => write!(f, "not created"),
            ContainerStatus::Unknown(s) => write!(f, "{s}"),
        }
    }
}

/// The capability set the scheduler and CLI drive. Implementations may be
/// added without touching callers.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Materialize and start one server's container.
    async fn start(&self, name: &str, config: &ServerConfig) -> Result<()>;

    async fn stop(&self, name: &str) -> Result<()>;

    async fn status(&self, name: &str) -> Result<ContainerStatus>;

    /// Stream container logs to the operator's terminal.
    async fn logs(&self, name: &str, follow: bool, tail: Option<usize>) -> Result<()>;

    /// Run a command inside the container, returning stdout.
    async fn exec(&self, name: &str, command: &[String]) -> Result<String>;

    async fn ensure_network(&self, name: &str) -> Result<()>;

    async fn remove_network(&self, name: &str) -> Result<()>;
}
