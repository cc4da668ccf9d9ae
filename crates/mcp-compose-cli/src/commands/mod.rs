//! Command implementations. Each submodule follows the same
//! `execute(&Cli, &Args)` convention.

pub mod completion;
pub mod create_config;
pub mod down;
pub mod logs;
pub mod ls;
pub mod proxy;
pub mod reload;
pub mod restart;
pub mod up;
pub mod validate;

pub use completion::CompletionArgs;
pub use create_config::CreateConfigArgs;
pub use down::DownArgs;
pub use logs::LogsArgs;
pub use ls::LsArgs;
pub use proxy::ProxyArgs;
pub use reload::ReloadArgs;
pub use up::UpArgs;
pub use validate::ValidateArgs;

use anyhow::{bail, Context, Result};
use std::sync::Arc;

use mcp_compose_core::config::ComposeConfig;
use mcp_compose_runtime::{ContainerRuntime, DockerRuntime, PodmanRuntime};

use crate::Cli;

/// Load and validate the manifest named by `--file`.
pub fn load_manifest(cli: &Cli) -> Result<ComposeConfig> {
    ComposeConfig::load(&cli.file)
        .with_context(|| format!("loading manifest {}", cli.file.display()))
}

/// Resolve the `--runtime` flag to a container runtime.
pub fn select_runtime(cli: &Cli) -> Result<Arc<dyn ContainerRuntime>> {
    match cli.runtime.as_str() {
        "docker" => Ok(Arc::new(DockerRuntime::new(cli.project.clone()))),
        "podman" => Ok(Arc::new(PodmanRuntime::new(cli.project.clone()))),
        other => bail!("unknown runtime '{other}' (expected docker or podman)"),
    }
}
