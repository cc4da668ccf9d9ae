//! Docker and Podman runtimes, driven through their CLIs.
//!
//! The two CLIs are flag-compatible for everything this crate needs, so both
//! runtimes share one driver parameterized by binary name. Container names
//! are prefixed with the project so fleets can coexist on one daemon.

use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

use mcp_compose_core::config::ServerConfig;

use crate::{ContainerRuntime, ContainerStatus, Result, RuntimeError};

struct CliDriver {
    binary: &'static str,
    project: String,
}

impl CliDriver {
    fn container_name(&self, server: &str) -> String {
        format!("{}-{}", self.project, server)
    }

    async fn run(&self, args: &[String]) -> Result<String> {
        debug!(binary = self.binary, ?args, "runtime command");
        let output = Command::new(self.binary)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await?;
        if !output.status.success() {
            return Err(RuntimeError::CommandFailed {
                command: format!("{} {}", self.binary, args.join(" ")),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Best-effort command whose failure is expected (e.g. removing a
    /// container that does not exist).
    async fn run_quiet(&self, args: &[String]) {
        let _ = Command::new(self.binary)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;
    }

    fn run_args(&self, name: &str, config: &ServerConfig) -> Vec<String> {
        let container = self.container_name(name);
        let mut args: Vec<String> = vec![
            "run".into(),
            "-d".into(),
            "--name".into(),
            container,
            "--label".into(),
            format!("mcp-compose.project={}", self.project),
        ];
        for (key, value) in &config.env {
            args.push("-e".into());
            args.push(format!("{key}={value}"));
        }
        for binding in &config.ports {
            args.push("-p".into());
            args.push(binding.clone());
        }
        for network in &config.networks {
            args.push("--network".into());
            args.push(network.clone());
        }
        if let Some(limits) = &config.resources {
            if let Some(memory) = &limits.memory {
                args.push("--memory".into());
                args.push(memory.clone());
            }
            if let Some(cpus) = &limits.cpus {
                args.push("--cpus".into());
                args.push(cpus.clone());
            }
            if let Some(pids) = limits.pids {
                args.push("--pids-limit".into());
                args.push(pids.to_string());
            }
        }
        if let Some(security) = &config.security {
            for cap in &security.cap_drop {
                args.push("--cap-drop".into());
                args.push(cap.clone());
            }
            for cap in &security.cap_add {
                args.push("--cap-add".into());
                args.push(cap.clone());
            }
            if security.read_only_root {
                args.push("--read-only".into());
            }
            if let Some(user) = &security.user {
                args.push("--user".into());
                args.push(user.clone());
            }
            if let Some(profile) = &security.seccomp_profile {
                args.push("--security-opt".into());
                args.push(format!("seccomp={profile}"));
            }
            if let Some(profile) = &security.apparmor_profile {
                args.push("--security-opt".into());
                args.push(format!("apparmor={profile}"));
            }
        }
        if let Some(image) = &config.image {
            args.push(image.clone());
        }
        if let Some(command) = &config.command {
            args.push(command.clone());
        }
        args.extend(config.args.iter().cloned());
        args
    }
}

#[async_trait]
impl ContainerRuntime for CliDriver {
    async fn start(&self, name: &str, config: &ServerConfig) -> Result<()> {
        let container = self.container_name(name);
        // a stale container with the same name blocks `run`
        self.run_quiet(&["rm".into(), "-f".into(), container.clone()])
            .await;
        self.run(&self.run_args(name, config)).await?;
        info!(server = %name, container = %container, "container started");
        Ok(())
    }

    async fn stop(&self, name: &str) -> Result<()> {
        let container = self.container_name(name);
        self.run(&["stop".into(), container.clone()]).await?;
        self.run_quiet(&["rm".into(), container]).await;
        info!(server = %name, "container stopped");
        Ok(())
    }

    async fn status(&self, name: &str) -> Result<ContainerStatus> {
        let container = self.container_name(name);
        let result = self
            .run(&[
                "inspect".into(),
                "--format".into(),
                "{{.State.Status}}".into(),
                container,
            ])
            .await;
        match result {
            Ok(status) => Ok(match status.as_str() {
                "running" => ContainerStatus::Running,
                "exited" | "dead" | "created" => ContainerStatus::Exited,
                other => ContainerStatus::Unknown(other.to_string()),
            }),
            Err(RuntimeError::CommandFailed { .. }) => Ok(ContainerStatus::NotCreated),
            Err(e) => Err(e),
        }
    }

    async fn logs(&self, name: &str, follow: bool, tail: Option<usize>) -> Result<()> {
        let container = self.container_name(name);
        let mut args: Vec<String> = vec!["logs".into()];
        if follow {
            args.push("--follow".into());
        }
        if let Some(tail) = tail {
            args.push("--tail".into());
            args.push(tail.to_string());
        }
        args.push(container);
        let status = Command::new(self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .await?;
        if !status.success() {
            return Err(RuntimeError::NotFound(name.to_string()));
        }
        Ok(())
    }

    async fn exec(&self, name: &str, command: &[String]) -> Result<String> {
        let container = self.container_name(name);
        let mut args: Vec<String> = vec!["exec".into(), container];
        args.extend(command.iter().cloned());
        self.run(&args).await
    }

    async fn ensure_network(&self, name: &str) -> Result<()> {
        let exists = self
            .run(&[
                "network".into(),
                "inspect".into(),
                "--format".into(),
                "{{.Name}}".into(),
                name.to_string(),
            ])
            .await
            .is_ok();
        if !exists {
            self.run(&["network".into(), "create".into(), name.to_string()])
                .await?;
            info!(network = %name, "network created");
        }
        Ok(())
    }

    async fn remove_network(&self, name: &str) -> Result<()> {
        self.run_quiet(&["network".into(), "rm".into(), name.to_string()])
            .await;
        Ok(())
    }
}

macro_rules! delegate_runtime {
    ($wrapper:ident) => {
        #[async_trait]
        impl ContainerRuntime for $wrapper {
            async fn start(&self, name: &str, config: &ServerConfig) -> Result<()> {
                self.driver.start(name, config).await
            }
            async fn stop(&self, name: &str) -> Result<()> {
                self.driver.stop(name).await
            }
            async fn status(&self, name: &str) -> Result<ContainerStatus> {
                self.driver.status(name).await
            }
            async fn logs(&self, name: &str, follow: bool, tail: Option<usize>) -> Result<()> {
                self.driver.logs(name, follow, tail).await
            }
            async fn exec(&self, name: &str, command: &[String]) -> Result<String> {
                self.driver.exec(name, command).await
            }
            async fn ensure_network(&self, name: &str) -> Result<()> {
                self.driver.ensure_network(name).await
            }
            async fn remove_network(&self, name: &str) -> Result<()> {
                self.driver.remove_network(name).await
            }
        }
    };
}

pub struct DockerRuntime {
    driver: CliDriver,
}

impl DockerRuntime {
    pub fn new(project: impl Into<String>) -> Self {
        Self {
            driver: CliDriver {
                binary: "docker",
                project: project.into(),
            },
        }
    }
}

pub struct PodmanRuntime {
    driver: CliDriver,
}

impl PodmanRuntime {
    pub fn new(project: impl Into<String>) -> Self {
        Self {
            driver: CliDriver {
                binary: "podman",
                project: project.into(),
            },
        }
    }
}

delegate_runtime!(DockerRuntime);
delegate_runtime!(PodmanRuntime);

#[cfg(test)]
mod tests {
    use super::*;
    use mcp_compose_core::config::{ResourceLimits, SecurityConfig, TransportKind};

    fn server() -> ServerConfig {
        ServerConfig {
            transport: TransportKind::Http,
            image: Some("example/weather:1".to_string()),
            build: None,
            command: None,
            args: vec!["--port".to_string(), "8080".to_string()],
            env: [("MODE".to_string(), "prod".to_string())].into(),
            ports: vec!["8081:8080".to_string()],
            networks: vec!["mcp-net".to_string()],
            endpoint: Some("http://localhost:8081".to_string()),
            resources: Some(ResourceLimits {
                memory: Some("512m".to_string()),
                cpus: Some("0.5".to_string()),
                pids: None,
            }),
            security: Some(SecurityConfig {
                cap_drop: vec!["ALL".to_string()],
                cap_add: vec![],
                read_only_root: true,
                user: Some("1000".to_string()),
                seccomp_profile: None,
                apparmor_profile: None,
            }),
            healthcheck: None,
            authentication: Default::default(),
            depends_on: vec![],
        }
    }

    #[test]
    fn run_args_carry_manifest_fields() {
        let driver = CliDriver {
            binary: "docker",
            project: "demo".to_string(),
        };
        let args = driver.run_args("weather", &server());
        let joined = args.join(" ");
        assert!(joined.contains("--name demo-weather"));
        assert!(joined.contains("-e MODE=prod"));
        assert!(joined.contains("-p 8081:8080"));
        assert!(joined.contains("--network mcp-net"));
        assert!(joined.contains("--memory 512m"));
        assert!(joined.contains("--cap-drop ALL"));
        assert!(joined.contains("--read-only"));
        assert!(joined.contains("--user 1000"));
        assert!(joined.ends_with("example/weather:1 --port 8080"));
    }

    #[test]
    fn container_names_are_project_scoped() {
        let docker = DockerRuntime::new("proj");
        assert_eq!(docker.driver.container_name("a"), "proj-a");
        let podman = PodmanRuntime::new("proj");
        assert_eq!(podman.driver.binary, "podman");
    }
}
