//! A runtime that starts nothing. Used by tests and `--dry-run` style
//! validation; it records every call so ordering assertions are possible.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Mutex;

use mcp_compose_core::config::ServerConfig;

use crate::{ContainerRuntime, ContainerStatus, Result, RuntimeError};

#[derive(Default)]
pub struct NullRuntime {
    calls: Mutex<Vec<String>>,
    running: Mutex<HashSet<String>>,
    /// Servers whose `start` should fail, for failure-path tests.
    fail_on_start: Mutex<HashSet<String>>,
}

impl NullRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_start(&self, name: &str) {
        self.fail_on_start
            .lock()
            .expect("null runtime lock")
            .insert(name.to_string());
    }

    /// Every call, in order, as `"verb name"` strings.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("null runtime lock").clone()
    }

    fn record(&self, verb: &str, name: &str) {
        self.calls
            .lock()
            .expect("null runtime lock")
            .push(format!("{verb} {name}"));
    }
}

#[async_trait]
impl ContainerRuntime for NullRuntime {
    async fn start(&self, name: &str, _config: &ServerConfig) -> Result<()> {
        self.record("start", name);
        if self
            .fail_on_start
            .lock()
            .expect("null runtime lock")
            .contains(name)
        {
            return Err(RuntimeError::CommandFailed {
                command: format!("start {name}"),
                stderr: "injected failure".to_string(),
            });
        }
        self.running
            .lock()
            .expect("null runtime lock")
            .insert(name.to_string());
        Ok(())
    }

    async fn stop(&self, name: &str) -> Result<()> {
        self.record("stop", name);
        self.running.lock().expect("null runtime lock").remove(name);
        Ok(())
    }

    async fn status(&self, name: &str) -> Result<ContainerStatus> {
        let running = self.running.lock().expect("null runtime lock");
        Ok(if running.contains(name) {
            ContainerStatus::Running
        } else {
            ContainerStatus::NotCreated
        })
    }

    async fn logs(&self, name: &str, _follow: bool, _tail: Option<usize>) -> Result<()> {
        self.record("logs", name);
        Ok(())
    }

    async fn exec(&self, name: &str, _command: &[String]) -> Result<String> {
        self.record("exec", name);
        Ok(String::new())
    }

    async fn ensure_network(&self, name: &str) -> Result<()> {
        self.record("network", name);
        Ok(())
    }

    async fn remove_network(&self, name: &str) -> Result<()> {
        self.record("rm-network", name);
        Ok(())
    }
}
