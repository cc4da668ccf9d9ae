use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use mcp_compose_core::config::ComposeConfig;
use mcp_compose_proxy::{ProxyServer, ProxySettings};

use crate::Cli;

#[derive(Args, Clone)]
pub struct ProxyArgs {
    /// Listen port; overrides MCP_PROXY_PORT
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Listen host
    #[arg(long)]
    pub host: Option<String>,
}

/// Run the HTTP front door until interrupted.
pub async fn execute(cli: &Cli, args: &ProxyArgs) -> Result<()> {
    let manifest_path = match std::env::var("MCP_CONFIG_FILE") {
        Ok(path) => path.into(),
        Err(_) => cli.file.clone(),
    };
    let config = ComposeConfig::load(&manifest_path)
        .with_context(|| format!("loading manifest {}", manifest_path.display()))?;

    let mut settings = ProxySettings::from_env();
    settings.project = cli.project.clone();
    if let Some(port) = args.port {
        settings.port = port;
    }
    if let Some(host) = &args.host {
        settings.host = host.clone();
    }

    info!(
        servers = config.servers.len(),
        addr = %settings.addr(),
        "starting proxy"
    );
    let mut server = ProxyServer::new(config, manifest_path, settings);
    server.start().await?;
    server.run().await?;
    Ok(())
}
