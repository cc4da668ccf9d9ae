use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;

use crate::Cli;

#[derive(Args, Clone)]
pub struct ReloadArgs {
    /// Base URL of the running proxy
    #[arg(long, default_value = "http://localhost:9876")]
    pub proxy_url: String,
}

/// Ask a running proxy to re-read its manifest. Authenticates with
/// `MCP_API_KEY` when set.
pub async fn execute(_cli: &Cli, args: &ReloadArgs) -> Result<()> {
    let client = reqwest::Client::new();
    let mut request = client.post(format!("{}/api/reload", args.proxy_url.trim_end_matches('/')));
    if let Ok(api_key) = std::env::var("MCP_API_KEY") {
        request = request.bearer_auth(api_key);
    }
    let response = request
        .send()
        .await
        .with_context(|| format!("reaching proxy at {}", args.proxy_url))?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        bail!("reload failed: {status}: {body}");
    }
    let report: serde_json::Value = response.json().await?;
    println!("{} {report}", "reloaded:".green());
    Ok(())
}
