use anyhow::{bail, Result};
use clap::Args;
use colored::Colorize;

use crate::Cli;

#[derive(Args, Clone)]
pub struct CreateConfigArgs {
    /// Overwrite an existing manifest
    #[arg(long)]
    pub force: bool,
}

const STARTER: &str = r#"# mcp-compose manifest
version: "1"

servers:
  # An HTTP MCP server run from an image.
  weather:
    transport: http
    image: example/mcp-weather:latest
    ports: ["8081:8080"]
    authentication:
      scope: mcp:tools

  # A local stdio MCP server; the proxy spawns the command directly.
  files:
    transport: stdio
    command: mcp-server-filesystem
    args: ["--root", "/data"]
    depends_on: [weather]

oauth:
  issuer: http://localhost:9876
  dynamic_registration: true
  # api_key: change-me-please-16+

audit:
  enabled: true
  max_entries: 10000
"#;

pub async fn execute(cli: &Cli, args: &CreateConfigArgs) -> Result<()> {
    if cli.file.exists() && !args.force {
        bail!(
            "{} already exists (use --force to overwrite)",
            cli.file.display()
        );
    }
    std::fs::write(&cli.file, STARTER)?;
    println!("{} {}", "wrote".green(), cli.file.display());
    Ok(())
}
