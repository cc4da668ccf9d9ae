//! # mcp-compose CLI
//!
//! Operator entry point: bring the fleet up and down in dependency order,
//! inspect it, validate the manifest, and run the proxy front door.
//!
//! ```bash
//! mcp-compose up                 # start everything, dependency-ordered
//! mcp-compose up weather files   # start a selection (plus dependencies)
//! mcp-compose ls                 # fleet status
//! mcp-compose logs weather -f    # follow one server's logs
//! mcp-compose validate           # strict manifest check (cycles are fatal)
//! mcp-compose proxy              # run the HTTP front door
//! mcp-compose reload             # ask a running proxy to re-read the manifest
//! ```
//!
//! Exit code is 0 on success and 1 on any error, including partial lifecycle
//! failures.

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use std::path::PathBuf;
use tracing::debug;

mod commands;

use commands::*;

/// Declarative orchestrator and OAuth-guarded proxy for MCP server fleets.
#[derive(Parser)]
#[command(name = "mcp-compose")]
#[command(about = "Declarative orchestrator and OAuth-guarded proxy for MCP server fleets")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Manifest path
    #[arg(short = 'c', long = "file", global = true, default_value = "mcp-compose.yaml")]
    pub file: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Container runtime: docker or podman
    #[arg(long, global = true, default_value = "docker")]
    pub runtime: String,

    /// Project name used to prefix container names
    #[arg(long, global = true, default_value = "mcp-compose")]
    pub project: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start servers (and their dependencies) in dependency order
    Up(UpArgs),
    /// Stop servers in reverse dependency order
    Down(DownArgs),
    /// Alias for `up` with an explicit selection
    Start(UpArgs),
    /// Alias for `down` with an explicit selection
    Stop(DownArgs),
    /// Stop then start the selection
    Restart(UpArgs),
    /// List servers and their container status
    Ls(LsArgs),
    /// Show or follow one server's container logs
    Logs(LogsArgs),
    /// Strictly validate the manifest (dependency cycles are fatal)
    Validate(ValidateArgs),
    /// Ask a running proxy to re-read the manifest
    Reload(ReloadArgs),
    /// Run the HTTP proxy front door
    Proxy(ProxyArgs),
    /// Write a starter manifest
    CreateConfig(CreateConfigArgs),
    /// Generate shell completions
    Completion(CompletionArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();
    debug!("manifest: {}", cli.file.display());

    match &cli.command {
        Commands::Up(args) | Commands::Start(args) => up::execute(&cli, args).await,
        Commands::Down(args) | Commands::Stop(args) => down::execute(&cli, args).await,
        Commands::Restart(args) => restart::execute(&cli, args).await,
        Commands::Ls(args) => ls::execute(&cli, args).await,
        Commands::Logs(args) => logs::execute(&cli, args).await,
        Commands::Validate(args) => validate::execute(&cli, args).await,
        Commands::Reload(args) => reload::execute(&cli, args).await,
        Commands::Proxy(args) => proxy::execute(&cli, args).await,
        Commands::CreateConfig(args) => create_config::execute(&cli, args).await,
        Commands::Completion(args) => {
            completion::execute(args, &mut Cli::command());
            Ok(())
        }
    }
}
