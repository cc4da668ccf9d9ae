use anyhow::{bail, Result};
use clap::Args;
use colored::Colorize;

use mcp_compose_runtime::LifecycleScheduler;

use super::{load_manifest, select_runtime};
use crate::Cli;

#[derive(Args, Clone)]
pub struct UpArgs {
    /// Servers to start; empty means all
    pub servers: Vec<String>,
}

pub async fn execute(cli: &Cli, args: &UpArgs) -> Result<()> {
    let config = load_manifest(cli)?;
    let runtime = select_runtime(cli)?;
    let scheduler = LifecycleScheduler::new(runtime, config);

    println!("{}", "Starting servers".bold());
    let summary = scheduler.up(&args.servers).await;
    let failed = summary.failed().len();
    if failed > 0 {
        bail!("{failed} server(s) failed to start");
    }
    println!("{}", "All servers started".green());
    Ok(())
}
