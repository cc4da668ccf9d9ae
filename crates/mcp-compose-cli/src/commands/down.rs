use anyhow::{bail, Result};
use clap::Args;
use colored::Colorize;

use mcp_compose_runtime::LifecycleScheduler;

use super::{load_manifest, select_runtime};
use crate::Cli;

#[derive(Args, Clone)]
pub struct DownArgs {
    /// Servers to stop; empty means all
    pub servers: Vec<String>,
}

pub async fn execute(cli: &Cli, args: &DownArgs) -> Result<()> {
    let config = load_manifest(cli)?;
    let runtime = select_runtime(cli)?;
    let scheduler = LifecycleScheduler::new(runtime, config);

    println!("{}", "Stopping servers".bold());
    let summary = scheduler.down(&args.servers).await;
    let failed = summary.failed().len();
    if failed > 0 {
        bail!("{failed} server(s) failed to stop");
    }
    println!("{}", "All servers stopped".green());
    Ok(())
}
