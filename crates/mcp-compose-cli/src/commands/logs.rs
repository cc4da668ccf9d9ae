use anyhow::{bail, Result};
use clap::Args;

use super::{load_manifest, select_runtime};
use crate::Cli;

#[derive(Args, Clone)]
pub struct LogsArgs {
    /// Server whose logs to show
    pub server: String,

    /// Keep following the log stream
    #[arg(short, long)]
    pub follow: bool,

    /// Only the last N lines
    #[arg(long)]
    pub tail: Option<usize>,
}

pub async fn execute(cli: &Cli, args: &LogsArgs) -> Result<()> {
    let config = load_manifest(cli)?;
    if !config.servers.contains_key(&args.server) {
        bail!("server '{}' is not in the manifest", args.server);
    }
    let runtime = select_runtime(cli)?;
    runtime.logs(&args.server, args.follow, args.tail).await?;
    Ok(())
}
