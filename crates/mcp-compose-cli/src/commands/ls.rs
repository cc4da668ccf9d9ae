use anyhow::Result;
use clap::Args;
use colored::Colorize;

use mcp_compose_runtime::ContainerStatus;

use super::{load_manifest, select_runtime};
use crate::Cli;

#[derive(Args, Clone)]
pub struct LsArgs {
    /// Also print dependency and transport details
    #[arg(long)]
    pub wide: bool,
}

pub async fn execute(cli: &Cli, args: &LsArgs) -> Result<()> {
    let config = load_manifest(cli)?;
    let runtime = select_runtime(cli)?;

    let mut names: Vec<&String> = config.servers.keys().collect();
    names.sort();

    println!(
        "{}",
        format!("{:<20} {:<10} {:<12}", "SERVER", "TRANSPORT", "STATUS").bold()
    );
    for name in names {
        let server = &config.servers[name];
        let status = runtime
            .status(name)
            .await
            .unwrap_or(ContainerStatus::NotCreated);
        let status_text = match status {
            ContainerStatus::Running => "running".green(),
            ContainerStatus::Exited => "exited".yellow(),
            ContainerStatus::NotCreated => "not created".dimmed(),
            ContainerStatus::Unknown(ref s) => s.clone().red(),
        };
        print!(
            "{:<20} {:<10} {:<12}",
            name,
            server.transport.to_string(),
            status_text
        );
        if args.wide && !server.depends_on.is_empty() {
            print!("  depends_on: {}", server.depends_on.join(", "));
        }
        println!();
    }
    Ok(())
}
