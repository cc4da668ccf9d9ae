use anyhow::{bail, Result};
use clap::Args;
use colored::Colorize;

use mcp_compose_proxy::reload::validate_manifest;
use mcp_compose_runtime::compute_levels;

use crate::Cli;

#[derive(Args, Clone)]
pub struct ValidateArgs {
    /// Print the computed start levels
    #[arg(long)]
    pub show_plan: bool,
}

/// Strict validation: everything `ComposeConfig::load` checks, plus
/// dependency cycles and missing dependencies are fatal here (the runtime
/// path only warns).
pub async fn execute(cli: &Cli, args: &ValidateArgs) -> Result<()> {
    let config = validate_manifest(&cli.file)?;
    let plan = compute_levels(&config.servers, &[]);

    if !plan.missing.is_empty() {
        for (server, dep) in &plan.missing {
            eprintln!(
                "{} server '{server}' depends on undefined '{dep}'",
                "error:".red()
            );
        }
        bail!("manifest references undefined dependencies");
    }
    if !plan.cycle.is_empty() {
        bail!(
            "dependency cycle between: {}",
            plan.cycle.join(", ")
        );
    }

    if args.show_plan {
        for (index, level) in plan.levels.iter().enumerate() {
            println!("level {index}: {}", level.join(", "));
        }
    }
    println!(
        "{} {} ({} servers, {} levels)",
        "valid:".green(),
        cli.file.display(),
        config.servers.len(),
        plan.levels.len()
    );
    Ok(())
}
