use anyhow::Result;

use super::{down, up, DownArgs, UpArgs};
use crate::Cli;

pub async fn execute(cli: &Cli, args: &UpArgs) -> Result<()> {
    let down_args = DownArgs {
        servers: args.servers.clone(),
    };
    down::execute(cli, &down_args).await?;
    up::execute(cli, args).await
}
